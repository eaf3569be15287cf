//! Environment templates of a location, flattened across categories

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tf_provider::{map, DataSource, Diagnostics};
use tf_provider::schema::{AttributeType, Schema};
use tf_provider::value::{Value, ValueEmpty};

use crate::api::environments::{EnvironmentTemplateDto, EnvironmentTemplatesDto, TEMPLATE_CATEGORIES};
use crate::provider_data::{client_error, ProviderHandle};
use crate::schema::{computed, object_list, required, schema};
use crate::values::{known_str, list, string, string_or_null};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentTemplatesState {
    pub location: Value<String>,
    pub environment_templates: Value<Vec<Value<EnvironmentTemplateState>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentTemplateState {
    pub category: Value<String>,
    pub id: Value<String>,
    pub name: Value<String>,
    pub display_name: Value<String>,
    pub location: Value<String>,
    pub is_disabled: Value<bool>,
    pub disabled_reason_code: Value<String>,
    pub disabled_reason_message: Value<String>,
    pub is_customer_engagement: Value<bool>,
    pub is_supported_for_reset_operation: Value<bool>,
}

impl EnvironmentTemplateState {
    fn from_dto(category: &str, template: EnvironmentTemplateDto) -> Self {
        let properties = template.properties;
        let reason = properties.disabled_reason.unwrap_or_default();
        Self {
            category: string(category),
            id: string(template.id),
            name: string(template.name),
            display_name: string(properties.display_name),
            location: string(template.location),
            is_disabled: Value::Value(properties.is_disabled),
            disabled_reason_code: string_or_null(reason.code),
            disabled_reason_message: string_or_null(reason.message),
            is_customer_engagement: Value::Value(properties.is_customer_engagement),
            is_supported_for_reset_operation: Value::Value(properties.is_supported_for_reset_operation),
        }
    }
}

/// Known categories first in admin center order, then any others sorted by name
pub fn flatten_templates(mut templates: EnvironmentTemplatesDto) -> Vec<EnvironmentTemplateState> {
    let mut flattened = Vec::new();
    for category in TEMPLATE_CATEGORIES {
        if let Some(entries) = templates.remove(category) {
            flattened.extend(
                entries
                    .into_iter()
                    .map(|t| EnvironmentTemplateState::from_dto(category, t)),
            );
        }
    }

    let mut rest: Vec<_> = templates.into_iter().collect();
    rest.sort_by(|a, b| a.0.cmp(&b.0));
    for (category, entries) in rest {
        flattened.extend(
            entries
                .into_iter()
                .map(|t| EnvironmentTemplateState::from_dto(&category, t)),
        );
    }
    flattened
}

#[derive(Debug, Clone)]
pub struct EnvironmentTemplatesDataSource {
    handle: ProviderHandle,
}

impl EnvironmentTemplatesDataSource {
    pub fn new(handle: ProviderHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl DataSource for EnvironmentTemplatesDataSource {
    type State<'a> = EnvironmentTemplatesState;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(schema(
            "Fetches the list of environment templates available in a location",
            map! {
                "location" => required(AttributeType::String, "Location of the templates"),
                "environment_templates" => computed(
                    object_list(map! {
                        "category" => AttributeType::String,
                        "id" => AttributeType::String,
                        "name" => AttributeType::String,
                        "display_name" => AttributeType::String,
                        "location" => AttributeType::String,
                        "is_disabled" => AttributeType::Bool,
                        "disabled_reason_code" => AttributeType::String,
                        "disabled_reason_message" => AttributeType::String,
                        "is_customer_engagement" => AttributeType::Bool,
                        "is_supported_for_reset_operation" => AttributeType::Bool,
                    }),
                    "List of templates",
                ),
            },
        ))
    }

    async fn validate<'a>(&self, _diags: &mut Diagnostics, _config: Self::State<'a>) -> Option<()> {
        Some(())
    }

    async fn read<'a>(
        &self,
        diags: &mut Diagnostics,
        config: Self::State<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<Self::State<'a>> {
        let client = self.handle.client(diags).await?;
        let location = known_str(&config.location).unwrap_or_default();
        match client.environments().get_templates(location).await {
            Ok(templates) => Some(EnvironmentTemplatesState {
                environment_templates: list(flatten_templates(templates)),
                ..config
            }),
            Err(e) => {
                client_error(
                    diags,
                    format!("Failed to read environment templates for '{}'", location),
                    &e,
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::environments::EnvironmentTemplatePropertiesDto;
    use std::collections::HashMap;

    fn template(name: &str) -> EnvironmentTemplateDto {
        EnvironmentTemplateDto {
            name: name.to_string(),
            properties: EnvironmentTemplatePropertiesDto {
                display_name: name.to_uppercase(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn flatten_orders_known_categories_first() {
        let mut templates: EnvironmentTemplatesDto = HashMap::new();
        templates.insert("zzz".to_string(), vec![template("custom")]);
        templates.insert("premium".to_string(), vec![template("D365_Sales")]);
        templates.insert("standard".to_string(), vec![template("D365_CDS"), template("D365_Basic")]);

        let flattened = flatten_templates(templates);

        let names: Vec<_> = flattened
            .iter()
            .map(|t| crate::values::str_or_empty(&t.name).to_string())
            .collect();
        assert_eq!(names, vec!["D365_CDS", "D365_Basic", "D365_Sales", "custom"]);
        assert_eq!(flattened[3].category, string("zzz"));
        assert_eq!(flattened[0].disabled_reason_code, Value::Null);
    }
}
