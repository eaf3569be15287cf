//! Dataverse languages available in a location

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tf_provider::{map, AttributePath, DataSource, Diagnostics};
use tf_provider::schema::{AttributeType, Schema};
use tf_provider::value::{Value, ValueEmpty};

use crate::api::environments::LanguageDto;
use crate::provider_data::{client_error, ProviderHandle};
use crate::schema::{computed, object_list, required, schema};
use crate::values::{known_str, list, string};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LanguagesState {
    pub location: Value<String>,
    pub languages: Value<Vec<Value<LanguageState>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LanguageState {
    pub id: Value<String>,
    pub name: Value<String>,
    pub display_name: Value<String>,
    pub localized_name: Value<String>,
    pub locale_id: Value<i64>,
    pub is_tenant_default: Value<bool>,
}

impl From<LanguageDto> for LanguageState {
    fn from(language: LanguageDto) -> Self {
        Self {
            id: string(language.id),
            name: string(language.name),
            display_name: string(language.properties.display_name),
            localized_name: string(language.properties.localized_name),
            locale_id: Value::Value(language.properties.locale_id),
            is_tenant_default: Value::Value(language.properties.is_tenant_default),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LanguagesDataSource {
    handle: ProviderHandle,
}

impl LanguagesDataSource {
    pub fn new(handle: ProviderHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl DataSource for LanguagesDataSource {
    type State<'a> = LanguagesState;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(schema(
            "Fetches the list of Dataverse languages for a given location",
            map! {
                "location" => required(AttributeType::String, "Location of the languages"),
                "languages" => computed(
                    object_list(map! {
                        "id" => AttributeType::String,
                        "name" => AttributeType::String,
                        "display_name" => AttributeType::String,
                        "localized_name" => AttributeType::String,
                        "locale_id" => AttributeType::Number,
                        "is_tenant_default" => AttributeType::Bool,
                    }),
                    "List of available languages",
                ),
            },
        ))
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, config: Self::State<'a>) -> Option<()> {
        if matches!(config.location, Value::Value(ref l) if l.is_empty()) {
            diags.error(
                "Invalid location",
                "location must not be empty",
                AttributePath::new("location"),
            );
            return None;
        }
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
        match client.environments().get_languages(location).await {
            Ok(languages) => Some(LanguagesState {
                languages: list(languages.into_iter().map(LanguageState::from)),
                ..config
            }),
            Err(e) => {
                client_error(diags, format!("Failed to read languages for '{}'", location), &e);
                None
            }
        }
    }
}
