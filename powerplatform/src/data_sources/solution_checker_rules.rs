//! Solution checker rules of an environment

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tf_provider::{map, DataSource, Diagnostics};
use tf_provider::schema::{AttributeType, Schema};
use tf_provider::value::{Value, ValueEmpty};

use crate::api::managed_environment::SolutionCheckerRuleDto;
use crate::provider_data::{client_error, ProviderHandle};
use crate::schema::{computed, object_list, required, schema};
use crate::values::{known_str, list, string};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolutionCheckerRulesState {
    pub environment_id: Value<String>,
    pub rules: Value<Vec<Value<RuleState>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleState {
    pub code: Value<String>,
    pub description: Value<String>,
    pub summary: Value<String>,
    pub how_to_fix: Value<String>,
    pub guidance_url: Value<String>,
    pub component_type: Value<i64>,
    pub primary_category: Value<i64>,
    pub primary_category_description: Value<String>,
    pub include: Value<bool>,
    pub severity: Value<i64>,
}

impl From<SolutionCheckerRuleDto> for RuleState {
    fn from(rule: SolutionCheckerRuleDto) -> Self {
        let category = rule.primary_category_description();
        Self {
            code: string(rule.code),
            description: string(rule.description),
            summary: string(rule.summary),
            how_to_fix: string(rule.how_to_fix),
            guidance_url: string(rule.guidance_url),
            component_type: Value::Value(rule.component_type),
            primary_category: Value::Value(rule.primary_category),
            primary_category_description: string(category),
            include: Value::Value(rule.include),
            severity: Value::Value(rule.severity),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SolutionCheckerRulesDataSource {
    handle: ProviderHandle,
}

impl SolutionCheckerRulesDataSource {
    pub fn new(handle: ProviderHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl DataSource for SolutionCheckerRulesDataSource {
    type State<'a> = SolutionCheckerRulesState;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(schema(
            "Fetches the solution checker rules available to an environment",
            map! {
                "environment_id" => required(AttributeType::String, "Environment id"),
                "rules" => computed(
                    object_list(map! {
                        "code" => AttributeType::String,
                        "description" => AttributeType::String,
                        "summary" => AttributeType::String,
                        "how_to_fix" => AttributeType::String,
                        "guidance_url" => AttributeType::String,
                        "component_type" => AttributeType::Number,
                        "primary_category" => AttributeType::Number,
                        "primary_category_description" => AttributeType::String,
                        "include" => AttributeType::Bool,
                        "severity" => AttributeType::Number,
                    }),
                    "List of solution checker rules",
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
        let environment_id = known_str(&config.environment_id).unwrap_or_default();
        match client
            .managed_environments()
            .solution_checker_rules(environment_id)
            .await
        {
            Ok(rules) => Some(SolutionCheckerRulesState {
                rules: list(rules.into_iter().map(RuleState::from)),
                ..config
            }),
            Err(e) => {
                client_error(
                    diags,
                    format!("Failed to read solution checker rules of '{}'", environment_id),
                    &e,
                );
                None
            }
        }
    }
}
