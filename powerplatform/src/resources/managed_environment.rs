//! Managed environment governance settings

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tf_provider::{map, AttributePath, Diagnostics, Resource};
use tf_provider::schema::{AttributeType, Schema};
use tf_provider::value::{Value, ValueEmpty};

use crate::api::environments::{
    EnvironmentDto, ExtendedSettingsDto, GovernanceConfigurationDto, GovernanceSettingsDto,
};
use crate::api::managed_environment::PROTECTION_LEVEL_STANDARD;
use crate::provider_data::{client_error, ProviderHandle};
use crate::resources::{expect_state, imported, replace_if_changed};
use crate::schema::{computed, optional, required, schema, string_list};
use crate::values::{bool_or, known, str_or_empty, string, string_list as strings_value, strings, StringList};

pub const LIMIT_SHARING_MODES: [&str; 2] = ["ExcludeSharingToSecurityGroups", "NoLimit"];
pub const SOLUTION_CHECKER_MODES: [&str; 3] = ["None", "Warn", "Block"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManagedEnvironmentState {
    pub id: Value<String>,
    pub environment_id: Value<String>,
    pub protection_level: Value<String>,
    pub is_usage_insights_disabled: Value<bool>,
    pub is_group_sharing_disabled: Value<bool>,
    pub limit_sharing_mode: Value<String>,
    pub max_limit_user_sharing: Value<i64>,
    pub solution_checker_mode: Value<String>,
    pub suppress_validation_emails: Value<bool>,
    pub solution_checker_rule_overrides: StringList,
    pub maker_onboarding_markdown: Value<String>,
    pub maker_onboarding_url: Value<String>,
}

/// `NoLimit` -> `noLimit`
pub fn lower_first(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `noLimit` -> `NoLimit`
pub fn upper_first(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn format_bool(value: &Value<bool>) -> String {
    bool_or(value, false).to_string()
}

impl ManagedEnvironmentState {
    fn to_governance(&self) -> GovernanceConfigurationDto {
        GovernanceConfigurationDto {
            protection_level: PROTECTION_LEVEL_STANDARD.to_string(),
            settings: Some(GovernanceSettingsDto {
                extended_settings: ExtendedSettingsDto {
                    exclude_environment_from_analysis: format_bool(&self.is_usage_insights_disabled),
                    is_group_sharing_disabled: format_bool(&self.is_group_sharing_disabled),
                    max_limit_user_sharing: known(&self.max_limit_user_sharing)
                        .copied()
                        .unwrap_or(-1)
                        .to_string(),
                    disable_ai_generated_descriptions: "false".to_string(),
                    include_on_homepage_insights: "false".to_string(),
                    limit_sharing_mode: lower_first(str_or_empty(&self.limit_sharing_mode)),
                    solution_checker_mode: lower_first(str_or_empty(&self.solution_checker_mode)),
                    suppress_validation_emails: format_bool(&self.suppress_validation_emails),
                    solution_checker_rule_overrides: strings(&self.solution_checker_rule_overrides)
                        .join(","),
                    maker_onboarding_url: str_or_empty(&self.maker_onboarding_url).to_string(),
                    maker_onboarding_markdown: str_or_empty(&self.maker_onboarding_markdown)
                        .to_string(),
                },
            }),
        }
    }

    /// Refresh from the environment's governance configuration
    fn refresh(mut self, environment: &EnvironmentDto) -> Self {
        self.id = self.environment_id.clone();
        let Some(governance) = &environment.properties.governance_configuration else {
            return self;
        };
        self.protection_level = string(governance.protection_level.clone());

        let Some(settings) = &governance.settings else {
            return self;
        };
        let settings = &settings.extended_settings;
        self.is_usage_insights_disabled =
            Value::Value(settings.exclude_environment_from_analysis == "true");
        self.is_group_sharing_disabled = Value::Value(settings.is_group_sharing_disabled == "true");
        self.max_limit_user_sharing =
            Value::Value(settings.max_limit_user_sharing.parse().unwrap_or_default());
        if !settings.limit_sharing_mode.is_empty() {
            self.limit_sharing_mode = string(upper_first(&settings.limit_sharing_mode));
        }
        if !settings.solution_checker_mode.is_empty() {
            self.solution_checker_mode = string(upper_first(&settings.solution_checker_mode));
        }
        self.suppress_validation_emails = Value::Value(settings.suppress_validation_emails == "true");
        self.maker_onboarding_url = string(settings.maker_onboarding_url.clone());
        self.maker_onboarding_markdown = string(settings.maker_onboarding_markdown.clone());

        self.solution_checker_rule_overrides = if settings.solution_checker_rule_overrides.is_empty() {
            Value::Null
        } else {
            let actual: Vec<String> = settings
                .solution_checker_rule_overrides
                .split(',')
                .map(str::to_string)
                .collect();
            let mut prior = strings(&self.solution_checker_rule_overrides);
            let mut sorted_actual = actual.clone();
            prior.sort();
            sorted_actual.sort();
            if prior == sorted_actual {
                self.solution_checker_rule_overrides
            } else {
                strings_value(actual)
            }
        };
        self
    }
}

fn group_warning(diags: &mut Diagnostics, environment_id: &str, group_id: &str) {
    tracing::warn!(
        "Environment {} belongs to environment group {}, managed environment settings not applied",
        environment_id,
        group_id
    );
    diags.root_warning(
        format!(
            "Environment '{}' is included in Environment Group '{}'. The Manage Environment Settings will not be applied.",
            environment_id, group_id
        ),
        "To manage this environment's settings, remove it from the Environment Group first.",
    );
}

#[derive(Debug, Clone)]
pub struct ManagedEnvironmentResource {
    handle: ProviderHandle,
}

impl ManagedEnvironmentResource {
    pub fn new(handle: ProviderHandle) -> Self {
        Self { handle }
    }

    /// Enable governance with the planned settings unless the environment is in a group
    async fn apply(
        &self,
        diags: &mut Diagnostics,
        plan: ManagedEnvironmentState,
        prior: Option<ManagedEnvironmentState>,
    ) -> Option<ManagedEnvironmentState> {
        let client = self.handle.client(diags).await?;
        let environment_id = str_or_empty(&plan.environment_id).to_string();

        let overrides = strings(&plan.solution_checker_rule_overrides);
        if !overrides.is_empty() {
            let valid = match client
                .managed_environments()
                .solution_checker_rule_codes(&environment_id)
                .await
            {
                Ok(codes) => codes,
                Err(e) => {
                    client_error(diags, "Failed to fetch solution checker rules", &e);
                    return None;
                }
            };
            if let Some(invalid) = overrides.iter().find(|o| !valid.contains(o)) {
                diags.error(
                    "Invalid Solution Checker Rule Override",
                    format!(
                        "The solution checker rule override '{}' is not valid. Valid rules are: {}",
                        invalid,
                        valid.join(", ")
                    ),
                    AttributePath::new("solution_checker_rule_overrides"),
                );
                return None;
            }
        }

        let environment = match client.environments().get(&environment_id).await {
            Ok(environment) => environment,
            Err(e) => {
                client_error(diags, format!("Failed to read environment '{}'", environment_id), &e);
                return None;
            }
        };
        if let Some(group_id) = environment.properties.environment_group_id() {
            group_warning(diags, &environment_id, group_id);
            let mut state = plan;
            state.id = state.environment_id.clone();
            state.protection_level = prior
                .map(|p| p.protection_level)
                .filter(|p| matches!(p, Value::Value(_)))
                .unwrap_or_else(|| {
                    string(
                        environment
                            .properties
                            .governance_configuration
                            .as_ref()
                            .map(|g| g.protection_level.clone())
                            .unwrap_or_default(),
                    )
                });
            return Some(state);
        }

        if let Err(e) = client
            .managed_environments()
            .enable(&environment_id, &plan.to_governance())
            .await
        {
            client_error(
                diags,
                format!("Failed to enable managed environment '{}'", environment_id),
                &e,
            );
            return None;
        }

        match client.environments().get(&environment_id).await {
            Ok(environment) => Some(plan.refresh(&environment)),
            Err(e) => {
                client_error(diags, format!("Failed to read environment '{}'", environment_id), &e);
                None
            }
        }
    }
}

#[async_trait]
impl Resource for ManagedEnvironmentResource {
    type State<'a> = Value<ManagedEnvironmentState>;
    type PrivateState<'a> = ValueEmpty;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(schema(
            "Manages the governance settings of a managed environment",
            map! {
                "id" => computed(AttributeType::String, "Equal to the environment id"),
                "environment_id" => required(
                    AttributeType::String,
                    "Id of the managed environment; changing it recreates the resource",
                ),
                "protection_level" => computed(AttributeType::String, "Protection level"),
                "is_usage_insights_disabled" => required(AttributeType::Bool, "Weekly insights digest for the environment"),
                "is_group_sharing_disabled" => required(AttributeType::Bool, "Limits how widely canvas apps can be shared"),
                "limit_sharing_mode" => required(
                    AttributeType::String,
                    "`ExcludeSharingToSecurityGroups` or `NoLimit`",
                ),
                "max_limit_user_sharing" => required(
                    AttributeType::Number,
                    "Limits how many users can share canvas apps; -1 when group sharing is enabled",
                ),
                "solution_checker_mode" => required(AttributeType::String, "`None`, `Warn` or `Block`"),
                "suppress_validation_emails" => required(
                    AttributeType::Bool,
                    "Send emails only when a solution is blocked",
                ),
                "solution_checker_rule_overrides" => optional(
                    string_list(),
                    "Solution checker rule codes to override",
                ),
                "maker_onboarding_markdown" => required(
                    AttributeType::String,
                    "Content first-time makers see in the Studio",
                ),
                "maker_onboarding_url" => required(AttributeType::String, "Maker onboarding 'Learn more' URL"),
            },
        ))
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, config: Self::State<'a>) -> Option<()> {
        let Value::Value(config) = config else {
            return Some(());
        };
        if let Value::Value(mode) = &config.limit_sharing_mode {
            if !LIMIT_SHARING_MODES.contains(&mode.as_str()) {
                diags.error(
                    "Invalid limit sharing mode",
                    format!("must be one of {}, got '{}'", LIMIT_SHARING_MODES.join(", "), mode),
                    AttributePath::new("limit_sharing_mode"),
                );
            }
        }
        if let Value::Value(mode) = &config.solution_checker_mode {
            if !SOLUTION_CHECKER_MODES.contains(&mode.as_str()) {
                diags.error(
                    "Invalid solution checker mode",
                    format!("must be one of {}, got '{}'", SOLUTION_CHECKER_MODES.join(", "), mode),
                    AttributePath::new("solution_checker_mode"),
                );
            }
        }
        diags.errors.is_empty().then_some(())
    }

    async fn read<'a>(
        &self,
        diags: &mut Diagnostics,
        state: Self::State<'a>,
        private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let state = expect_state(diags, state)?;
        let client = self.handle.client(diags).await?;
        let environment_id = str_or_empty(&state.environment_id).to_string();

        let environment = match client.environments().get(&environment_id).await {
            Ok(environment) => environment,
            Err(e) if e.is_not_found() => {
                tracing::info!("Environment {} no longer exists, removing from state", environment_id);
                return Some((Value::Null, private_state));
            }
            Err(e) => {
                client_error(diags, format!("Failed to read environment '{}'", environment_id), &e);
                return None;
            }
        };

        if let Some(group_id) = environment.properties.environment_group_id() {
            group_warning(diags, &environment_id, group_id);
            return Some((Value::Value(state), private_state));
        }
        Some((Value::Value(state.refresh(&environment)), private_state))
    }

    async fn import<'a>(
        &self,
        diags: &mut Diagnostics,
        id: String,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let state = Value::Value(ManagedEnvironmentState {
            environment_id: string(id.clone()),
            ..Default::default()
        });
        let read = self
            .read(diags, state, ValueEmpty::default(), ValueEmpty::default())
            .await;
        imported(diags, "managed environment", &id, read)
    }

    async fn plan_create<'a>(
        &self,
        diags: &mut Diagnostics,
        proposed_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let mut state = expect_state(diags, proposed_state)?;
        state.id = Value::Unknown;
        state.protection_level = Value::Unknown;
        Some((Value::Value(state), Default::default()))
    }

    async fn plan_update<'a>(
        &self,
        diags: &mut Diagnostics,
        prior_state: Self::State<'a>,
        proposed_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        prior_private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(
        Self::State<'a>,
        Self::PrivateState<'a>,
        Vec<tf_provider::AttributePath>,
    )> {
        let prior = expect_state(diags, prior_state)?;
        let mut state = expect_state(diags, proposed_state)?;
        let mut replace = Vec::new();
        replace_if_changed(&mut replace, "environment_id", &prior.environment_id, &state.environment_id);
        if !replace.is_empty() {
            state.id = Value::Unknown;
            state.protection_level = Value::Unknown;
        }
        Some((Value::Value(state), prior_private_state, replace))
    }

    async fn plan_destroy<'a>(
        &self,
        _diags: &mut Diagnostics,
        _prior_state: Self::State<'a>,
        prior_private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<Self::PrivateState<'a>> {
        Some(prior_private_state)
    }

    async fn create<'a>(
        &self,
        diags: &mut Diagnostics,
        planned_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let plan = expect_state(diags, planned_state)?;
        let state = self.apply(diags, plan, None).await?;
        Some((Value::Value(state), private_state))
    }

    async fn update<'a>(
        &self,
        diags: &mut Diagnostics,
        prior_state: Self::State<'a>,
        planned_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let prior = expect_state(diags, prior_state)?;
        let plan = expect_state(diags, planned_state)?;
        let state = self.apply(diags, plan, Some(prior)).await?;
        Some((Value::Value(state), private_state))
    }

    async fn destroy<'a>(
        &self,
        diags: &mut Diagnostics,
        state: Self::State<'a>,
        _planned_private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<()> {
        let state = expect_state(diags, state)?;
        let client = self.handle.client(diags).await?;
        let environment_id = str_or_empty(&state.environment_id).to_string();

        let environment = match client.environments().get(&environment_id).await {
            Ok(environment) => environment,
            Err(e) if e.is_not_found() => return Some(()),
            Err(e) => {
                client_error(diags, format!("Failed to read environment '{}'", environment_id), &e);
                return None;
            }
        };
        if let Some(group_id) = environment.properties.environment_group_id() {
            group_warning(diags, &environment_id, group_id);
            return Some(());
        }

        match client.managed_environments().disable(&environment_id).await {
            Ok(()) => Some(()),
            Err(e) => {
                client_error(
                    diags,
                    format!("Failed to disable managed environment '{}'", environment_id),
                    &e,
                );
                None
            }
        }
    }
}
