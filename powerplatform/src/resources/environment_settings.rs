//! Dataverse settings of an environment
//!
//! Only the configured settings are written and tracked. Removing the resource
//! leaves the environment settings as they are.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tf_provider::{map, AttributePath, Diagnostics, Resource};
use tf_provider::schema::{AttributeType, Schema};
use tf_provider::value::{Value, ValueEmpty};

use crate::api::common::configured_fields;
use crate::api::environment_settings::OrganizationSettingsDto;
use crate::api::Client;
use crate::provider_data::{client_error, ProviderHandle};
use crate::resources::{expect_state, imported, replace_if_changed};
use crate::schema::{computed, optional, required, schema, string_list};
use crate::values::{
    from_option, is_known, known_str, str_or_empty, string, string_list as strings_value, strings,
    to_option, StringList,
};

pub const PLUGIN_TRACE_LOG_SETTINGS: [&str; 3] = ["Off", "Exception", "All"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSettingsState {
    pub id: Value<String>,
    pub environment_id: Value<String>,
    pub audit_and_logs: Value<AuditAndLogsState>,
    pub email: Value<EmailState>,
    pub product: Value<ProductState>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditAndLogsState {
    pub plugin_trace_log_setting: Value<String>,
    pub is_audit_enabled: Value<bool>,
    pub is_user_access_audit_enabled: Value<bool>,
    pub is_read_audit_enabled: Value<bool>,
    pub log_retention_period_in_days: Value<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailState {
    pub max_upload_file_size_in_bytes: Value<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductState {
    pub show_dashboard_cards_in_expanded_state: Value<bool>,
    pub power_apps_component_framework_for_canvas_apps: Value<bool>,
    pub enable_powerapps_maker_bot: Value<bool>,
    pub enable_ai_prompts: Value<bool>,
    pub enable_ip_based_cookie_binding: Value<bool>,
    pub enable_ip_based_firewall_rule: Value<bool>,
    pub allowed_ip_range_for_firewall: StringList,
}

/// `Exception` -> 1
pub fn plugin_trace_code(setting: &str) -> Option<i64> {
    PLUGIN_TRACE_LOG_SETTINGS
        .iter()
        .position(|s| *s == setting)
        .map(|i| i as i64)
}

fn plugin_trace_name(code: i64) -> Option<String> {
    usize::try_from(code)
        .ok()
        .and_then(|i| PLUGIN_TRACE_LOG_SETTINGS.get(i))
        .map(|s| s.to_string())
}

impl EnvironmentSettingsState {
    /// Settings to write, unset attributes are left out
    pub fn to_dto(&self) -> OrganizationSettingsDto {
        let mut dto = OrganizationSettingsDto::default();
        if let Value::Value(audit) = &self.audit_and_logs {
            dto.plugintracelogsetting =
                known_str(&audit.plugin_trace_log_setting).and_then(plugin_trace_code);
            dto.isauditenabled = to_option(&audit.is_audit_enabled);
            dto.isuseraccessauditenabled = to_option(&audit.is_user_access_audit_enabled);
            dto.isreadauditenabled = to_option(&audit.is_read_audit_enabled);
            dto.auditretentionperiodv2 = to_option(&audit.log_retention_period_in_days);
        }
        if let Value::Value(email) = &self.email {
            dto.maxuploadfilesize = to_option(&email.max_upload_file_size_in_bytes);
        }
        if let Value::Value(product) = &self.product {
            dto.bounddashboarddefaultcardexpanded =
                to_option(&product.show_dashboard_cards_in_expanded_state);
            dto.iscustomcontrolsincanvasappsenabled =
                to_option(&product.power_apps_component_framework_for_canvas_apps);
            dto.powerappsmakerbotenabled = to_option(&product.enable_powerapps_maker_bot);
            dto.aipromptsenabled = to_option(&product.enable_ai_prompts);
            dto.enableipbasedcookiebinding = to_option(&product.enable_ip_based_cookie_binding);
            dto.enableipbasedfirewallrule = to_option(&product.enable_ip_based_firewall_rule);
            if matches!(product.allowed_ip_range_for_firewall, Value::Value(_)) {
                dto.allowediprangeforfirewall =
                    Some(strings(&product.allowed_ip_range_for_firewall).join(","));
            }
        }
        dto
    }

    /// State of `environment_id` from its settings, keeping only the blocks of `shape`
    pub fn from_dto(
        environment_id: &str,
        settings: OrganizationSettingsDto,
        shape: Option<&EnvironmentSettingsState>,
    ) -> Self {
        let keep = |block: Option<bool>| shape.is_none() || block == Some(true);
        let audit_and_logs = AuditAndLogsState {
            plugin_trace_log_setting: from_option(
                settings.plugintracelogsetting.and_then(plugin_trace_name),
            ),
            is_audit_enabled: from_option(settings.isauditenabled),
            is_user_access_audit_enabled: from_option(settings.isuseraccessauditenabled),
            is_read_audit_enabled: from_option(settings.isreadauditenabled),
            log_retention_period_in_days: from_option(settings.auditretentionperiodv2),
        };
        let email = EmailState {
            max_upload_file_size_in_bytes: from_option(settings.maxuploadfilesize),
        };
        let product = ProductState {
            show_dashboard_cards_in_expanded_state: from_option(
                settings.bounddashboarddefaultcardexpanded,
            ),
            power_apps_component_framework_for_canvas_apps: from_option(
                settings.iscustomcontrolsincanvasappsenabled,
            ),
            enable_powerapps_maker_bot: from_option(settings.powerappsmakerbotenabled),
            enable_ai_prompts: from_option(settings.aipromptsenabled),
            enable_ip_based_cookie_binding: from_option(settings.enableipbasedcookiebinding),
            enable_ip_based_firewall_rule: from_option(settings.enableipbasedfirewallrule),
            allowed_ip_range_for_firewall: settings
                .allowediprangeforfirewall
                .map(|ranges| {
                    strings_value(
                        ranges
                            .split(',')
                            .map(str::trim)
                            .filter(|r| !r.is_empty())
                            .map(str::to_string),
                    )
                })
                .unwrap_or(Value::Null),
        };

        Self {
            id: string(environment_id),
            environment_id: string(environment_id),
            audit_and_logs: if keep(shape.map(|s| matches!(s.audit_and_logs, Value::Value(_)))) {
                Value::Value(audit_and_logs)
            } else {
                Value::Null
            },
            email: if keep(shape.map(|s| matches!(s.email, Value::Value(_)))) {
                Value::Value(email)
            } else {
                Value::Null
            },
            product: if keep(shape.map(|s| matches!(s.product, Value::Value(_)))) {
                Value::Value(product)
            } else {
                Value::Null
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnvironmentSettingsResource {
    handle: ProviderHandle,
}

impl EnvironmentSettingsResource {
    pub fn new(handle: ProviderHandle) -> Self {
        Self { handle }
    }

    /// Write the configured settings and return them as stored
    async fn apply(
        client: &Client,
        plan: &EnvironmentSettingsState,
    ) -> Result<EnvironmentSettingsState, crate::api::ApiError> {
        let environment_id = str_or_empty(&plan.environment_id);
        let wanted = plan.to_dto();
        let stored = client
            .environment_settings()
            .update(environment_id, &wanted)
            .await?;
        let stored = configured_fields(&wanted, &stored)?;
        Ok(EnvironmentSettingsState::from_dto(environment_id, stored, Some(plan)))
    }
}

fn audit_and_logs_type() -> AttributeType {
    AttributeType::Object(map! {
        "plugin_trace_log_setting" => AttributeType::String,
        "is_audit_enabled" => AttributeType::Bool,
        "is_user_access_audit_enabled" => AttributeType::Bool,
        "is_read_audit_enabled" => AttributeType::Bool,
        "log_retention_period_in_days" => AttributeType::Number,
    })
}

fn email_type() -> AttributeType {
    AttributeType::Object(map! {
        "max_upload_file_size_in_bytes" => AttributeType::Number,
    })
}

fn product_type() -> AttributeType {
    AttributeType::Object(map! {
        "show_dashboard_cards_in_expanded_state" => AttributeType::Bool,
        "power_apps_component_framework_for_canvas_apps" => AttributeType::Bool,
        "enable_powerapps_maker_bot" => AttributeType::Bool,
        "enable_ai_prompts" => AttributeType::Bool,
        "enable_ip_based_cookie_binding" => AttributeType::Bool,
        "enable_ip_based_firewall_rule" => AttributeType::Bool,
        "allowed_ip_range_for_firewall" => string_list(),
    })
}

#[async_trait]
impl Resource for EnvironmentSettingsResource {
    type State<'a> = Value<EnvironmentSettingsState>;
    type PrivateState<'a> = ValueEmpty;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(schema(
            "Manages the Dataverse settings of an environment. Only configured settings are tracked",
            map! {
                "id" => computed(AttributeType::String, "Id of the environment"),
                "environment_id" => required(AttributeType::String, "Environment whose settings are managed"),
                "audit_and_logs" => optional(audit_and_logs_type(), "Auditing and plugin trace settings"),
                "email" => optional(email_type(), "Email settings"),
                "product" => optional(product_type(), "Behavior, feature and security settings"),
            },
        ))
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, config: Self::State<'a>) -> Option<()> {
        let Value::Value(config) = config else {
            return Some(());
        };
        if let Value::Value(audit) = &config.audit_and_logs {
            if let Some(setting) = known_str(&audit.plugin_trace_log_setting) {
                if plugin_trace_code(setting).is_none() {
                    diags.error(
                        "Invalid plugin trace log setting",
                        format!(
                            "plugin_trace_log_setting must be one of {}, got '{}'",
                            PLUGIN_TRACE_LOG_SETTINGS.join(", "),
                            setting
                        ),
                        AttributePath::new("audit_and_logs").attribute("plugin_trace_log_setting"),
                    );
                }
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
        let environment_id = str_or_empty(&state.environment_id);

        let settings = match client.environment_settings().get(environment_id).await {
            Ok(settings) => settings,
            Err(e) if e.is_not_found() => {
                tracing::info!("Environment {} no longer exists, removing its settings from state", environment_id);
                return Some((Value::Null, private_state));
            }
            Err(e) => {
                client_error(diags, format!("Failed to read settings of environment '{}'", environment_id), &e);
                return None;
            }
        };

        // an imported state has no blocks yet and tracks every setting
        let tracked = [
            matches!(state.audit_and_logs, Value::Value(_)),
            matches!(state.email, Value::Value(_)),
            matches!(state.product, Value::Value(_)),
        ];
        if !tracked.contains(&true) && !is_known(&state.id) {
            return Some((
                Value::Value(EnvironmentSettingsState::from_dto(environment_id, settings, None)),
                private_state,
            ));
        }

        match configured_fields(&state.to_dto(), &settings) {
            Ok(settings) => Some((
                Value::Value(EnvironmentSettingsState::from_dto(environment_id, settings, Some(&state))),
                private_state,
            )),
            Err(e) => {
                client_error(diags, format!("Failed to read settings of environment '{}'", environment_id), &e);
                None
            }
        }
    }

    async fn import<'a>(
        &self,
        diags: &mut Diagnostics,
        id: String,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let state = Value::Value(EnvironmentSettingsState {
            environment_id: string(id.clone()),
            ..Default::default()
        });
        let read = self
            .read(diags, state, ValueEmpty::default(), ValueEmpty::default())
            .await;
        imported(diags, "environment", &id, read)
    }

    async fn plan_create<'a>(
        &self,
        diags: &mut Diagnostics,
        proposed_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let mut state = expect_state(diags, proposed_state)?;
        state.id = state.environment_id.clone();
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
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>, Vec<AttributePath>)> {
        let prior = expect_state(diags, prior_state)?;
        let mut plan = expect_state(diags, proposed_state)?;

        let mut replace = Vec::new();
        replace_if_changed(&mut replace, "environment_id", &prior.environment_id, &plan.environment_id);
        plan.id = plan.environment_id.clone();
        Some((Value::Value(plan), prior_private_state, replace))
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
        let client = self.handle.client(diags).await?;

        match Self::apply(&client, &plan).await {
            Ok(state) => Some((Value::Value(state), private_state)),
            Err(e) => {
                client_error(
                    diags,
                    format!("Failed to apply settings of environment '{}'", str_or_empty(&plan.environment_id)),
                    &e,
                );
                None
            }
        }
    }

    async fn update<'a>(
        &self,
        diags: &mut Diagnostics,
        _prior_state: Self::State<'a>,
        planned_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let plan = expect_state(diags, planned_state)?;
        let client = self.handle.client(diags).await?;

        match Self::apply(&client, &plan).await {
            Ok(state) => Some((Value::Value(state), private_state)),
            Err(e) => {
                client_error(
                    diags,
                    format!("Failed to apply settings of environment '{}'", str_or_empty(&plan.environment_id)),
                    &e,
                );
                None
            }
        }
    }

    async fn destroy<'a>(
        &self,
        diags: &mut Diagnostics,
        state: Self::State<'a>,
        _planned_private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<()> {
        let state = expect_state(diags, state)?;
        tracing::info!(
            "Removing settings of environment {} from state, the environment keeps them",
            str_or_empty(&state.environment_id)
        );
        Some(())
    }
}
