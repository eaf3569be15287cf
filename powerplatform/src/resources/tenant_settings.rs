//! Tenant wide Power Platform settings
//!
//! The settings found before the first apply are kept in private state and
//! written back for the configured fields when the resource is destroyed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tf_provider::{map, AttributePath, Diagnostics, Resource};
use tf_provider::schema::{AttributeType, Schema};
use tf_provider::value::{Value, ValueEmpty};

use crate::api::common::configured_fields;
use crate::api::tenant_settings::{
    GovernanceSettingsDto, LicensingSettingsDto, PowerAppsSettingsDto, PowerPlatformSettingsDto,
    SearchSettingsDto, TenantSettingsDto,
};
use crate::api::{ApiError, Client};
use crate::provider_data::{client_error, ProviderHandle};
use crate::resources::expect_state;
use crate::schema::{computed, optional, schema};
use crate::values::{from_option, str_or_empty, string, to_option};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TenantSettingsState {
    pub id: Value<String>,
    pub walk_me_opt_out: Value<bool>,
    pub disable_nps_comments_reachout: Value<bool>,
    pub disable_newsletter_sendout: Value<bool>,
    pub disable_environment_creation_by_non_admin_users: Value<bool>,
    pub disable_portals_creation_by_non_admin_users: Value<bool>,
    pub disable_survey_feedback: Value<bool>,
    pub disable_trial_environment_creation_by_non_admin_users: Value<bool>,
    pub disable_capacity_allocation_by_environment_admins: Value<bool>,
    pub disable_support_tickets_visible_by_all_users: Value<bool>,
    pub power_platform: Value<PowerPlatformState>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerPlatformState {
    pub search: Value<SearchState>,
    pub power_apps: Value<PowerAppsState>,
    pub governance: Value<GovernanceState>,
    pub licensing: Value<LicensingState>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchState {
    pub disable_docs_search: Value<bool>,
    pub disable_community_search: Value<bool>,
    pub disable_bing_video_search: Value<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerAppsState {
    pub disable_share_with_everyone: Value<bool>,
    pub enable_guests_to_make: Value<bool>,
    pub disable_maker_match: Value<bool>,
    pub disable_connection_sharing_with_everyone: Value<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GovernanceState {
    pub disable_admin_digest: Value<bool>,
    pub disable_developer_environment_creation_by_non_admin_users: Value<bool>,
    pub enable_default_environment_routing: Value<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LicensingState {
    pub disable_billing_policy_creation_by_non_admin_users: Value<bool>,
    pub enable_tenant_capacity_report_for_environment_admins: Value<bool>,
    pub storage_capacity_consumption_warning_threshold: Value<i64>,
}

/// `Some` for a known block, converted with `f`
fn block<T, D>(value: &Value<T>, f: impl FnOnce(&T) -> D) -> Option<D> {
    match value {
        Value::Value(inner) => Some(f(inner)),
        _ => None,
    }
}

fn state_block<D, T>(value: Option<D>, f: impl FnOnce(D) -> T) -> Value<T> {
    value.map(f).map(Value::Value).unwrap_or(Value::Null)
}

impl TenantSettingsState {
    pub fn to_dto(&self) -> TenantSettingsDto {
        TenantSettingsDto {
            walk_me_opt_out: to_option(&self.walk_me_opt_out),
            disable_nps_comments_reachout: to_option(&self.disable_nps_comments_reachout),
            disable_newsletter_sendout: to_option(&self.disable_newsletter_sendout),
            disable_environment_creation_by_non_admin_users: to_option(
                &self.disable_environment_creation_by_non_admin_users,
            ),
            disable_portals_creation_by_non_admin_users: to_option(
                &self.disable_portals_creation_by_non_admin_users,
            ),
            disable_survey_feedback: to_option(&self.disable_survey_feedback),
            disable_trial_environment_creation_by_non_admin_users: to_option(
                &self.disable_trial_environment_creation_by_non_admin_users,
            ),
            disable_capacity_allocation_by_environment_admins: to_option(
                &self.disable_capacity_allocation_by_environment_admins,
            ),
            disable_support_tickets_visible_by_all_users: to_option(
                &self.disable_support_tickets_visible_by_all_users,
            ),
            power_platform: block(&self.power_platform, |p| PowerPlatformSettingsDto {
                search: block(&p.search, |s| SearchSettingsDto {
                    disable_docs_search: to_option(&s.disable_docs_search),
                    disable_community_search: to_option(&s.disable_community_search),
                    disable_bing_video_search: to_option(&s.disable_bing_video_search),
                }),
                power_apps: block(&p.power_apps, |a| PowerAppsSettingsDto {
                    disable_share_with_everyone: to_option(&a.disable_share_with_everyone),
                    enable_guests_to_make: to_option(&a.enable_guests_to_make),
                    disable_maker_match: to_option(&a.disable_maker_match),
                    disable_connection_sharing_with_everyone: to_option(
                        &a.disable_connection_sharing_with_everyone,
                    ),
                }),
                governance: block(&p.governance, |g| GovernanceSettingsDto {
                    disable_admin_digest: to_option(&g.disable_admin_digest),
                    disable_developer_environment_creation_by_non_admin_users: to_option(
                        &g.disable_developer_environment_creation_by_non_admin_users,
                    ),
                    enable_default_environment_routing: to_option(
                        &g.enable_default_environment_routing,
                    ),
                }),
                licensing: block(&p.licensing, |l| LicensingSettingsDto {
                    disable_billing_policy_creation_by_non_admin_users: to_option(
                        &l.disable_billing_policy_creation_by_non_admin_users,
                    ),
                    enable_tenant_capacity_report_for_environment_admins: to_option(
                        &l.enable_tenant_capacity_report_for_environment_admins,
                    ),
                    storage_capacity_consumption_warning_threshold: to_option(
                        &l.storage_capacity_consumption_warning_threshold,
                    ),
                }),
            }),
        }
    }

    pub fn from_dto(tenant_id: &str, dto: TenantSettingsDto) -> Self {
        Self {
            id: string(tenant_id),
            walk_me_opt_out: from_option(dto.walk_me_opt_out),
            disable_nps_comments_reachout: from_option(dto.disable_nps_comments_reachout),
            disable_newsletter_sendout: from_option(dto.disable_newsletter_sendout),
            disable_environment_creation_by_non_admin_users: from_option(
                dto.disable_environment_creation_by_non_admin_users,
            ),
            disable_portals_creation_by_non_admin_users: from_option(
                dto.disable_portals_creation_by_non_admin_users,
            ),
            disable_survey_feedback: from_option(dto.disable_survey_feedback),
            disable_trial_environment_creation_by_non_admin_users: from_option(
                dto.disable_trial_environment_creation_by_non_admin_users,
            ),
            disable_capacity_allocation_by_environment_admins: from_option(
                dto.disable_capacity_allocation_by_environment_admins,
            ),
            disable_support_tickets_visible_by_all_users: from_option(
                dto.disable_support_tickets_visible_by_all_users,
            ),
            power_platform: state_block(dto.power_platform, |p| PowerPlatformState {
                search: state_block(p.search, |s| SearchState {
                    disable_docs_search: from_option(s.disable_docs_search),
                    disable_community_search: from_option(s.disable_community_search),
                    disable_bing_video_search: from_option(s.disable_bing_video_search),
                }),
                power_apps: state_block(p.power_apps, |a| PowerAppsState {
                    disable_share_with_everyone: from_option(a.disable_share_with_everyone),
                    enable_guests_to_make: from_option(a.enable_guests_to_make),
                    disable_maker_match: from_option(a.disable_maker_match),
                    disable_connection_sharing_with_everyone: from_option(
                        a.disable_connection_sharing_with_everyone,
                    ),
                }),
                governance: state_block(p.governance, |g| GovernanceState {
                    disable_admin_digest: from_option(g.disable_admin_digest),
                    disable_developer_environment_creation_by_non_admin_users: from_option(
                        g.disable_developer_environment_creation_by_non_admin_users,
                    ),
                    enable_default_environment_routing: from_option(
                        g.enable_default_environment_routing,
                    ),
                }),
                licensing: state_block(p.licensing, |l| LicensingState {
                    disable_billing_policy_creation_by_non_admin_users: from_option(
                        l.disable_billing_policy_creation_by_non_admin_users,
                    ),
                    enable_tenant_capacity_report_for_environment_admins: from_option(
                        l.enable_tenant_capacity_report_for_environment_admins,
                    ),
                    storage_capacity_consumption_warning_threshold: from_option(
                        l.storage_capacity_consumption_warning_threshold,
                    ),
                }),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TenantSettingsResource {
    handle: ProviderHandle,
}

impl TenantSettingsResource {
    pub fn new(handle: ProviderHandle) -> Self {
        Self { handle }
    }

    /// Write the configured settings and return them as stored
    async fn apply(client: &Client, plan: &TenantSettingsState) -> Result<TenantSettingsState, ApiError> {
        let tenant = client.tenant().get().await?;
        let wanted = plan.to_dto();
        let stored = client.tenant_settings().update(&wanted).await?;
        Ok(TenantSettingsState::from_dto(
            &tenant.tenant_id,
            configured_fields(&wanted, &stored)?,
        ))
    }
}

fn bool_object(names: &[&str]) -> AttributeType {
    AttributeType::Object(
        names
            .iter()
            .map(|name| (name.to_string(), AttributeType::Bool))
            .collect(),
    )
}

fn power_platform_type() -> AttributeType {
    AttributeType::Object(map! {
        "search" => bool_object(&[
            "disable_docs_search",
            "disable_community_search",
            "disable_bing_video_search",
        ]),
        "power_apps" => bool_object(&[
            "disable_share_with_everyone",
            "enable_guests_to_make",
            "disable_maker_match",
            "disable_connection_sharing_with_everyone",
        ]),
        "governance" => bool_object(&[
            "disable_admin_digest",
            "disable_developer_environment_creation_by_non_admin_users",
            "enable_default_environment_routing",
        ]),
        "licensing" => AttributeType::Object(map! {
            "disable_billing_policy_creation_by_non_admin_users" => AttributeType::Bool,
            "enable_tenant_capacity_report_for_environment_admins" => AttributeType::Bool,
            "storage_capacity_consumption_warning_threshold" => AttributeType::Number,
        }),
    })
}

#[async_trait]
impl Resource for TenantSettingsResource {
    type State<'a> = Value<TenantSettingsState>;
    /// Settings found before the first apply
    type PrivateState<'a> = Value<TenantSettingsDto>;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(schema(
            "Manages tenant wide Power Platform settings. Only configured settings are tracked",
            map! {
                "id" => computed(AttributeType::String, "Id of the tenant"),
                "walk_me_opt_out" => optional(AttributeType::Bool, "Opt out of in-product guidance"),
                "disable_nps_comments_reachout" => optional(AttributeType::Bool, "Disable follow up on NPS survey comments"),
                "disable_newsletter_sendout" => optional(AttributeType::Bool, "Disable newsletters"),
                "disable_environment_creation_by_non_admin_users" => optional(AttributeType::Bool, "Only admins can create environments"),
                "disable_portals_creation_by_non_admin_users" => optional(AttributeType::Bool, "Only admins can create portals"),
                "disable_survey_feedback" => optional(AttributeType::Bool, "Disable feedback surveys"),
                "disable_trial_environment_creation_by_non_admin_users" => optional(AttributeType::Bool, "Only admins can create trial environments"),
                "disable_capacity_allocation_by_environment_admins" => optional(AttributeType::Bool, "Environment admins cannot allocate capacity"),
                "disable_support_tickets_visible_by_all_users" => optional(AttributeType::Bool, "Support tickets are visible to their creator only"),
                "power_platform" => optional(power_platform_type(), "Search, Power Apps, governance and licensing settings"),
            },
        ))
    }

    async fn validate<'a>(&self, _diags: &mut Diagnostics, _config: Self::State<'a>) -> Option<()> {
        Some(())
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

        let settings = match client.tenant_settings().get().await {
            Ok(settings) => settings,
            Err(e) => {
                client_error(diags, "Failed to read tenant settings", &e);
                return None;
            }
        };
        match configured_fields(&state.to_dto(), &settings) {
            Ok(settings) => {
                Some((
                    Value::Value(TenantSettingsState::from_dto(str_or_empty(&state.id), settings)),
                    private_state,
                ))
            }
            Err(e) => {
                client_error(diags, "Failed to read tenant settings", &e);
                None
            }
        }
    }

    /// Imports every setting, there is nothing to restore on destroy
    async fn import<'a>(
        &self,
        diags: &mut Diagnostics,
        id: String,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let client = self.handle.client(diags).await?;
        match client.tenant_settings().get().await {
            Ok(settings) => Some((
                Value::Value(TenantSettingsState::from_dto(&id, settings)),
                Value::Null,
            )),
            Err(e) => {
                client_error(diags, "Failed to import tenant settings", &e);
                None
            }
        }
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
        Some((Value::Value(state), Value::Null))
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
        plan.id = prior.id;
        Some((Value::Value(plan), prior_private_state, vec![]))
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
        _private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let plan = expect_state(diags, planned_state)?;
        let client = self.handle.client(diags).await?;

        let original = match client.tenant_settings().get().await {
            Ok(original) => original,
            Err(e) => {
                client_error(diags, "Failed to read tenant settings", &e);
                return None;
            }
        };
        match Self::apply(&client, &plan).await {
            Ok(state) => {
                tracing::info!("Applied tenant settings");
                Some((Value::Value(state), Value::Value(original)))
            }
            Err(e) => {
                client_error(diags, "Failed to apply tenant settings", &e);
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
                client_error(diags, "Failed to apply tenant settings", &e);
                None
            }
        }
    }

    async fn destroy<'a>(
        &self,
        diags: &mut Diagnostics,
        state: Self::State<'a>,
        planned_private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<()> {
        let state = expect_state(diags, state)?;
        diags.root_warning(
            "Tenant settings cannot be deleted",
            "Settings configured by this resource are reset to the values found before it was created",
        );
        let Value::Value(original) = planned_private_state else {
            return Some(());
        };

        let client = self.handle.client(diags).await?;
        let result = match configured_fields(&state.to_dto(), &original) {
            Ok(restore) => client.tenant_settings().update(&restore).await.map(|_| ()),
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => Some(()),
            Err(e) => {
                client_error(diags, "Failed to restore tenant settings", &e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_helpers::create_test_client;
    use crate::values::known;
    use mockito::{Matcher, Server, ServerGuard};

    const TENANT_ID: &str = "00000000-0000-0000-0000-0000000000aa";
    const LIST_PATH: &str = "/providers/Microsoft.BusinessAppPlatform/listTenantSettings";
    const UPDATE_PATH: &str =
        "/providers/Microsoft.BusinessAppPlatform/scopes/admin/updateTenantSettings";
    const CURRENT: &str = r#"{"walkMeOptOut": false, "disableSurveyFeedback": false,
        "powerPlatform": {"search": {"disableDocsSearch": false, "disableCommunitySearch": false}}}"#;

    async fn tenant_mock(server: &mut ServerGuard) {
        server
            .mock("GET", "/providers/Microsoft.BusinessAppPlatform/tenant")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(serde_json::json!({"tenantId": TENANT_ID}).to_string())
            .create_async()
            .await;
    }

    fn resource(server: &Server) -> TenantSettingsResource {
        TenantSettingsResource::new(ProviderHandle::configured(create_test_client(&server.url())))
    }

    fn configured() -> TenantSettingsState {
        TenantSettingsState {
            disable_survey_feedback: Value::Value(true),
            power_platform: Value::Value(PowerPlatformState {
                search: Value::Value(SearchState {
                    disable_docs_search: Value::Value(true),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn dto_leaves_out_unset_settings() {
        assert_eq!(
            serde_json::to_value(configured().to_dto()).unwrap(),
            serde_json::json!({
                "disableSurveyFeedback": true,
                "powerPlatform": {"search": {"disableDocsSearch": true}}
            })
        );
    }

    #[tokio::test]
    async fn create_keeps_original_settings_privately() {
        let mut server = Server::new_async().await;
        tenant_mock(&mut server).await;
        server
            .mock("POST", LIST_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(CURRENT)
            .create_async()
            .await;
        let update = server
            .mock("POST", UPDATE_PATH)
            .match_query(Matcher::Any)
            .match_body(Matcher::Json(serde_json::json!({
                "disableSurveyFeedback": true,
                "powerPlatform": {"search": {"disableDocsSearch": true}}
            })))
            .with_status(200)
            .with_body(
                r#"{"walkMeOptOut": false, "disableSurveyFeedback": true,
                    "powerPlatform": {"search": {"disableDocsSearch": true, "disableCommunitySearch": false}}}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let plan = Value::Value(configured());
        let mut diags = Diagnostics::default();
        let (planned, private_state) = resource(&server)
            .plan_create(&mut diags, plan.clone(), plan.clone(), ValueEmpty::default())
            .await
            .unwrap();
        let (state, private_state) = resource(&server)
            .create(&mut diags, planned, plan, private_state, ValueEmpty::default())
            .await
            .unwrap();

        update.assert_async().await;
        assert!(diags.errors.is_empty());
        let state = known(&state).unwrap();
        assert_eq!(state, &TenantSettingsState { id: string(TENANT_ID), ..configured() });
        let original = known(&private_state).unwrap();
        assert_eq!(original.disable_survey_feedback, Some(false));
    }

    #[tokio::test]
    async fn destroy_restores_original_values_of_configured_settings() {
        let mut server = Server::new_async().await;
        let restore = server
            .mock("POST", UPDATE_PATH)
            .match_query(Matcher::Any)
            .match_body(Matcher::Json(serde_json::json!({
                "disableSurveyFeedback": false,
                "powerPlatform": {"search": {"disableDocsSearch": false}}
            })))
            .with_status(200)
            .with_body(CURRENT)
            .expect(1)
            .create_async()
            .await;

        let original: TenantSettingsDto = serde_json::from_str(CURRENT).unwrap();
        let state = TenantSettingsState { id: string(TENANT_ID), ..configured() };
        let mut diags = Diagnostics::default();
        resource(&server)
            .destroy(&mut diags, Value::Value(state), Value::Value(original), ValueEmpty::default())
            .await
            .unwrap();

        restore.assert_async().await;
        assert_eq!(diags.warnings.len(), 1);
    }

    #[tokio::test]
    async fn destroy_without_original_settings_only_warns() {
        let server = Server::new_async().await;
        let state = TenantSettingsState { id: string(TENANT_ID), ..configured() };
        let mut diags = Diagnostics::default();

        resource(&server)
            .destroy(&mut diags, Value::Value(state), Value::Null, ValueEmpty::default())
            .await
            .unwrap();

        assert!(diags.errors.is_empty());
        assert_eq!(diags.warnings.len(), 1);
    }

    #[tokio::test]
    async fn read_tracks_only_configured_settings() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", LIST_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(CURRENT)
            .create_async()
            .await;

        let prior = TenantSettingsState { id: string(TENANT_ID), ..configured() };
        let mut diags = Diagnostics::default();
        let (state, _) = resource(&server)
            .read(&mut diags, Value::Value(prior), Value::Null, ValueEmpty::default())
            .await
            .unwrap();

        let state = known(&state).unwrap();
        assert_eq!(state.disable_survey_feedback, Value::Value(false));
        assert_eq!(state.walk_me_opt_out, Value::Null);
        let search = known(&known(&state.power_platform).unwrap().search).unwrap();
        assert_eq!(search.disable_docs_search, Value::Value(false));
        assert_eq!(search.disable_community_search, Value::Null);
    }

    #[tokio::test]
    async fn import_reads_every_setting() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", LIST_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(CURRENT)
            .create_async()
            .await;

        let mut diags = Diagnostics::default();
        let (state, private_state) = resource(&server)
            .import(&mut diags, TENANT_ID.to_string())
            .await
            .unwrap();

        assert_eq!(private_state, Value::Null);
        let state = known(&state).unwrap();
        assert_eq!(state.id, string(TENANT_ID));
        assert_eq!(state.walk_me_opt_out, Value::Value(false));
        let power_platform = known(&state.power_platform).unwrap();
        assert_eq!(power_platform.licensing, Value::Null);
    }
}
