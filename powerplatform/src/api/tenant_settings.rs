//! Tenant wide Power Platform settings

use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::api::common::{build_url, ApiQueryParams};
use crate::api::error::ApiError;
use crate::api::Client;
use crate::config::BAP_API_VERSION;

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TenantSettingsDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub walk_me_opt_out: Option<bool>,
    #[serde(rename = "disableNPSCommentsReachout", skip_serializing_if = "Option::is_none")]
    pub disable_nps_comments_reachout: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_newsletter_sendout: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_environment_creation_by_non_admin_users: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_portals_creation_by_non_admin_users: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_survey_feedback: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_trial_environment_creation_by_non_admin_users: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_capacity_allocation_by_environment_admins: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_support_tickets_visible_by_all_users: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_platform: Option<PowerPlatformSettingsDto>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PowerPlatformSettingsDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<SearchSettingsDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_apps: Option<PowerAppsSettingsDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub governance: Option<GovernanceSettingsDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub licensing: Option<LicensingSettingsDto>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchSettingsDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_docs_search: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_community_search: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_bing_video_search: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PowerAppsSettingsDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_share_with_everyone: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_guests_to_make: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_maker_match: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_connection_sharing_with_everyone: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GovernanceSettingsDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_admin_digest: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_developer_environment_creation_by_non_admin_users: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_default_environment_routing: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LicensingSettingsDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_billing_policy_creation_by_non_admin_users: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_tenant_capacity_report_for_environment_admins: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_capacity_consumption_warning_threshold: Option<i64>,
}

pub struct TenantSettingsApi<'a> {
    client: &'a Client,
}

impl<'a> TenantSettingsApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// POST /providers/Microsoft.BusinessAppPlatform/listTenantSettings
    pub async fn get(&self) -> Result<TenantSettingsDto, ApiError> {
        let url = build_url(
            &self.client.config().urls.bapi_url,
            "/providers/Microsoft.BusinessAppPlatform/listTenantSettings",
            &ApiQueryParams::api_version(BAP_API_VERSION),
        );
        self.client
            .execute_json::<TenantSettingsDto, ()>(Method::POST, &url, None, &[200])
            .await
    }

    /// POST the set fields of `settings` and return every setting as stored
    pub async fn update(&self, settings: &TenantSettingsDto) -> Result<TenantSettingsDto, ApiError> {
        let url = build_url(
            &self.client.config().urls.bapi_url,
            "/providers/Microsoft.BusinessAppPlatform/scopes/admin/updateTenantSettings",
            &ApiQueryParams::api_version(BAP_API_VERSION),
        );
        tracing::debug!("Updating tenant settings");
        self.client
            .execute_json(Method::POST, &url, Some(settings), &[200])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_helpers::create_test_client;
    use mockito::{Matcher, Server};

    #[tokio::test]
    async fn update_sends_only_set_fields() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock(
                "POST",
                "/providers/Microsoft.BusinessAppPlatform/scopes/admin/updateTenantSettings",
            )
            .match_query(Matcher::UrlEncoded("api-version".into(), BAP_API_VERSION.into()))
            .match_body(Matcher::Json(serde_json::json!({
                "disableNPSCommentsReachout": true,
                "powerPlatform": {"search": {"disableDocsSearch": false}}
            })))
            .with_status(200)
            .with_body(
                r#"{"walkMeOptOut": false, "disableNPSCommentsReachout": true,
                    "powerPlatform": {"search": {"disableDocsSearch": false, "disableCommunitySearch": true}}}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        let settings = TenantSettingsDto {
            disable_nps_comments_reachout: Some(true),
            power_platform: Some(PowerPlatformSettingsDto {
                search: Some(SearchSettingsDto {
                    disable_docs_search: Some(false),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        let stored = client.tenant_settings().update(&settings).await.unwrap();

        mock.assert_async().await;
        assert_eq!(stored.walk_me_opt_out, Some(false));
        let search = stored.power_platform.and_then(|p| p.search).unwrap();
        assert_eq!(search.disable_community_search, Some(true));
    }
}
