//! Dataverse organization settings of an environment

use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::api::common::ArrayResponse;
use crate::api::error::ApiError;
use crate::api::Client;
use crate::config::DATAVERSE_API_VERSION;

/// Row of the `organizations` entity set, limited to the settings the provider manages
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct OrganizationSettingsDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organizationid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugintracelogsetting: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isauditenabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isuseraccessauditenabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isreadauditenabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auditretentionperiodv2: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maxuploadfilesize: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounddashboarddefaultcardexpanded: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iscustomcontrolsincanvasappsenabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub powerappsmakerbotenabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aipromptsenabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enableipbasedcookiebinding: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enableipbasedfirewallrule: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowediprangeforfirewall: Option<String>,
}

pub struct EnvironmentSettingsApi<'a> {
    client: &'a Client,
}

impl<'a> EnvironmentSettingsApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    async fn organizations_url(&self, environment_id: &str) -> Result<String, ApiError> {
        let environment = self.client.environments().get(environment_id).await?;
        let instance_url = environment.properties.instance_url().ok_or_else(|| {
            ApiError::EnvironmentUrlNotFound(format!(
                "environment {} has no Dataverse, its settings can't be managed",
                environment_id
            ))
        })?;
        Ok(format!(
            "{}/api/data/{}/organizations",
            instance_url, DATAVERSE_API_VERSION
        ))
    }

    /// GET {instance}/api/data/v9.2/organizations
    pub async fn get(&self, environment_id: &str) -> Result<OrganizationSettingsDto, ApiError> {
        let url = self.organizations_url(environment_id).await?;
        let organizations: ArrayResponse<OrganizationSettingsDto> = self.client.get(&url).await?;
        organizations.value.into_iter().next().ok_or_else(|| {
            ApiError::ObjectNotFound(format!(
                "no organization settings found for environment {}",
                environment_id
            ))
        })
    }

    /// PATCH the organization row with the set fields of `settings`, then read it back
    pub async fn update(
        &self,
        environment_id: &str,
        settings: &OrganizationSettingsDto,
    ) -> Result<OrganizationSettingsDto, ApiError> {
        let current = self.get(environment_id).await?;
        let organization_id = current.organizationid.ok_or_else(|| {
            ApiError::ObjectNotFound(format!(
                "organization of environment {} has no id",
                environment_id
            ))
        })?;

        let url = format!(
            "{}({})",
            self.organizations_url(environment_id).await?,
            organization_id
        );
        let body = OrganizationSettingsDto {
            organizationid: None,
            ..settings.clone()
        };
        tracing::debug!("Updating settings of environment {}", environment_id);
        self.client
            .execute(Method::PATCH, &url, None, Some(&body), &[204])
            .await?;

        self.get(environment_id).await
    }
}
