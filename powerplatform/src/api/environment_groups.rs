//! Environment group API

use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::api::common::{build_url, ApiQueryParams, ArrayResponse};
use crate::api::environments::EnvironmentDto;
use crate::api::error::ApiError;
use crate::api::Client;
use crate::config::BAP_2021_API_VERSION;

const ENVIRONMENT_GROUPS_PATH: &str = "/providers/Microsoft.BusinessAppPlatform/environmentGroups";

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentGroupDto {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
}

pub struct EnvironmentGroupsApi<'a> {
    client: &'a Client,
}

impl<'a> EnvironmentGroupsApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    fn group_url(&self, group_id: Option<&str>) -> String {
        let path = match group_id {
            Some(id) => format!("{}/{}", ENVIRONMENT_GROUPS_PATH, id),
            None => ENVIRONMENT_GROUPS_PATH.to_string(),
        };
        build_url(
            &self.client.config().urls.bapi_url,
            &path,
            &ApiQueryParams::api_version(BAP_2021_API_VERSION),
        )
    }

    /// POST /providers/Microsoft.BusinessAppPlatform/environmentGroups
    pub async fn create(&self, group: &EnvironmentGroupDto) -> Result<EnvironmentGroupDto, ApiError> {
        self.client
            .execute_json(Method::POST, &self.group_url(None), Some(group), &[201])
            .await
    }

    /// GET /providers/Microsoft.BusinessAppPlatform/environmentGroups/{id}, `None` when absent
    pub async fn get(&self, group_id: &str) -> Result<Option<EnvironmentGroupDto>, ApiError> {
        let response = self
            .client
            .execute::<()>(Method::GET, &self.group_url(Some(group_id)), None, None, &[200, 404])
            .await?;
        if response.status == 404 {
            return Ok(None);
        }
        response.json().map(Some)
    }

    /// PUT /providers/Microsoft.BusinessAppPlatform/environmentGroups/{id}
    pub async fn update(
        &self,
        group_id: &str,
        group: &EnvironmentGroupDto,
    ) -> Result<EnvironmentGroupDto, ApiError> {
        self.client
            .execute_json(Method::PUT, &self.group_url(Some(group_id)), Some(group), &[200])
            .await
    }

    /// DELETE /providers/Microsoft.BusinessAppPlatform/environmentGroups/{id}
    pub async fn delete(&self, group_id: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .execute::<()>(Method::DELETE, &self.group_url(Some(group_id)), None, None, &[200, 409])
            .await?;
        if response.status != 409 {
            return Ok(());
        }

        if response.is_empty() {
            return Err(ApiError::Validation("failed to delete environment group".to_string()));
        }
        if response.body.contains("EnvironmentsInEnvironmentGroup") {
            return Err(ApiError::EnvironmentsInEnvGroup(
                "failed to delete environment group because it contains environments".to_string(),
            ));
        }
        if response.body.contains("PolicyAssignedToEnvironmentGroup") {
            return Err(ApiError::PolicyAssignedToEnvGroup(
                "failed to delete environment group because it has a policy assigned".to_string(),
            ));
        }
        Err(ApiError::Validation(response.body))
    }

    /// Environments whose parent group is `group_id`
    pub async fn list_environments(&self, group_id: &str) -> Result<Vec<EnvironmentDto>, ApiError> {
        let url = build_url(
            &self.client.config().urls.bapi_url,
            "/providers/Microsoft.BusinessAppPlatform/scopes/admin/environments",
            &ApiQueryParams::api_version(BAP_2021_API_VERSION).add(
                "$filter",
                format!("properties/parentEnvironmentGroup/id eq {}", group_id),
            ),
        );
        let environments: ArrayResponse<EnvironmentDto> = self.client.get(&url).await?;
        Ok(environments.value)
    }

    /// POST {tenant}/environmentmanagement/environmentGroups/{group}/removeEnvironment/{env}
    pub async fn remove_environment(&self, group_id: &str, environment_id: &str) -> Result<(), ApiError> {
        let host = self.client.tenant().host_url().await?;
        let url = build_url(
            &host,
            &format!(
                "/environmentmanagement/environmentGroups/{}/removeEnvironment/{}",
                group_id, environment_id
            ),
            &ApiQueryParams::api_version("1"),
        );
        let response = self
            .client
            .execute::<()>(Method::POST, &url, None, None, &[202])
            .await?;
        self.client.wait_for_lifecycle_success(&response).await?;
        Ok(())
    }
}
