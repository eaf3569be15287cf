//! Canvas apps per environment

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};

use crate::api::common::{build_url, ApiQueryParams, ArrayResponse};
use crate::api::error::ApiError;
use crate::api::Client;
use crate::config::BAP_API_VERSION;

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PowerAppDto {
    pub name: String,
    pub properties: PowerAppPropertiesDto,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PowerAppPropertiesDto {
    pub display_name: String,
    pub created_time: String,
    pub environment: PowerAppEnvironmentDto,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PowerAppEnvironmentDto {
    pub name: String,
}

pub struct PowerAppsApi<'a> {
    client: &'a Client,
}

impl<'a> PowerAppsApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// GET /providers/Microsoft.PowerApps/scopes/admin/environments/{env}/apps
    pub async fn list(&self, environment_id: &str) -> Result<Vec<PowerAppDto>, ApiError> {
        let url = build_url(
            &self.client.config().urls.powerapps_url,
            &format!(
                "/providers/Microsoft.PowerApps/scopes/admin/environments/{}/apps",
                environment_id
            ),
            &ApiQueryParams::api_version(BAP_API_VERSION),
        );
        let apps: ArrayResponse<PowerAppDto> = self.client.get(&url).await?;
        Ok(apps
            .value
            .into_iter()
            .map(|mut app| {
                if app.properties.environment.name.is_empty() {
                    app.properties.environment.name = environment_id.to_string();
                }
                app
            })
            .collect())
    }

    /// Apps of every environment in the tenant
    pub async fn list_all(&self) -> Result<Vec<PowerAppDto>, ApiError> {
        let environments = self.client.environments().list().await?;
        let per_environment =
            try_join_all(environments.iter().map(|env| self.list(&env.name))).await?;
        Ok(per_environment.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_helpers::create_test_client;
    use mockito::{Matcher, Server};

    #[tokio::test]
    async fn list_all_concatenates_environments() {
        let mut server = Server::new_async().await;
        let _environments = server
            .mock("GET", "/providers/Microsoft.BusinessAppPlatform/scopes/admin/environments")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"value":[{"name":"env-1","properties":{}},{"name":"env-2","properties":{}}]}"#)
            .create_async()
            .await;
        let env1 = server
            .mock("GET", "/providers/Microsoft.PowerApps/scopes/admin/environments/env-1/apps")
            .match_query(Matcher::UrlEncoded("api-version".into(), "2023-06-01".into()))
            .with_status(200)
            .with_body(
                r#"{"value":[{"name":"app-1","properties":{"displayName":"Expenses","createdTime":"2024-01-01T00:00:00Z"}}]}"#,
            )
            .create_async()
            .await;
        let env2 = server
            .mock("GET", "/providers/Microsoft.PowerApps/scopes/admin/environments/env-2/apps")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"value":[{"name":"app-2","properties":{"displayName":"Leave","environment":{"name":"env-2"}}}]}"#,
            )
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        let apps = client.powerapps().list_all().await.unwrap();

        assert_eq!(apps.len(), 2);
        assert_eq!(apps[0].name, "app-1");
        assert_eq!(apps[0].properties.environment.name, "env-1");
        assert_eq!(apps[1].properties.display_name, "Leave");
        env1.assert_async().await;
        env2.assert_async().await;
    }
}
