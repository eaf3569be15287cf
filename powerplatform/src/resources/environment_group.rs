//! Environment group resource

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tf_provider::{map, Diagnostics, Resource};
use tf_provider::schema::{AttributeType, Schema};
use tf_provider::value::{Value, ValueEmpty};

use crate::api::environment_groups::EnvironmentGroupDto;
use crate::api::{ApiError, Client};
use crate::provider_data::{client_error, ProviderHandle};
use crate::resources::{expect_state, imported};
use crate::schema::{computed, required, schema};
use crate::values::{str_or_empty, string};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentGroupState {
    pub id: Value<String>,
    pub display_name: Value<String>,
    pub description: Value<String>,
}

impl From<EnvironmentGroupDto> for EnvironmentGroupState {
    fn from(group: EnvironmentGroupDto) -> Self {
        Self {
            id: string(group.id),
            display_name: string(group.display_name),
            description: string(group.description),
        }
    }
}

impl EnvironmentGroupState {
    fn to_dto(&self) -> EnvironmentGroupDto {
        EnvironmentGroupDto {
            id: String::new(),
            display_name: str_or_empty(&self.display_name).to_string(),
            description: str_or_empty(&self.description).to_string(),
        }
    }
}

/// Delete a group, first moving its environments out when the service refuses
pub async fn delete_group(client: &Client, group_id: &str) -> Result<(), ApiError> {
    let groups = client.environment_groups();
    match groups.delete(group_id).await {
        Err(ApiError::EnvironmentsInEnvGroup(_)) | Err(ApiError::PolicyAssignedToEnvGroup(_)) => {
            let environments = groups.list_environments(group_id).await?;
            tracing::info!(
                "Removing {} environments from group {} before deletion",
                environments.len(),
                group_id
            );
            for environment in &environments {
                groups.remove_environment(group_id, &environment.name).await?;
            }
            groups.delete(group_id).await
        }
        other => other,
    }
}

#[derive(Debug, Clone)]
pub struct EnvironmentGroupResource {
    handle: ProviderHandle,
}

impl EnvironmentGroupResource {
    pub fn new(handle: ProviderHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl Resource for EnvironmentGroupResource {
    type State<'a> = Value<EnvironmentGroupState>;
    type PrivateState<'a> = ValueEmpty;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(schema(
            "Manages an environment group",
            map! {
                "id" => computed(AttributeType::String, "Environment group id"),
                "display_name" => required(AttributeType::String, "Display name of the group"),
                "description" => required(AttributeType::String, "Description of the group"),
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
        let id = str_or_empty(&state.id);

        match client.environment_groups().get(id).await {
            Ok(Some(group)) => Some((Value::Value(group.into()), private_state)),
            Ok(None) => {
                tracing::info!("Environment group {} no longer exists, removing from state", id);
                Some((Value::Null, private_state))
            }
            Err(e) => {
                client_error(diags, format!("Failed to read environment group '{}'", id), &e);
                None
            }
        }
    }

    async fn import<'a>(
        &self,
        diags: &mut Diagnostics,
        id: String,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let state = Value::Value(EnvironmentGroupState {
            id: string(id.clone()),
            ..Default::default()
        });
        let read = self
            .read(diags, state, ValueEmpty::default(), ValueEmpty::default())
            .await;
        imported(diags, "environment group", &id, read)
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
        Some((Value::Value(state), Default::default()))
    }

    async fn plan_update<'a>(
        &self,
        _diags: &mut Diagnostics,
        _prior_state: Self::State<'a>,
        proposed_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        prior_private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(
        Self::State<'a>,
        Self::PrivateState<'a>,
        Vec<tf_provider::AttributePath>,
    )> {
        Some((proposed_state, prior_private_state, vec![]))
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

        match client.environment_groups().create(&plan.to_dto()).await {
            Ok(group) => {
                tracing::info!("Created environment group {}", group.id);
                Some((Value::Value(group.into()), private_state))
            }
            Err(e) => {
                client_error(diags, "Failed to create environment group", &e);
                None
            }
        }
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
        let client = self.handle.client(diags).await?;
        let id = str_or_empty(&prior.id);

        let mut group = plan.to_dto();
        group.id = id.to_string();
        match client.environment_groups().update(id, &group).await {
            Ok(group) => Some((Value::Value(group.into()), private_state)),
            Err(e) => {
                client_error(diags, format!("Failed to update environment group '{}'", id), &e);
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
        let client = self.handle.client(diags).await?;
        let id = str_or_empty(&state.id);

        match delete_group(&client, id).await {
            Ok(()) => Some(()),
            Err(e) => {
                client_error(diags, format!("Failed to delete environment group '{}'", id), &e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_helpers::create_test_client;
    use mockito::{Matcher, Server};

    const GROUP_ID: &str = "11111111-1111-1111-1111-111111111111";
    const GROUP_PATH: &str =
        "/providers/Microsoft.BusinessAppPlatform/environmentGroups/11111111-1111-1111-1111-111111111111";

    #[tokio::test]
    async fn destroy_empties_group_before_retrying() {
        let mut server = Server::new_async().await;
        let refused = server
            .mock("DELETE", GROUP_PATH)
            .match_query(Matcher::Any)
            .with_status(409)
            .with_body(r#"{"error": {"code": "EnvironmentsInEnvironmentGroup"}}"#)
            .expect(1)
            .create_async()
            .await;
        let deleted = server
            .mock("DELETE", GROUP_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .create_async()
            .await;
        server
            .mock("GET", "/providers/Microsoft.BusinessAppPlatform/scopes/admin/environments")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"value": [{"name": "env-1"}]}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/providers/Microsoft.BusinessAppPlatform/tenant")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"tenantId": "00000000-0000-0000-0000-000000000001"}"#)
            .create_async()
            .await;
        let removed = server
            .mock(
                "POST",
                format!(
                    "/environmentmanagement/environmentGroups/{}/removeEnvironment/env-1",
                    GROUP_ID
                )
                .as_str(),
            )
            .match_query(Matcher::Any)
            .with_status(202)
            .create_async()
            .await;

        let resource = EnvironmentGroupResource::new(ProviderHandle::configured(create_test_client(
            &server.url(),
        )));
        let mut diags = Diagnostics::default();
        let state = Value::Value(EnvironmentGroupState {
            id: string(GROUP_ID),
            display_name: string("group"),
            description: string("desc"),
        });

        assert!(resource
            .destroy(&mut diags, state, ValueEmpty::default(), ValueEmpty::default())
            .await
            .is_some());
        refused.assert_async().await;
        removed.assert_async().await;
        deleted.assert_async().await;
    }

    #[tokio::test]
    async fn read_drops_missing_group() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", GROUP_PATH)
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let resource = EnvironmentGroupResource::new(ProviderHandle::configured(create_test_client(
            &server.url(),
        )));
        let mut diags = Diagnostics::default();
        let state = Value::Value(EnvironmentGroupState {
            id: string(GROUP_ID),
            ..Default::default()
        });

        let (state, _) = resource
            .read(&mut diags, state, ValueEmpty::default(), ValueEmpty::default())
            .await
            .unwrap();
        assert_eq!(state, Value::Null);
    }

    #[tokio::test]
    async fn unconfigured_provider_reports_diagnostic() {
        let resource = EnvironmentGroupResource::new(ProviderHandle::default());
        let mut diags = Diagnostics::default();
        let plan = Value::Value(EnvironmentGroupState::default());

        assert!(resource
            .create(&mut diags, plan.clone(), plan, ValueEmpty::default(), ValueEmpty::default())
            .await
            .is_none());
        assert_eq!(diags.errors.len(), 1);
    }

    #[tokio::test]
    async fn import_reads_group_by_id() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", GROUP_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "id": GROUP_ID,
                    "displayName": "Finance",
                    "description": "Finance environments"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let resource = EnvironmentGroupResource::new(ProviderHandle::configured(create_test_client(
            &server.url(),
        )));
        let mut diags = Diagnostics::default();
        let (state, _) = resource
            .import(&mut diags, GROUP_ID.to_string())
            .await
            .unwrap();

        assert_eq!(
            state,
            Value::Value(EnvironmentGroupState {
                id: string(GROUP_ID),
                display_name: string("Finance"),
                description: string("Finance environments"),
            })
        );
    }
}
