//! Every environment of the tenant

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tf_provider::{map, DataSource, Diagnostics};
use tf_provider::schema::{AttributeType, Schema};
use tf_provider::value::{Value, ValueEmpty};

use crate::api::ApiError;
use crate::provider_data::{client_error, ProviderHandle};
use crate::resources::environment::{environment_object_type, EnvironmentState};
use crate::schema::{computed, schema};
use crate::values::list;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentsState {
    pub environments: Value<Vec<Value<EnvironmentState>>>,
}

#[derive(Debug, Clone)]
pub struct EnvironmentsDataSource {
    handle: ProviderHandle,
}

impl EnvironmentsDataSource {
    pub fn new(handle: ProviderHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl DataSource for EnvironmentsDataSource {
    type State<'a> = EnvironmentsState;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(schema(
            "Fetches the list of environments in a tenant",
            map! {
                "environments" => computed(
                    AttributeType::List(environment_object_type().into()),
                    "List of environments",
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
        _config: Self::State<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<Self::State<'a>> {
        let client = self.handle.client(diags).await?;
        let environments = match client.environments().list().await {
            Ok(environments) => environments,
            Err(e) => {
                client_error(diags, "Failed to read environments", &e);
                return None;
            }
        };

        let mut states = Vec::with_capacity(environments.len());
        for env in environments {
            let currency = if env.properties.instance_url().is_some() {
                match client.environments().get_default_currency(&env.name).await {
                    Ok(currency) => Some(currency.iso_currency_code),
                    Err(ApiError::EnvironmentUrlNotFound(_)) => None,
                    Err(e) => {
                        client_error(
                            diags,
                            format!("Failed to read default currency of environment '{}'", env.name),
                            &e,
                        );
                        return None;
                    }
                }
            } else {
                None
            };
            states.push(EnvironmentState::from_dto(env, currency));
        }

        tracing::debug!("Read {} environments", states.len());
        Some(EnvironmentsState {
            environments: list(states),
        })
    }
}
