//! Canvas apps across all environments

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tf_provider::{map, DataSource, Diagnostics};
use tf_provider::schema::{AttributeType, Schema};
use tf_provider::value::{Value, ValueEmpty};

use crate::api::powerapps::PowerAppDto;
use crate::provider_data::{client_error, ProviderHandle};
use crate::schema::{computed, object_list, schema};
use crate::values::{list, string};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerAppsState {
    pub powerapps: Value<Vec<Value<PowerAppState>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerAppState {
    pub id: Value<String>,
    pub name: Value<String>,
    pub display_name: Value<String>,
    pub created_time: Value<String>,
}

impl From<PowerAppDto> for PowerAppState {
    fn from(app: PowerAppDto) -> Self {
        Self {
            id: string(app.properties.environment.name),
            name: string(app.name),
            display_name: string(app.properties.display_name),
            created_time: string(app.properties.created_time),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnvironmentPowerAppsDataSource {
    handle: ProviderHandle,
}

impl EnvironmentPowerAppsDataSource {
    pub fn new(handle: ProviderHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl DataSource for EnvironmentPowerAppsDataSource {
    type State<'a> = PowerAppsState;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(schema(
            "Fetches the list of canvas apps of every environment",
            map! {
                "powerapps" => computed(
                    object_list(map! {
                        "id" => AttributeType::String,
                        "name" => AttributeType::String,
                        "display_name" => AttributeType::String,
                        "created_time" => AttributeType::String,
                    }),
                    "List of canvas apps; `id` is the owning environment",
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
        match client.powerapps().list_all().await {
            Ok(apps) => Some(PowerAppsState {
                powerapps: list(apps.into_iter().map(PowerAppState::from)),
            }),
            Err(e) => {
                client_error(diags, "Failed to read canvas apps", &e);
                None
            }
        }
    }
}
