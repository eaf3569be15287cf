//! Locations data source

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tf_provider::{map, DataSource, Diagnostics};
use tf_provider::schema::{AttributeType, Schema};
use tf_provider::value::{Value, ValueEmpty};

use crate::api::environments::LocationDto;
use crate::provider_data::{client_error, ProviderHandle};
use crate::schema::{computed, object_list, schema, string_list};
use crate::values::{list, string, string_list as strings_value, StringList};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationsState {
    pub locations: Value<Vec<Value<LocationState>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationState {
    pub id: Value<String>,
    pub name: Value<String>,
    pub display_name: Value<String>,
    pub code: Value<String>,
    pub is_default: Value<bool>,
    pub is_disabled: Value<bool>,
    pub can_provision_database: Value<bool>,
    pub can_provision_customer_engagement_database: Value<bool>,
    pub azure_regions: StringList,
}

impl From<LocationDto> for LocationState {
    fn from(location: LocationDto) -> Self {
        let properties = location.properties;
        Self {
            id: string(location.id),
            name: string(location.name),
            display_name: string(properties.display_name),
            code: string(properties.code),
            is_default: Value::Value(properties.is_default),
            is_disabled: Value::Value(properties.is_disabled),
            can_provision_database: Value::Value(properties.can_provision_database),
            can_provision_customer_engagement_database: Value::Value(
                properties.can_provision_customer_engagement_database,
            ),
            azure_regions: strings_value(properties.azure_regions),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocationsDataSource {
    handle: ProviderHandle,
}

impl LocationsDataSource {
    pub fn new(handle: ProviderHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl DataSource for LocationsDataSource {
    type State<'a> = LocationsState;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(schema(
            "Fetches the list of Power Platform locations available to the tenant",
            map! {
                "locations" => computed(
                    object_list(map! {
                        "id" => AttributeType::String,
                        "name" => AttributeType::String,
                        "display_name" => AttributeType::String,
                        "code" => AttributeType::String,
                        "is_default" => AttributeType::Bool,
                        "is_disabled" => AttributeType::Bool,
                        "can_provision_database" => AttributeType::Bool,
                        "can_provision_customer_engagement_database" => AttributeType::Bool,
                        "azure_regions" => string_list(),
                    }),
                    "List of locations",
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
        match client.environments().get_locations().await {
            Ok(locations) => Some(LocationsState {
                locations: list(locations.into_iter().map(LocationState::from)),
            }),
            Err(e) => {
                client_error(diags, "Failed to read locations", &e);
                None
            }
        }
    }
}
