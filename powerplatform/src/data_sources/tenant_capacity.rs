//! Tenant capacity data source

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tf_provider::{map, AttributePath, DataSource, Diagnostics};
use tf_provider::schema::{AttributeType, Schema};
use tf_provider::value::{Value, ValueEmpty};

use crate::api::licensing::{OverflowCapacityDto, TenantCapacityEntryDto};
use crate::provider_data::{client_error, ProviderHandle};
use crate::schema::{computed, object_list, required, schema};
use crate::values::{known_str, list, string};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TenantCapacityState {
    pub tenant_id: Value<String>,
    pub license_model_type: Value<String>,
    pub tenant_capacities: Value<Vec<Value<CapacityState>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapacityState {
    pub capacity_type: Value<String>,
    pub capacity_units: Value<String>,
    pub total_capacity: Value<f64>,
    pub max_capacity: Value<f64>,
    pub status: Value<String>,
    pub consumption: Value<ConsumptionState>,
    pub overflow_capacity: Value<Vec<Value<OverflowState>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionState {
    pub actual: Value<f64>,
    pub rated: Value<f64>,
    pub actual_updated_on: Value<String>,
    pub rated_updated_on: Value<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverflowState {
    pub capacity_type: Value<String>,
    pub value: Value<f64>,
}

impl From<OverflowCapacityDto> for OverflowState {
    fn from(overflow: OverflowCapacityDto) -> Self {
        Self {
            capacity_type: string(overflow.capacity_type),
            value: Value::Value(overflow.value),
        }
    }
}

impl From<TenantCapacityEntryDto> for CapacityState {
    fn from(capacity: TenantCapacityEntryDto) -> Self {
        let consumption = capacity.consumption;
        Self {
            capacity_type: string(capacity.capacity_type),
            capacity_units: string(capacity.capacity_units),
            total_capacity: Value::Value(capacity.total_capacity),
            max_capacity: Value::Value(capacity.max_capacity),
            status: string(capacity.status),
            consumption: Value::Value(ConsumptionState {
                actual: Value::Value(consumption.actual),
                rated: Value::Value(consumption.rated),
                actual_updated_on: string(consumption.actual_updated_on),
                rated_updated_on: string(consumption.rated_updated_on),
            }),
            overflow_capacity: list(capacity.overflow_capacity.into_iter().map(OverflowState::from)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TenantCapacityDataSource {
    handle: ProviderHandle,
}

impl TenantCapacityDataSource {
    pub fn new(handle: ProviderHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl DataSource for TenantCapacityDataSource {
    type State<'a> = TenantCapacityState;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(schema(
            "Fetches the storage and licence capacity of a tenant",
            map! {
                "tenant_id" => required(AttributeType::String, "Tenant id"),
                "license_model_type" => computed(AttributeType::String, "Licence model of the tenant"),
                "tenant_capacities" => computed(
                    object_list(map! {
                        "capacity_type" => AttributeType::String,
                        "capacity_units" => AttributeType::String,
                        "total_capacity" => AttributeType::Number,
                        "max_capacity" => AttributeType::Number,
                        "status" => AttributeType::String,
                        "consumption" => AttributeType::Object(map! {
                            "actual" => AttributeType::Number,
                            "rated" => AttributeType::Number,
                            "actual_updated_on" => AttributeType::String,
                            "rated_updated_on" => AttributeType::String,
                        }),
                        "overflow_capacity" => object_list(map! {
                            "capacity_type" => AttributeType::String,
                            "value" => AttributeType::Number,
                        }),
                    }),
                    "Capacity per capacity type",
                ),
            },
        ))
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, config: Self::State<'a>) -> Option<()> {
        if let Value::Value(tenant_id) = &config.tenant_id {
            if uuid::Uuid::parse_str(tenant_id).is_err() {
                diags.error(
                    "Invalid tenant id",
                    format!("'{}' is not a valid UUID", tenant_id),
                    AttributePath::new("tenant_id"),
                );
                return None;
            }
        }
        Some(())
    }

    async fn read<'a>(
        &self,
        diags: &mut Diagnostics,
        config: Self::State<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<Self::State<'a>> {
        let client = self.handle.client(diags).await?;
        let tenant_id = known_str(&config.tenant_id).unwrap_or_default();
        match client.licensing().tenant_capacity(tenant_id).await {
            Ok(capacity) => Some(TenantCapacityState {
                license_model_type: string(capacity.license_model_type),
                tenant_capacities: list(
                    capacity.tenant_capacities.into_iter().map(CapacityState::from),
                ),
                ..config
            }),
            Err(e) => {
                client_error(diags, format!("Failed to read capacity of tenant '{}'", tenant_id), &e);
                None
            }
        }
    }
}
