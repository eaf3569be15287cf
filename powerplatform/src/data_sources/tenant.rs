//! Tenant details data source

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tf_provider::{map, DataSource, Diagnostics};
use tf_provider::schema::{AttributeType, Schema};
use tf_provider::value::{Value, ValueEmpty};

use crate::api::tenant::TenantDto;
use crate::provider_data::{client_error, ProviderHandle};
use crate::schema::{computed, schema};
use crate::values::string;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TenantState {
    pub tenant_id: Value<String>,
    pub state: Value<String>,
    pub location: Value<String>,
    pub aad_country_geo: Value<String>,
    pub data_storage_geo: Value<String>,
    pub default_environment_geo: Value<String>,
    pub aad_data_boundary: Value<String>,
    pub fed_ramp_high_certification_required: Value<bool>,
}

impl From<TenantDto> for TenantState {
    fn from(tenant: TenantDto) -> Self {
        Self {
            tenant_id: string(tenant.tenant_id),
            state: string(tenant.state),
            location: string(tenant.location),
            aad_country_geo: string(tenant.aad_country_geo),
            data_storage_geo: string(tenant.data_storage_geo),
            default_environment_geo: string(tenant.default_environment_geo),
            aad_data_boundary: string(tenant.aad_data_boundary),
            fed_ramp_high_certification_required: Value::Value(
                tenant.fed_ramp_high_certification_required,
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TenantDataSource {
    handle: ProviderHandle,
}

impl TenantDataSource {
    pub fn new(handle: ProviderHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl DataSource for TenantDataSource {
    type State<'a> = TenantState;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(schema(
            "Fetches details of the tenant the provider is authenticated against",
            map! {
                "tenant_id" => computed(AttributeType::String, "Tenant id"),
                "state" => computed(AttributeType::String, "Tenant state"),
                "location" => computed(AttributeType::String, "Tenant location"),
                "aad_country_geo" => computed(AttributeType::String, "Entra ID country geo"),
                "data_storage_geo" => computed(AttributeType::String, "Data storage geo"),
                "default_environment_geo" => computed(AttributeType::String, "Default environment geo"),
                "aad_data_boundary" => computed(AttributeType::String, "Entra ID data boundary"),
                "fed_ramp_high_certification_required" => computed(
                    AttributeType::Bool,
                    "Whether FedRAMP High certification is required",
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
        match client.tenant().get().await {
            Ok(tenant) => Some(tenant.into()),
            Err(e) => {
                client_error(diags, "Failed to read tenant", &e);
                None
            }
        }
    }
}
