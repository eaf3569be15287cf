//! Dataverse currencies available in a location

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tf_provider::{map, DataSource, Diagnostics};
use tf_provider::schema::{AttributeType, Schema};
use tf_provider::value::{Value, ValueEmpty};

use crate::api::environments::CurrencyDto;
use crate::provider_data::{client_error, ProviderHandle};
use crate::schema::{computed, object_list, required, schema};
use crate::values::{known_str, list, string};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrenciesState {
    pub location: Value<String>,
    pub currencies: Value<Vec<Value<CurrencyState>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrencyState {
    pub id: Value<String>,
    pub name: Value<String>,
    #[serde(rename = "type")]
    pub currency_type: Value<String>,
    pub code: Value<String>,
    pub symbol: Value<String>,
    pub is_tenant_default: Value<bool>,
}

impl From<CurrencyDto> for CurrencyState {
    fn from(currency: CurrencyDto) -> Self {
        Self {
            id: string(currency.id),
            name: string(currency.name),
            currency_type: string(currency.resource_type),
            code: string(currency.properties.code),
            symbol: string(currency.properties.symbol),
            is_tenant_default: Value::Value(currency.properties.is_tenant_default),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CurrenciesDataSource {
    handle: ProviderHandle,
}

impl CurrenciesDataSource {
    pub fn new(handle: ProviderHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl DataSource for CurrenciesDataSource {
    type State<'a> = CurrenciesState;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(schema(
            "Fetches the list of Dataverse currencies for a given location",
            map! {
                "location" => required(AttributeType::String, "Location of the currencies"),
                "currencies" => computed(
                    object_list(map! {
                        "id" => AttributeType::String,
                        "name" => AttributeType::String,
                        "type" => AttributeType::String,
                        "code" => AttributeType::String,
                        "symbol" => AttributeType::String,
                        "is_tenant_default" => AttributeType::Bool,
                    }),
                    "List of available currencies",
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
        config: Self::State<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<Self::State<'a>> {
        let client = self.handle.client(diags).await?;
        let location = known_str(&config.location).unwrap_or_default();
        match client.environments().get_currencies(location).await {
            Ok(currencies) => Some(CurrenciesState {
                currencies: list(currencies.into_iter().map(CurrencyState::from)),
                ..config
            }),
            Err(e) => {
                client_error(diags, format!("Failed to read currencies for '{}'", location), &e);
                None
            }
        }
    }
}
