//! Connector catalogue data source

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tf_provider::{map, DataSource, Diagnostics};
use tf_provider::schema::{AttributeType, Schema};
use tf_provider::value::{Value, ValueEmpty};

use crate::api::connectors::ConnectorDto;
use crate::provider_data::{client_error, ProviderHandle};
use crate::schema::{computed, object_list, schema};
use crate::values::{list, string};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectorsState {
    pub connectors: Value<Vec<Value<ConnectorState>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectorState {
    pub id: Value<String>,
    pub name: Value<String>,
    pub display_name: Value<String>,
    pub description: Value<String>,
    pub publisher: Value<String>,
    pub tier: Value<String>,
    #[serde(rename = "type")]
    pub connector_type: Value<String>,
    pub unblockable: Value<bool>,
}

impl From<ConnectorDto> for ConnectorState {
    fn from(connector: ConnectorDto) -> Self {
        Self {
            id: string(connector.id),
            name: string(connector.name),
            display_name: string(connector.properties.display_name),
            description: string(connector.properties.description),
            publisher: string(connector.properties.publisher),
            tier: string(connector.properties.tier),
            connector_type: string(connector.connector_type),
            unblockable: Value::Value(connector.properties.unblockable),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectorsDataSource {
    handle: ProviderHandle,
}

impl ConnectorsDataSource {
    pub fn new(handle: ProviderHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl DataSource for ConnectorsDataSource {
    type State<'a> = ConnectorsState;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(schema(
            "Fetches the list of available connectors, including virtual ones",
            map! {
                "connectors" => computed(
                    object_list(map! {
                        "id" => AttributeType::String,
                        "name" => AttributeType::String,
                        "display_name" => AttributeType::String,
                        "description" => AttributeType::String,
                        "publisher" => AttributeType::String,
                        "tier" => AttributeType::String,
                        "type" => AttributeType::String,
                        "unblockable" => AttributeType::Bool,
                    }),
                    "List of connectors",
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
        match client.connectors().list().await {
            Ok(connectors) => Some(ConnectorsState {
                connectors: list(connectors.into_iter().map(ConnectorState::from)),
            }),
            Err(e) => {
                client_error(diags, "Failed to read connectors", &e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_helpers::create_test_client;
    use crate::values::items;
    use mockito::{Matcher, Server};

    #[tokio::test]
    async fn read_lists_unblockable_and_virtual_connectors() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/providers/Microsoft.PowerApps/apis")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                serde_json::json!({"value": [{
                    "id": "/providers/Microsoft.PowerApps/apis/shared_office365",
                    "name": "shared_office365",
                    "type": "Microsoft.PowerApps/apis",
                    "properties": {"displayName": "Office 365 Outlook", "tier": "Standard", "publisher": "Microsoft"}
                }]})
                .to_string(),
            )
            .create_async()
            .await;
        server
            .mock("GET", "/providers/PowerPlatform.Governance/v1/connectors/metadata/unblockable")
            .with_status(200)
            .with_body(
                serde_json::json!([{
                    "id": "/providers/Microsoft.PowerApps/apis/shared_office365",
                    "metadata": {"unblockable": true}
                }])
                .to_string(),
            )
            .create_async()
            .await;
        server
            .mock("GET", "/providers/PowerPlatform.Governance/v1/connectors/metadata/virtual")
            .with_status(200)
            .with_body(
                serde_json::json!([{
                    "id": "/providers/Microsoft.ProcessSimple/operations/HttpWebhook",
                    "metadata": {"name": "Http Webhook", "type": "Microsoft.PowerApps/apis", "displayName": "HTTP Webhook"}
                }])
                .to_string(),
            )
            .create_async()
            .await;

        let data_source =
            ConnectorsDataSource::new(ProviderHandle::configured(create_test_client(&server.url())));
        let mut diags = Diagnostics::default();

        let state = data_source
            .read(&mut diags, ConnectorsState::default(), ValueEmpty::default())
            .await
            .unwrap();

        assert!(diags.errors.is_empty());
        let connectors = items(&state.connectors);
        assert_eq!(connectors.len(), 2);
        assert_eq!(connectors[0].name, string("shared_office365"));
        assert_eq!(connectors[0].unblockable, Value::Value(true));
        assert_eq!(connectors[0].connector_type, string("Microsoft.PowerApps/apis"));

        let webhook = connectors[1];
        assert_eq!(webhook.name, string("HttpWebhook"));
        assert_eq!(webhook.display_name, string("HTTP Webhook"));
        assert_eq!(webhook.tier, string("Built-in"));
        assert_eq!(webhook.publisher, string("Microsoft"));
        assert_eq!(webhook.unblockable, Value::Value(false));
    }

    #[tokio::test]
    async fn read_reports_catalogue_failure() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/providers/Microsoft.PowerApps/apis")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_body(r#"{"error":{"code":"Forbidden","message":"denied"}}"#)
            .create_async()
            .await;

        let data_source =
            ConnectorsDataSource::new(ProviderHandle::configured(create_test_client(&server.url())));
        let mut diags = Diagnostics::default();

        assert!(data_source
            .read(&mut diags, ConnectorsState::default(), ValueEmpty::default())
            .await
            .is_none());
        assert_eq!(diags.errors.len(), 1);
    }
}
