//! Connector catalogue

use serde::{Deserialize, Serialize};

use crate::api::common::{build_url, last_segment, ApiQueryParams, ArrayResponse};
use crate::api::error::ApiError;
use crate::api::Client;
use crate::config::CONNECTORS_API_VERSION;

const GOVERNANCE_METADATA_PATH: &str = "/providers/PowerPlatform.Governance/v1/connectors/metadata";

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ConnectorDto {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub connector_type: String,
    pub properties: ConnectorPropertiesDto,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectorPropertiesDto {
    pub display_name: String,
    pub description: String,
    pub publisher: String,
    pub tier: String,
    pub unblockable: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct UnblockableConnectorDto {
    id: String,
    metadata: UnblockableMetadataDto,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct UnblockableMetadataDto {
    unblockable: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct VirtualConnectorDto {
    id: String,
    metadata: VirtualMetadataDto,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct VirtualMetadataDto {
    name: String,
    #[serde(rename = "type")]
    connector_type: String,
    display_name: String,
}

pub struct ConnectorsApi<'a> {
    client: &'a Client,
}

impl<'a> ConnectorsApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Tenant connectors with their DLP unblockable flag, followed by the virtual connectors
    pub async fn list(&self) -> Result<Vec<ConnectorDto>, ApiError> {
        let urls = &self.client.config().urls;

        let apis_url = build_url(
            &urls.powerapps_url,
            "/providers/Microsoft.PowerApps/apis",
            &ApiQueryParams::api_version(CONNECTORS_API_VERSION)
                .add("showApisWithToS", "true")
                .add("hideDlpExemptApis", "true")
                .add("showAllDlpEnforceableApis", "true")
                .add("$filter", "environment eq '~Default'"),
        );
        let mut connectors = self
            .client
            .get::<ArrayResponse<ConnectorDto>>(&apis_url)
            .await?
            .value;

        let unblockable: Vec<UnblockableConnectorDto> = self
            .client
            .get(&build_url(
                &urls.bapi_url,
                &format!("{}/unblockable", GOVERNANCE_METADATA_PATH),
                &ApiQueryParams::new(),
            ))
            .await?;
        for connector in connectors.iter_mut() {
            if let Some(flag) = unblockable.iter().find(|u| u.id == connector.id) {
                connector.properties.unblockable = flag.metadata.unblockable;
            }
        }

        let virtual_connectors: Vec<VirtualConnectorDto> = self
            .client
            .get(&build_url(
                &urls.bapi_url,
                &format!("{}/virtual", GOVERNANCE_METADATA_PATH),
                &ApiQueryParams::new(),
            ))
            .await?;
        connectors.extend(virtual_connectors.into_iter().map(|v| ConnectorDto {
            id: v.id,
            name: v.metadata.name,
            connector_type: v.metadata.connector_type,
            properties: ConnectorPropertiesDto {
                display_name: v.metadata.display_name,
                tier: "Built-in".to_string(),
                publisher: "Microsoft".to_string(),
                ..Default::default()
            },
        }));

        for connector in connectors.iter_mut() {
            connector.name = last_segment(&connector.id).to_string();
        }
        tracing::debug!("Found {} connectors", connectors.len());
        Ok(connectors)
    }
}
