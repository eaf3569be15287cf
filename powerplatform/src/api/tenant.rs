//! Tenant information

use serde::{Deserialize, Serialize};

use crate::api::common::{build_url, ApiQueryParams};
use crate::api::error::ApiError;
use crate::api::Client;
use crate::config::TENANT_API_VERSION;

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct TenantDto {
    pub tenant_id: String,
    pub state: String,
    pub location: String,
    pub aad_country_geo: String,
    pub data_storage_geo: String,
    pub default_environment_geo: String,
    pub aad_data_boundary: String,
    #[serde(rename = "fedRAMPHighCertificationRequired")]
    pub fed_ramp_high_certification_required: bool,
}

pub struct TenantApi<'a> {
    client: &'a Client,
}

impl<'a> TenantApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// GET /providers/Microsoft.BusinessAppPlatform/tenant
    pub async fn get(&self) -> Result<TenantDto, ApiError> {
        let url = build_url(
            &self.client.config().urls.bapi_url,
            "/providers/Microsoft.BusinessAppPlatform/tenant",
            &ApiQueryParams::api_version(TENANT_API_VERSION),
        );
        self.client.get(&url).await
    }

    /// Tenant-scoped Power Platform endpoint of the signed-in tenant
    pub async fn host_url(&self) -> Result<String, ApiError> {
        let tenant = self.get().await?;
        tenant_host_url(&tenant.tenant_id, &self.client.config().urls.powerplatform_url)
    }
}

/// `{scheme}://{id[..n-2]}.{id[n-2..]}.tenant.{host}` for a dash-less tenant id
///
/// Hosts without a domain (a local mock server) are returned unchanged.
pub fn tenant_host_url(tenant_id: &str, powerplatform_url: &str) -> Result<String, ApiError> {
    let parsed = url::Url::parse(powerplatform_url)
        .map_err(|_| ApiError::InvalidUrl(powerplatform_url.to_string()))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| ApiError::InvalidUrl(powerplatform_url.to_string()))?;

    if parsed.host().is_some_and(|h| !matches!(h, url::Host::Domain(_))) || host == "localhost" {
        return Ok(powerplatform_url.trim_end_matches('/').to_string());
    }

    let id: String = tenant_id.chars().filter(|c| *c != '-').collect();
    if id.len() < 2 || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ApiError::Validation(format!(
            "tenant id '{}' can't be used to build a tenant host",
            tenant_id
        )));
    }
    let (prefix, suffix) = id.split_at(id.len() - 2);

    let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();
    Ok(format!(
        "{}://{}.{}.tenant.{}{}",
        parsed.scheme(),
        prefix,
        suffix,
        host,
        port
    ))
}
