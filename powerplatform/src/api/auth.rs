//! OAuth2 token acquisition for the Power Platform APIs
//!
//! Tokens are requested per scope and cached until shortly before they expire.
//! Client secrets, client certificates and OIDC federated credentials use the
//! Entra ID v2 token endpoint. Managed identities ask the instance metadata
//! service and the CLI method shells out to `az account get-access-token`.

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use tokio::sync::RwLock;

use super::certificate::ClientCertificate;
use super::error::ApiError;
use crate::config::{AuthMethod, CertificateSource, Credentials, TEST_MODE_MOCK_TOKEN};

const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";
const OIDC_AUDIENCE: &str = "api://AzureADTokenExchange";
const MSI_API_VERSION: &str = "2018-02-01";
const REFRESH_MARGIN_SECONDS: i64 = 300;
const DEFAULT_TOKEN_LIFETIME_SECONDS: i64 = 3600;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        self.expires_at - ChronoDuration::seconds(REFRESH_MARGIN_SECONDS) > Utc::now()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_on: Option<String>,
    #[serde(default, rename = "expires_on")]
    expires_on_epoch: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct OidcTokenResponse {
    value: Option<String>,
}

pub struct TokenProvider {
    http_client: reqwest::Client,
    credentials: Credentials,
    authority_url: String,
    test_mode: bool,
    cache: RwLock<HashMap<String, CachedToken>>,
}

impl TokenProvider {
    pub fn new(
        http_client: reqwest::Client,
        credentials: Credentials,
        authority_url: String,
        test_mode: bool,
    ) -> Self {
        Self {
            http_client,
            credentials,
            authority_url,
            test_mode,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Access token valid for `scope`
    pub async fn token_for_scope(&self, scope: &str) -> Result<String, ApiError> {
        if self.test_mode {
            return Ok(TEST_MODE_MOCK_TOKEN.to_string());
        }

        if let Some(cached) = self.cache.read().await.get(scope) {
            if cached.is_fresh() {
                return Ok(cached.access_token.clone());
            }
        }

        let token = match self.credentials.auth_method()? {
            AuthMethod::ClientSecret {
                tenant_id,
                client_id,
                client_secret,
            } => {
                tracing::debug!("Requesting token for scope {} using client secret", scope);
                let form = [
                    ("grant_type", "client_credentials"),
                    ("client_id", client_id.as_str()),
                    ("client_secret", client_secret.as_str()),
                    ("scope", scope),
                ];
                self.request_token(&tenant_id, &form).await?
            }
            AuthMethod::Oidc {
                tenant_id,
                client_id,
            } => {
                tracing::debug!("Requesting token for scope {} using OIDC", scope);
                let assertion = self.oidc_assertion().await?;
                let form = [
                    ("grant_type", "client_credentials"),
                    ("client_id", client_id.as_str()),
                    ("client_assertion_type", CLIENT_ASSERTION_TYPE),
                    ("client_assertion", assertion.as_str()),
                    ("scope", scope),
                ];
                self.request_token(&tenant_id, &form).await?
            }
            AuthMethod::Cli { tenant_id } => {
                tracing::debug!("Requesting token for scope {} using the Azure CLI", scope);
                cli_token(scope, tenant_id.as_deref()).await?
            }
            AuthMethod::ManagedIdentity {
                client_id,
                endpoint,
            } => {
                tracing::debug!("Requesting token for scope {} using a managed identity", scope);
                self.managed_identity_token(&endpoint, scope, client_id.as_deref())
                    .await?
            }
            AuthMethod::ClientCertificate {
                tenant_id,
                client_id,
                certificate,
                password,
            } => {
                tracing::debug!("Requesting token for scope {} using a client certificate", scope);
                let certificate = load_certificate(&certificate, &password).await?;
                let assertion =
                    certificate.assertion(&client_id, &self.token_endpoint(&tenant_id))?;
                let form = [
                    ("grant_type", "client_credentials"),
                    ("client_id", client_id.as_str()),
                    ("client_assertion_type", CLIENT_ASSERTION_TYPE),
                    ("client_assertion", assertion.as_str()),
                    ("scope", scope),
                ];
                self.request_token(&tenant_id, &form).await?
            }
        };

        self.cache
            .write()
            .await
            .insert(scope.to_string(), token.clone());

        Ok(token.access_token)
    }

    /// Drop the cached token for `scope`, forcing the next call to fetch a new one
    pub async fn invalidate(&self, scope: &str) {
        self.cache.write().await.remove(scope);
    }

    fn token_endpoint(&self, tenant_id: &str) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_url.trim_end_matches('/'),
            tenant_id
        )
    }

    async fn request_token(
        &self,
        tenant_id: &str,
        form: &[(&str, &str)],
    ) -> Result<CachedToken, ApiError> {
        let response = self
            .http_client
            .post(self.token_endpoint(tenant_id))
            .form(form)
            .send()
            .await?;
        read_token_response(response).await
    }

    /// Token from the instance metadata service of the host
    async fn managed_identity_token(
        &self,
        endpoint: &str,
        scope: &str,
        client_id: Option<&str>,
    ) -> Result<CachedToken, ApiError> {
        let mut url = url::Url::parse(endpoint)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", endpoint, e)))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("api-version", MSI_API_VERSION)
                .append_pair("resource", resource_for_scope(scope));
            if let Some(client_id) = client_id {
                query.append_pair("client_id", client_id);
            }
        }

        let response = self
            .http_client
            .get(url)
            .header("Metadata", "true")
            .send()
            .await?;
        read_token_response(response).await
    }

    /// Federated token used as the client assertion
    async fn oidc_assertion(&self) -> Result<String, ApiError> {
        if let Some(token) = &self.credentials.oidc_token {
            return Ok(token.clone());
        }

        if let Some(path) = &self.credentials.oidc_token_file_path {
            let token = tokio::fs::read_to_string(path).await.map_err(|e| {
                ApiError::AuthError(format!("failed to read OIDC token file {}: {}", path, e))
            })?;
            return Ok(token.trim().to_string());
        }

        let (Some(request_url), Some(request_token)) = (
            &self.credentials.oidc_request_url,
            &self.credentials.oidc_request_token,
        ) else {
            return Err(ApiError::AuthError(
                "use_oidc requires an OIDC token, a token file or a token request URL and token"
                    .to_string(),
            ));
        };

        let mut url = url::Url::parse(request_url)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", request_url, e)))?;
        url.query_pairs_mut().append_pair("audience", OIDC_AUDIENCE);

        let response = self
            .http_client
            .get(url)
            .bearer_auth(request_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::AuthError(format!(
                "OIDC token request failed with HTTP {}",
                status
            )));
        }

        let body: OidcTokenResponse = response
            .json()
            .await
            .map_err(|e| ApiError::AuthError(format!("unreadable OIDC token response: {}", e)))?;

        body.value
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::AuthError("OIDC token response had no value".to_string()))
    }
}

async fn read_token_response(response: reqwest::Response) -> Result<CachedToken, ApiError> {
    let status = response.status();
    let text = response.text().await?;
    let parsed: TokenResponse = serde_json::from_str(&text).map_err(|e| {
        ApiError::AuthError(format!(
            "token endpoint returned HTTP {} with an unreadable body: {}",
            status, e
        ))
    })?;

    match parsed.access_token {
        Some(access_token) if status.is_success() => {
            let lifetime = parsed
                .expires_in
                .as_ref()
                .and_then(seconds_from_json)
                .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECONDS);
            Ok(CachedToken {
                access_token,
                expires_at: Utc::now() + ChronoDuration::seconds(lifetime),
            })
        }
        _ => Err(ApiError::AuthError(format!(
            "token request failed with HTTP {}: {} {}",
            status,
            parsed.error.unwrap_or_default(),
            parsed.error_description.unwrap_or_default()
        ))),
    }
}

/// `https://service.powerapps.com/.default` -> `https://service.powerapps.com`
fn resource_for_scope(scope: &str) -> &str {
    scope.strip_suffix("/.default").unwrap_or(scope)
}

async fn load_certificate(
    source: &CertificateSource,
    password: &str,
) -> Result<ClientCertificate, ApiError> {
    match source {
        CertificateSource::Base64(encoded) => ClientCertificate::from_base64(encoded, password),
        CertificateSource::File(path) => {
            let bundle = tokio::fs::read(path).await.map_err(|e| {
                ApiError::AuthError(format!("failed to read client certificate {}: {}", path, e))
            })?;
            ClientCertificate::from_pkcs12(&bundle, password)
        }
    }
}

fn seconds_from_json(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

async fn cli_token(scope: &str, tenant_id: Option<&str>) -> Result<CachedToken, ApiError> {
    let mut command = tokio::process::Command::new("az");
    command.args([
        "account",
        "get-access-token",
        "--scope",
        scope,
        "--output",
        "json",
    ]);
    if let Some(tenant_id) = tenant_id {
        command.args(["--tenant", tenant_id]);
    }

    let output = command
        .output()
        .await
        .map_err(|e| ApiError::AuthError(format!("failed to run the Azure CLI: {}", e)))?;

    if !output.status.success() {
        return Err(ApiError::AuthError(format!(
            "az account get-access-token failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    parse_cli_token(&output.stdout)
}

fn parse_cli_token(stdout: &[u8]) -> Result<CachedToken, ApiError> {
    let parsed: CliTokenResponse = serde_json::from_slice(stdout)
        .map_err(|e| ApiError::AuthError(format!("unreadable Azure CLI output: {}", e)))?;

    let expires_at = parsed
        .expires_on_epoch
        .and_then(|epoch| Utc.timestamp_opt(epoch, 0).single())
        .or_else(|| {
            parsed.expires_on.as_deref().and_then(|s| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                    .ok()
                    .and_then(|naive| Local.from_local_datetime(&naive).single())
                    .map(|local| local.with_timezone(&Utc))
            })
        })
        .unwrap_or_else(|| Utc::now() + ChronoDuration::seconds(DEFAULT_TOKEN_LIFETIME_SECONDS));

    Ok(CachedToken {
        access_token: parsed.access_token,
        expires_at,
    })
}
