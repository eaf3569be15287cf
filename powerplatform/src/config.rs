//! Provider configuration: clouds, endpoints and credentials

use std::str::FromStr;
use std::time::Duration;

use crate::api::ApiError;

pub const API_VERSION_PARAM: &str = "api-version";
pub const BAP_API_VERSION: &str = "2023-06-01";
pub const BAP_2021_API_VERSION: &str = "2021-04-01";
pub const CONNECTORS_API_VERSION: &str = "2019-05-01";
pub const TENANT_API_VERSION: &str = "2020-08-01";
pub const LICENSING_API_VERSION: &str = "2022-03-01-preview";
pub const DATAVERSE_API_VERSION: &str = "v9.2";

pub const ZERO_UUID: &str = "00000000-0000-0000-0000-000000000000";
pub const PPAC_SCOPE: &str = "065d9450-1e87-434e-ac2f-69af271549ed/.default";
pub const SOLUTION_CHECKER_RULESET_ID: &str = "0ad12346-e108-40b8-a956-9a8f95ea18c9";
pub const TEST_MODE_MOCK_TOKEN: &str = "test_mode_mock_token_value";
pub const MSI_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

const DEFAULT_LIFECYCLE_TIMEOUT: Duration = Duration::from_secs(90 * 60);

/// Sovereign cloud the provider talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cloud {
    #[default]
    Public,
    Gcc,
    GccHigh,
    Dod,
    China,
    Ex,
    Rx,
}

impl FromStr for Cloud {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "public" => Ok(Cloud::Public),
            "gcc" => Ok(Cloud::Gcc),
            "gcchigh" => Ok(Cloud::GccHigh),
            "dod" => Ok(Cloud::Dod),
            "china" => Ok(Cloud::China),
            "ex" => Ok(Cloud::Ex),
            "rx" => Ok(Cloud::Rx),
            other => Err(ApiError::Validation(format!(
                "cloud '{}' is not valid. valid clouds are: public, gcc, gcchigh, dod, china, ex, rx",
                other
            ))),
        }
    }
}

/// Base URLs and OAuth scopes of every API the provider calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudUrls {
    pub bapi_url: String,
    pub powerapps_url: String,
    pub powerapps_scope: String,
    pub powerplatform_url: String,
    pub powerplatform_scope: String,
    pub licensing_url: String,
    pub advisor_url: String,
    pub advisor_scope: String,
    pub admin_powerplatform_url: String,
    pub authority_url: String,
}

struct CloudHosts {
    bapi: &'static str,
    powerapps: &'static str,
    powerapps_scope: &'static str,
    powerplatform: &'static str,
    powerplatform_scope: &'static str,
    licensing: &'static str,
    advisor: &'static str,
    advisor_scope: &'static str,
    admin: &'static str,
    authority: &'static str,
}

impl Cloud {
    fn hosts(self) -> CloudHosts {
        match self {
            Cloud::Public => CloudHosts {
                bapi: "api.bap.microsoft.com",
                powerapps: "api.powerapps.com",
                powerapps_scope: "https://service.powerapps.com/.default",
                powerplatform: "api.powerplatform.com",
                powerplatform_scope: "https://api.powerplatform.com/.default",
                licensing: "licensing.powerplatform.microsoft.com",
                advisor: "api.advisor.powerapps.com",
                advisor_scope: "https://advisor.powerapps.com/.default",
                admin: "api.admin.powerplatform.microsoft.com",
                authority: "https://login.microsoftonline.com/",
            },
            Cloud::Gcc => CloudHosts {
                bapi: "gov.api.bap.microsoft.us",
                powerapps: "gov.api.powerapps.us",
                powerapps_scope: "https://service.powerapps.us/.default",
                powerplatform: "api.gov.powerplatform.microsoft.us",
                powerplatform_scope: "https://api.gov.powerplatform.microsoft.us/.default",
                licensing: "gov.licensing.powerplatform.microsoft.us",
                advisor: "gov.api.advisor.powerapps.us",
                advisor_scope: "https://gov.advisor.powerapps.us/.default",
                admin: "api.gcc.admin.powerplatform.microsoft.us",
                authority: "https://login.microsoftonline.com/",
            },
            Cloud::GccHigh => CloudHosts {
                bapi: "high.api.bap.microsoft.us",
                powerapps: "high.api.powerapps.us",
                powerapps_scope: "https://high.service.apps.appsplatform.us/.default",
                powerplatform: "api.appsplatform.us",
                powerplatform_scope: "https://api.appsplatform.us/.default",
                licensing: "high.licensing.powerplatform.microsoft.us",
                advisor: "high.api.advisor.powerapps.us",
                advisor_scope: "https://high.advisor.powerapps.us/.default",
                admin: "api.high.admin.powerplatform.microsoft.us",
                authority: "https://login.microsoftonline.us/",
            },
            Cloud::Dod => CloudHosts {
                bapi: "api.bap.appsplatform.us",
                powerapps: "api.apps.appsplatform.us",
                powerapps_scope: "https://service.apps.appsplatform.us/.default",
                powerplatform: "api.appsplatform.us",
                powerplatform_scope: "https://api.appsplatform.us/.default",
                licensing: "licensing.appsplatform.us",
                advisor: "api.advisor.powerapps.us",
                advisor_scope: "https://advisor.powerapps.us/.default",
                admin: "api.admin.appsplatform.us",
                authority: "https://login.microsoftonline.us/",
            },
            Cloud::China => CloudHosts {
                bapi: "api.bap.partner.microsoftonline.cn",
                powerapps: "api.powerapps.cn",
                powerapps_scope: "https://service.powerapps.cn/.default",
                powerplatform: "api.powerplatform.partner.microsoftonline.cn",
                powerplatform_scope: "https://api.powerplatform.partner.microsoftonline.cn/.default",
                licensing: "licensing.partner.microsoftonline.cn",
                advisor: "api.advisor.powerapps.cn",
                advisor_scope: "https://advisor.powerapps.cn/.default",
                admin: "api.ppac.partner.microsoftonline.cn",
                authority: "https://login.chinacloudapi.cn/",
            },
            Cloud::Ex => CloudHosts {
                bapi: "api.bap.eaglex.ic.gov",
                powerapps: "api.powerapps.eaglex.ic.gov",
                powerapps_scope: "https://service.powerapps.eaglex.ic.gov/.default",
                powerplatform: "api.powerplatform.eaglex.ic.gov",
                powerplatform_scope: "https://api.powerplatform.eaglex.ic.gov/.default",
                licensing: "licensing.eaglex.ic.gov",
                advisor: "api.advisor.powerapps.eaglex.ic.gov",
                advisor_scope: "https://advisor.powerapps.eaglex.ic.gov/.default",
                admin: "api.admin.powerplatform.eaglex.ic.gov",
                authority: "https://login.microsoftonline.eaglex.ic.gov/",
            },
            Cloud::Rx => CloudHosts {
                bapi: "api.bap.microsoft.scloud",
                powerapps: "api.powerapps.microsoft.scloud",
                powerapps_scope: "https://service.powerapps.microsoft.scloud/.default",
                powerplatform: "api.powerplatform.microsoft.scloud",
                powerplatform_scope: "https://api.powerplatform.microsoft.scloud/.default",
                licensing: "licensing.microsoft.scloud",
                advisor: "api.advisor.powerapps.eaglex.ic.gov",
                advisor_scope: "https://advisor.powerapps.eaglex.ic.gov/.default",
                admin: "api.admin.powerplatform.microsoft.scloud",
                authority: "https://login.microsoftonline.microsoft.scloud/",
            },
        }
    }

    pub fn urls(self) -> CloudUrls {
        let hosts = self.hosts();
        let https = |host: &str| format!("https://{}", host);

        CloudUrls {
            bapi_url: https(hosts.bapi),
            powerapps_url: https(hosts.powerapps),
            powerapps_scope: hosts.powerapps_scope.to_string(),
            powerplatform_url: https(hosts.powerplatform),
            powerplatform_scope: hosts.powerplatform_scope.to_string(),
            licensing_url: https(hosts.licensing),
            advisor_url: https(hosts.advisor),
            advisor_scope: hosts.advisor_scope.to_string(),
            admin_powerplatform_url: https(hosts.admin),
            authority_url: hosts.authority.to_string(),
        }
    }
}

impl CloudUrls {
    /// Point every API and the token authority at a single base URL
    pub fn with_base_url(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/').to_string();
        let public = Cloud::Public.urls();

        Self {
            bapi_url: base.clone(),
            powerapps_url: base.clone(),
            powerapps_scope: public.powerapps_scope,
            powerplatform_url: base.clone(),
            powerplatform_scope: public.powerplatform_scope,
            licensing_url: base.clone(),
            advisor_url: base.clone(),
            advisor_scope: public.advisor_scope,
            admin_powerplatform_url: base.clone(),
            authority_url: format!("{}/", base),
        }
    }
}

/// Credentials gathered from the provider block and the environment
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub use_cli: bool,
    pub use_oidc: bool,
    pub oidc_request_url: Option<String>,
    pub oidc_request_token: Option<String>,
    pub oidc_token: Option<String>,
    pub oidc_token_file_path: Option<String>,
    pub use_msi: bool,
    pub msi_endpoint: Option<String>,
    pub client_certificate: Option<String>,
    pub client_certificate_file_path: Option<String>,
    pub client_certificate_password: Option<String>,
}

/// Where the PKCS#12 bundle of a client certificate comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateSource {
    Base64(String),
    File(String),
}

/// How tokens are acquired, in the order they are considered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    ClientSecret {
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
    Cli {
        tenant_id: Option<String>,
    },
    Oidc {
        tenant_id: String,
        client_id: String,
    },
    /// User assigned identity when `client_id` is set, system assigned otherwise
    ManagedIdentity {
        client_id: Option<String>,
        endpoint: String,
    },
    ClientCertificate {
        tenant_id: String,
        client_id: String,
        certificate: CertificateSource,
        password: String,
    },
}

impl Credentials {
    pub fn auth_method(&self) -> Result<AuthMethod, ApiError> {
        if let (Some(tenant_id), Some(client_id), Some(client_secret)) =
            (&self.tenant_id, &self.client_id, &self.client_secret)
        {
            return Ok(AuthMethod::ClientSecret {
                tenant_id: tenant_id.clone(),
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
            });
        }

        if self.use_cli {
            return Ok(AuthMethod::Cli {
                tenant_id: self.tenant_id.clone(),
            });
        }

        if self.use_oidc {
            return match (&self.tenant_id, &self.client_id) {
                (Some(tenant_id), Some(client_id)) => Ok(AuthMethod::Oidc {
                    tenant_id: tenant_id.clone(),
                    client_id: client_id.clone(),
                }),
                _ => Err(ApiError::AuthError(
                    "tenant_id and client_id are required when use_oidc is set".to_string(),
                )),
            };
        }

        if self.use_msi {
            return Ok(AuthMethod::ManagedIdentity {
                client_id: self.client_id.clone(),
                endpoint: self
                    .msi_endpoint
                    .clone()
                    .unwrap_or_else(|| MSI_ENDPOINT.to_string()),
            });
        }

        let certificate = match (&self.client_certificate, &self.client_certificate_file_path) {
            (Some(encoded), _) => Some(CertificateSource::Base64(encoded.clone())),
            (None, Some(path)) => Some(CertificateSource::File(path.clone())),
            (None, None) => None,
        };
        if let Some(certificate) = certificate {
            return match (&self.tenant_id, &self.client_id) {
                (Some(tenant_id), Some(client_id)) => Ok(AuthMethod::ClientCertificate {
                    tenant_id: tenant_id.clone(),
                    client_id: client_id.clone(),
                    certificate,
                    password: self.client_certificate_password.clone().unwrap_or_default(),
                }),
                _ => Err(ApiError::AuthError(
                    "tenant_id and client_id are required with a client certificate".to_string(),
                )),
            };
        }

        Err(ApiError::NoCredentials)
    }

    /// Fill every unset field from the well known environment variables
    pub fn merge_env(mut self) -> Self {
        self.tenant_id = self.tenant_id.or_else(|| env_string("POWER_PLATFORM_TENANT_ID"));
        self.client_id = self.client_id.or_else(|| env_string("POWER_PLATFORM_CLIENT_ID"));
        self.client_secret = self
            .client_secret
            .or_else(|| env_string("POWER_PLATFORM_CLIENT_SECRET"));
        self.use_cli = self.use_cli || env_bool("POWER_PLATFORM_USE_CLI").unwrap_or(false);
        self.use_oidc = self.use_oidc || env_bool("POWER_PLATFORM_USE_OIDC").unwrap_or(false);
        self.oidc_request_url = self
            .oidc_request_url
            .or_else(|| env_string("ARM_OIDC_REQUEST_URL"))
            .or_else(|| env_string("ACTIONS_ID_TOKEN_REQUEST_URL"));
        self.oidc_request_token = self
            .oidc_request_token
            .or_else(|| env_string("ARM_OIDC_REQUEST_TOKEN"))
            .or_else(|| env_string("ACTIONS_ID_TOKEN_REQUEST_TOKEN"));
        self.oidc_token = self.oidc_token.or_else(|| env_string("ARM_OIDC_TOKEN"));
        self.oidc_token_file_path = self
            .oidc_token_file_path
            .or_else(|| env_string("ARM_OIDC_TOKEN_FILE_PATH"));
        self.use_msi = self.use_msi || env_bool("POWER_PLATFORM_USE_MSI").unwrap_or(false);
        self.msi_endpoint = self.msi_endpoint.or_else(|| env_string("MSI_ENDPOINT"));
        self.client_certificate = self
            .client_certificate
            .or_else(|| env_string("POWER_PLATFORM_CLIENT_CERTIFICATE"));
        self.client_certificate_file_path = self
            .client_certificate_file_path
            .or_else(|| env_string("POWER_PLATFORM_CLIENT_CERTIFICATE_FILE_PATH"));
        self.client_certificate_password = self
            .client_certificate_password
            .or_else(|| env_string("POWER_PLATFORM_CLIENT_CERTIFICATE_PASSWORD"));
        self
    }
}

/// Everything the API client needs to talk to Power Platform
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub cloud: Cloud,
    pub urls: CloudUrls,
    pub credentials: Credentials,
    pub telemetry_optout: bool,
    pub test_mode: bool,
    pub lifecycle_timeout: Duration,
    pub terraform_version: String,
    pub provider_version: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            cloud: Cloud::Public,
            urls: Cloud::Public.urls(),
            credentials: Credentials::default(),
            telemetry_optout: false,
            test_mode: false,
            lifecycle_timeout: DEFAULT_LIFECYCLE_TIMEOUT,
            terraform_version: "unknown".to_string(),
            provider_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ProviderConfig {
    pub fn new(cloud: Cloud, credentials: Credentials) -> Self {
        Self {
            cloud,
            urls: cloud.urls(),
            credentials,
            ..Default::default()
        }
    }

    /// Configuration for tests: every API served from `base_url`, no sleeps, mock token
    pub fn for_test(base_url: &str) -> Self {
        Self {
            urls: CloudUrls::with_base_url(base_url),
            test_mode: true,
            ..Default::default()
        }
    }

    /// Apply the environment-only knobs
    pub fn with_env_overrides(mut self) -> Self {
        if env_bool("POWER_PLATFORM_TEST_MODE").unwrap_or(false) {
            self.test_mode = true;
        }
        if let Some(timeout) = env_string("POWER_PLATFORM_LIFECYCLE_TIMEOUT")
            .and_then(|v| humantime::parse_duration(&v).ok())
        {
            self.lifecycle_timeout = timeout;
        }
        self
    }
}

pub fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

pub fn env_bool(name: &str) -> Option<bool> {
    env_string(name).map(|v| parse_bool(&v))
}

pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn cloud_parses_case_insensitively() {
        assert_eq!("public".parse::<Cloud>().unwrap(), Cloud::Public);
        assert_eq!("GccHigh".parse::<Cloud>().unwrap(), Cloud::GccHigh);
        assert_eq!("".parse::<Cloud>().unwrap(), Cloud::Public);
        assert!("mars".parse::<Cloud>().is_err());
    }

    #[test]
    fn public_cloud_urls_are_https() {
        let urls = Cloud::Public.urls();
        assert_eq!(urls.bapi_url, "https://api.bap.microsoft.com");
        assert_eq!(urls.powerapps_scope, "https://service.powerapps.com/.default");
        assert_eq!(urls.authority_url, "https://login.microsoftonline.com/");
    }

    #[test]
    fn base_url_override_strips_trailing_slash() {
        let urls = CloudUrls::with_base_url("http://127.0.0.1:1234/");
        assert_eq!(urls.bapi_url, "http://127.0.0.1:1234");
        assert_eq!(urls.licensing_url, "http://127.0.0.1:1234");
        assert_eq!(urls.authority_url, "http://127.0.0.1:1234/");
    }

    #[test]
    fn client_secret_wins_over_cli() {
        let credentials = Credentials {
            tenant_id: Some("tenant".to_string()),
            client_id: Some("client".to_string()),
            client_secret: Some("secret".to_string()),
            use_cli: true,
            ..Default::default()
        };

        assert!(matches!(
            credentials.auth_method().unwrap(),
            AuthMethod::ClientSecret { .. }
        ));
    }

    #[test]
    fn oidc_requires_tenant_and_client() {
        let credentials = Credentials {
            use_oidc: true,
            tenant_id: Some("tenant".to_string()),
            ..Default::default()
        };

        assert!(matches!(
            credentials.auth_method(),
            Err(ApiError::AuthError(_))
        ));
    }

    #[test]
    fn managed_identity_defaults_to_imds() {
        let credentials = Credentials {
            use_msi: true,
            client_id: Some("identity".to_string()),
            ..Default::default()
        };

        assert_eq!(
            credentials.auth_method().unwrap(),
            AuthMethod::ManagedIdentity {
                client_id: Some("identity".to_string()),
                endpoint: MSI_ENDPOINT.to_string(),
            }
        );
    }

    #[test]
    fn inline_certificate_wins_over_file() {
        let credentials = Credentials {
            tenant_id: Some("tenant".to_string()),
            client_id: Some("client".to_string()),
            client_certificate: Some("MIIK".to_string()),
            client_certificate_file_path: Some("/tmp/cert.p12".to_string()),
            ..Default::default()
        };

        assert_eq!(
            credentials.auth_method().unwrap(),
            AuthMethod::ClientCertificate {
                tenant_id: "tenant".to_string(),
                client_id: "client".to_string(),
                certificate: CertificateSource::Base64("MIIK".to_string()),
                password: String::new(),
            }
        );

        let without_client = Credentials {
            client_id: None,
            ..credentials
        };
        assert!(matches!(
            without_client.auth_method(),
            Err(ApiError::AuthError(_))
        ));
    }

    #[test]
    fn no_credentials_is_an_error() {
        assert!(matches!(
            Credentials::default().auth_method(),
            Err(ApiError::NoCredentials)
        ));
    }

    #[test]
    #[serial]
    fn credentials_fall_back_to_env() {
        std::env::set_var("POWER_PLATFORM_TENANT_ID", "env-tenant");
        std::env::set_var("POWER_PLATFORM_USE_CLI", "true");
        std::env::set_var("ACTIONS_ID_TOKEN_REQUEST_URL", "https://token.actions");
        std::env::set_var("POWER_PLATFORM_USE_MSI", "1");
        std::env::set_var("POWER_PLATFORM_CLIENT_CERTIFICATE_PASSWORD", "pfx-password");

        let credentials = Credentials {
            tenant_id: Some("explicit".to_string()),
            ..Default::default()
        }
        .merge_env();

        assert_eq!(credentials.tenant_id.as_deref(), Some("explicit"));
        assert!(credentials.use_cli);
        assert_eq!(
            credentials.oidc_request_url.as_deref(),
            Some("https://token.actions")
        );
        assert!(credentials.use_msi);
        assert_eq!(
            credentials.client_certificate_password.as_deref(),
            Some("pfx-password")
        );

        std::env::remove_var("POWER_PLATFORM_TENANT_ID");
        std::env::remove_var("POWER_PLATFORM_USE_CLI");
        std::env::remove_var("ACTIONS_ID_TOKEN_REQUEST_URL");
        std::env::remove_var("POWER_PLATFORM_USE_MSI");
        std::env::remove_var("POWER_PLATFORM_CLIENT_CERTIFICATE_PASSWORD");
    }

    #[test]
    #[serial]
    fn lifecycle_timeout_reads_humantime() {
        std::env::set_var("POWER_PLATFORM_LIFECYCLE_TIMEOUT", "45m");
        let config = ProviderConfig::default().with_env_overrides();
        assert_eq!(config.lifecycle_timeout, Duration::from_secs(45 * 60));
        std::env::remove_var("POWER_PLATFORM_LIFECYCLE_TIMEOUT");
    }
}
