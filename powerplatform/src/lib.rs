pub mod api;
pub mod config;
pub mod data_sources;
pub mod provider_data;
pub mod resources;
pub mod schema;
pub mod values;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tf_provider::{map, AttributePath, Diagnostics, Provider};
use tf_provider::schema::{AttributeType, Schema};
use tf_provider::value::{Value, ValueEmpty};

use crate::config::{env_bool, env_string, Cloud, Credentials, ProviderConfig};
use crate::data_sources::{
    BillingPoliciesDataSource, BillingPoliciesEnvironmentsDataSource, ConnectorsDataSource,
    CurrenciesDataSource, EnvironmentPowerAppsDataSource, EnvironmentTemplatesDataSource,
    EnvironmentsDataSource, LanguagesDataSource, LocationsDataSource,
    SolutionCheckerRulesDataSource, TenantCapacityDataSource, TenantDataSource,
};
use crate::provider_data::{PowerPlatformProviderData, ProviderHandle};
use crate::resources::{
    BillingPolicyEnvironmentResource, BillingPolicyResource, EnvironmentGroupResource,
    EnvironmentResource, EnvironmentSettingsResource, ManagedEnvironmentResource,
    TenantSettingsResource,
};
use crate::schema::{optional, schema, sensitive};
use crate::values::{known, known_str};

pub const PROVIDER_NAME: &str = "powerplatform";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfigState {
    pub cloud: Value<String>,
    pub tenant_id: Value<String>,
    pub client_id: Value<String>,
    pub client_secret: Value<String>,
    pub use_cli: Value<bool>,
    pub use_oidc: Value<bool>,
    pub oidc_request_url: Value<String>,
    pub oidc_request_token: Value<String>,
    pub oidc_token: Value<String>,
    pub oidc_token_file_path: Value<String>,
    pub use_msi: Value<bool>,
    pub client_certificate: Value<String>,
    pub client_certificate_file_path: Value<String>,
    pub client_certificate_password: Value<String>,
    pub telemetry_optout: Value<bool>,
}

impl ProviderConfigState {
    fn credentials(&self) -> Credentials {
        let text = |value: &Value<String>| known_str(value).map(str::to_string);
        Credentials {
            tenant_id: text(&self.tenant_id),
            client_id: text(&self.client_id),
            client_secret: text(&self.client_secret),
            use_cli: known(&self.use_cli).copied().unwrap_or(false),
            use_oidc: known(&self.use_oidc).copied().unwrap_or(false),
            oidc_request_url: text(&self.oidc_request_url),
            oidc_request_token: text(&self.oidc_request_token),
            oidc_token: text(&self.oidc_token),
            oidc_token_file_path: text(&self.oidc_token_file_path),
            use_msi: known(&self.use_msi).copied().unwrap_or(false),
            msi_endpoint: None,
            client_certificate: text(&self.client_certificate),
            client_certificate_file_path: text(&self.client_certificate_file_path),
            client_certificate_password: text(&self.client_certificate_password),
        }
        .merge_env()
    }
}

/// Terraform provider for Power Platform admin resources
#[derive(Debug, Clone, Default)]
pub struct PowerPlatformProvider {
    handle: ProviderHandle,
}

impl PowerPlatformProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider that is already configured with `client`
    pub fn with_client(client: api::Client) -> Self {
        Self {
            handle: ProviderHandle::configured(client),
        }
    }

    pub fn handle(&self) -> &ProviderHandle {
        &self.handle
    }
}

#[async_trait]
impl Provider for PowerPlatformProvider {
    type Config<'a> = ProviderConfigState;
    type MetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(schema(
            "The Power Platform provider manages environments and tenant settings of Microsoft Power Platform",
            map! {
                "cloud" => optional(
                    AttributeType::String,
                    "Cloud to use: public, gcc, gcchigh, dod, china, ex or rx. Defaults to public",
                ),
                "tenant_id" => optional(AttributeType::String, "Entra tenant id"),
                "client_id" => optional(AttributeType::String, "Client id of the app registration"),
                "client_secret" => sensitive(optional(AttributeType::String, "Client secret of the app registration")),
                "use_cli" => optional(AttributeType::Bool, "Acquire tokens from the Azure CLI"),
                "use_oidc" => optional(AttributeType::Bool, "Use an OpenID Connect federated credential"),
                "oidc_request_url" => optional(AttributeType::String, "URL of the OIDC token request"),
                "oidc_request_token" => sensitive(optional(AttributeType::String, "Bearer token of the OIDC token request")),
                "oidc_token" => sensitive(optional(AttributeType::String, "OIDC id token")),
                "oidc_token_file_path" => optional(AttributeType::String, "File holding the OIDC id token"),
                "use_msi" => optional(AttributeType::Bool, "Use the managed identity of the host, user assigned when client_id is set"),
                "client_certificate" => sensitive(optional(AttributeType::String, "Base64 encoded PKCS#12 certificate bundle of the app registration")),
                "client_certificate_file_path" => optional(AttributeType::String, "File holding the PKCS#12 certificate bundle of the app registration"),
                "client_certificate_password" => sensitive(optional(AttributeType::String, "Password of the PKCS#12 certificate bundle")),
                "telemetry_optout" => optional(AttributeType::Bool, "Do not send telemetry headers"),
            },
        ))
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, config: Self::Config<'a>) -> Option<()> {
        if let Value::Value(cloud) = &config.cloud {
            if let Err(e) = cloud.parse::<Cloud>() {
                diags.error("Invalid cloud", e.to_string(), AttributePath::new("cloud"));
            }
        }
        if known(&config.use_cli) == Some(&true) && known(&config.use_oidc) == Some(&true) {
            diags.error(
                "Conflicting authentication methods",
                "use_cli and use_oidc are mutually exclusive",
                AttributePath::new("use_oidc"),
            );
        }
        if known_str(&config.client_certificate).is_some()
            && known_str(&config.client_certificate_file_path).is_some()
        {
            diags.error(
                "Conflicting client certificates",
                "client_certificate and client_certificate_file_path are mutually exclusive",
                AttributePath::new("client_certificate_file_path"),
            );
        }
        diags.errors.is_empty().then_some(())
    }

    async fn configure<'a>(
        &self,
        diags: &mut Diagnostics,
        terraform_version: String,
        config: Self::Config<'a>,
    ) -> Option<()> {
        let cloud_name = known(&config.cloud)
            .cloned()
            .or_else(|| env_string("POWER_PLATFORM_CLOUD"))
            .unwrap_or_default();
        let cloud: Cloud = match cloud_name.parse() {
            Ok(cloud) => cloud,
            Err(e) => {
                diags.error("Invalid cloud", e.to_string(), AttributePath::new("cloud"));
                return None;
            }
        };

        let mut provider_config =
            ProviderConfig::new(cloud, config.credentials()).with_env_overrides();
        provider_config.telemetry_optout = known(&config.telemetry_optout)
            .copied()
            .or_else(|| env_bool("POWER_PLATFORM_TELEMETRY_OPTOUT"))
            .unwrap_or(false);
        provider_config.terraform_version = terraform_version;

        if !provider_config.test_mode {
            if let Err(e) = provider_config.credentials.auth_method() {
                diags.root_error("Unable to authenticate to Power Platform", e.to_string());
                return None;
            }
        }

        let client = match api::Client::new(provider_config) {
            Ok(client) => client,
            Err(e) => {
                diags.root_error("Failed to create API client", e.to_string());
                return None;
            }
        };
        tracing::info!(
            "Configured {} provider for the {:?} cloud",
            PROVIDER_NAME,
            client.config().cloud
        );
        self.handle.set(PowerPlatformProviderData::new(client)).await;
        Some(())
    }

    fn get_resources(
        &self,
        _diags: &mut Diagnostics,
    ) -> Option<HashMap<String, Box<dyn tf_provider::DynamicResource>>> {
        let handle = &self.handle;
        Some(map! {
            "environment" => EnvironmentResource::new(handle.clone()),
            "environment_group" => EnvironmentGroupResource::new(handle.clone()),
            "managed_environment" => ManagedEnvironmentResource::new(handle.clone()),
            "billing_policy" => BillingPolicyResource::new(handle.clone()),
            "billing_policy_environment" => BillingPolicyEnvironmentResource::new(handle.clone()),
            "environment_settings" => EnvironmentSettingsResource::new(handle.clone()),
            "tenant_settings" => TenantSettingsResource::new(handle.clone()),
        })
    }

    fn get_data_sources(
        &self,
        _diags: &mut Diagnostics,
    ) -> Option<HashMap<String, Box<dyn tf_provider::DynamicDataSource>>> {
        let handle = &self.handle;
        Some(map! {
            "environments" => EnvironmentsDataSource::new(handle.clone()),
            "locations" => LocationsDataSource::new(handle.clone()),
            "languages" => LanguagesDataSource::new(handle.clone()),
            "currencies" => CurrenciesDataSource::new(handle.clone()),
            "environment_templates" => EnvironmentTemplatesDataSource::new(handle.clone()),
            "connectors" => ConnectorsDataSource::new(handle.clone()),
            "environment_powerapps" => EnvironmentPowerAppsDataSource::new(handle.clone()),
            "tenant_capacity" => TenantCapacityDataSource::new(handle.clone()),
            "billing_policies" => BillingPoliciesDataSource::new(handle.clone()),
            "billing_policies_environments" => BillingPoliciesEnvironmentsDataSource::new(handle.clone()),
            "tenant" => TenantDataSource::new(handle.clone()),
            "solution_checker_rules" => SolutionCheckerRulesDataSource::new(handle.clone()),
        })
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::values::string;
    use serial_test::serial;

    #[tokio::test]
    async fn validate_rejects_unknown_cloud_and_conflicting_auth() {
        let provider = PowerPlatformProvider::new();
        let config = ProviderConfigState {
            cloud: string("mars"),
            use_cli: Value::Value(true),
            use_oidc: Value::Value(true),
            ..Default::default()
        };
        let mut diags = Diagnostics::default();

        assert!(provider.validate(&mut diags, config).await.is_none());
        assert_eq!(diags.errors.len(), 2);
    }

    #[tokio::test]
    async fn validate_rejects_two_certificate_sources() {
        let provider = PowerPlatformProvider::new();
        let config = ProviderConfigState {
            client_certificate: string("MIIK"),
            client_certificate_file_path: string("/tmp/client.p12"),
            ..Default::default()
        };
        let mut diags = Diagnostics::default();

        assert!(provider.validate(&mut diags, config).await.is_none());
        assert_eq!(diags.errors.len(), 1);
    }

    #[test]
    fn certificate_attributes_reach_credentials() {
        let config = ProviderConfigState {
            tenant_id: string("tenant"),
            client_id: string("client"),
            client_certificate_file_path: string("/tmp/client.p12"),
            client_certificate_password: string("secret"),
            use_msi: Value::Value(false),
            ..Default::default()
        };

        let credentials = config.credentials();
        assert_eq!(
            credentials.client_certificate_file_path.as_deref(),
            Some("/tmp/client.p12")
        );
        assert_eq!(credentials.client_certificate_password.as_deref(), Some("secret"));
    }

    #[tokio::test]
    #[serial]
    async fn configure_in_test_mode_publishes_client() {
        std::env::set_var("POWER_PLATFORM_TEST_MODE", "true");
        std::env::set_var("POWER_PLATFORM_CLOUD", "gcc");
        let provider = PowerPlatformProvider::new();
        let mut diags = Diagnostics::default();

        let configured = provider
            .configure(&mut diags, "1.9.0".to_string(), ProviderConfigState::default())
            .await;
        std::env::remove_var("POWER_PLATFORM_TEST_MODE");
        std::env::remove_var("POWER_PLATFORM_CLOUD");

        assert!(configured.is_some());
        assert!(provider.handle().is_configured().await);
        let client = provider.handle().client(&mut diags).await.unwrap();
        assert_eq!(client.config().cloud, Cloud::Gcc);
        assert_eq!(client.config().terraform_version, "1.9.0");
    }

    #[tokio::test]
    #[serial]
    async fn configure_without_credentials_fails() {
        for name in [
            "POWER_PLATFORM_TEST_MODE",
            "POWER_PLATFORM_TENANT_ID",
            "POWER_PLATFORM_CLIENT_ID",
            "POWER_PLATFORM_CLIENT_SECRET",
            "POWER_PLATFORM_USE_CLI",
            "POWER_PLATFORM_USE_OIDC",
            "POWER_PLATFORM_USE_MSI",
            "POWER_PLATFORM_CLIENT_CERTIFICATE",
            "POWER_PLATFORM_CLIENT_CERTIFICATE_FILE_PATH",
        ] {
            std::env::remove_var(name);
        }
        let provider = PowerPlatformProvider::new();
        let mut diags = Diagnostics::default();

        let configured = provider
            .configure(&mut diags, "1.9.0".to_string(), ProviderConfigState::default())
            .await;

        assert!(configured.is_none());
        assert_eq!(diags.errors.len(), 1);
        assert!(!provider.handle().is_configured().await);
    }

    #[test]
    fn registers_every_resource_and_data_source() {
        let provider = PowerPlatformProvider::new();
        let mut diags = Diagnostics::default();

        let resources = provider.get_resources(&mut diags).unwrap();
        let data_sources = provider.get_data_sources(&mut diags).unwrap();

        assert_eq!(resources.len(), 7);
        assert!(resources.contains_key("tenant_settings"));
        assert!(resources.contains_key("environment"));
        assert_eq!(data_sources.len(), 12);
        assert!(data_sources.contains_key("solution_checker_rules"));
    }
}
