//! Wire types of the environment admin API

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const ENVIRONMENT_TYPE_DEVELOPER: &str = "Developer";
pub const ENVIRONMENT_TYPE_SANDBOX: &str = "Sandbox";
pub const ENVIRONMENT_TYPE_PRODUCTION: &str = "Production";
pub const ENVIRONMENT_TYPE_TRIAL: &str = "Trial";
pub const ENVIRONMENT_TYPE_DEFAULT: &str = "Default";

pub const ENVIRONMENT_TYPES: [&str; 4] = [
    ENVIRONMENT_TYPE_SANDBOX,
    ENVIRONMENT_TYPE_PRODUCTION,
    ENVIRONMENT_TYPE_TRIAL,
    ENVIRONMENT_TYPE_DEVELOPER,
];

pub const CADENCES: [&str; 2] = ["Frequent", "Moderate"];

pub const DATABASE_TYPE_DATAVERSE: &str = "CommonDataService";
pub const RUNTIME_STATE_ADMIN_MODE: &str = "AdminMode";
pub const RUNTIME_STATE_ENABLED: &str = "Enabled";
pub const BACKGROUND_OPERATIONS_ENABLED: &str = "Enabled";
pub const BACKGROUND_OPERATIONS_DISABLED: &str = "Disabled";

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct EnvironmentDto {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub location: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default)]
    pub properties: EnvironmentPropertiesDto,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentPropertiesDto {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub azure_region: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub database_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub environment_sku: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub provisioning_state: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_app_metadata: Option<LinkedAppMetadataDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_endpoints: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_environment_metadata: Option<LinkedEnvironmentMetadataDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub states: Option<EnvironmentStatesDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub governance_configuration: Option<GovernanceConfigurationDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_policy: Option<IdDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_cadence: Option<IdDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_environment_group: Option<IdDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enterprise_policies: Option<EnterprisePoliciesDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bing_chat_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copilot_policies: Option<CopilotPoliciesDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_by: Option<UsedByDto>,
}

impl EnvironmentPropertiesDto {
    pub fn runtime_endpoint(&self, name: &str) -> Option<&str> {
        self.runtime_endpoints
            .as_ref()
            .and_then(|endpoints| endpoints.get(name))
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn instance_url(&self) -> Option<&str> {
        self.linked_environment_metadata
            .as_ref()
            .map(|m| m.instance_url.trim_end_matches('/'))
            .filter(|v| !v.is_empty())
    }

    pub fn management_state(&self) -> &str {
        self.states
            .as_ref()
            .and_then(|s| s.management.as_ref())
            .map(|m| m.id.as_str())
            .unwrap_or_default()
    }

    pub fn runtime_state(&self) -> &str {
        self.states
            .as_ref()
            .and_then(|s| s.runtime.as_ref())
            .map(|r| r.id.as_str())
            .unwrap_or_default()
    }

    pub fn environment_group_id(&self) -> Option<&str> {
        self.parent_environment_group
            .as_ref()
            .map(|g| g.id.as_str())
            .filter(|id| !id.is_empty() && *id != crate::config::ZERO_UUID)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct IdDto {
    #[serde(default)]
    pub id: String,
}

impl IdDto {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UsedByDto {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub principal_type: i64,
    #[serde(rename = "tenantID", alias = "tenantId", default)]
    pub tenant_id: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnterprisePoliciesDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vnets: Option<EnterprisePolicyDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_managed_keys: Option<EnterprisePolicyDto>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EnterprisePolicyDto {
    pub policy_id: String,
    pub location: String,
    pub id: String,
    pub system_id: String,
    pub link_status: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CopilotPoliciesDto {
    #[serde(default)]
    pub cross_geo_copilot_data_movement_enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GovernanceConfigurationDto {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub protection_level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<GovernanceSettingsDto>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GovernanceSettingsDto {
    #[serde(default)]
    pub extended_settings: ExtendedSettingsDto,
}

/// Managed environment settings; every value travels as a string
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtendedSettingsDto {
    pub exclude_environment_from_analysis: String,
    pub is_group_sharing_disabled: String,
    pub max_limit_user_sharing: String,
    pub disable_ai_generated_descriptions: String,
    pub include_on_homepage_insights: String,
    pub limit_sharing_mode: String,
    pub solution_checker_mode: String,
    pub suppress_validation_emails: String,
    pub solution_checker_rule_overrides: String,
    pub maker_onboarding_url: String,
    pub maker_onboarding_markdown: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LinkedEnvironmentMetadataDto {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub background_operations_state: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub domain_name: String,
    #[serde(rename = "instanceUrl", default, skip_serializing_if = "String::is_empty")]
    pub instance_url: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub base_language: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub security_group_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(rename = "template", default, skip_serializing_if = "Option::is_none")]
    pub templates: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_metadata: Option<TemplateMetadataDto>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unique_name: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct LinkedAppMetadataDto {
    pub id: String,
    #[serde(rename = "type")]
    pub app_type: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct EnvironmentStatesDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub management: Option<IdDto>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<IdDto>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct TemplateMetadataDto {
    #[serde(
        rename = "PostProvisioningPackages",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub post_provisioning_packages: Vec<PostProvisioningPackageDto>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PostProvisioningPackageDto {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub application_unique_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parameters: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct EnvironmentCreateDto {
    pub location: String,
    pub properties: EnvironmentCreatePropertiesDto,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentCreatePropertiesDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub azure_region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_policy: Option<IdDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_type: Option<String>,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_cadence: Option<IdDto>,
    pub environment_sku: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_environment_metadata: Option<CreateLinkedEnvironmentMetadataDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_environment_group: Option<IdDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_by: Option<UsedByDto>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateLinkedEnvironmentMetadataDto {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub base_language: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub domain_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<CurrencyCodeDto>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub security_group_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub templates: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_metadata: Option<TemplateMetadataDto>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct CurrencyCodeDto {
    pub code: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifySkuDto {
    pub environment_sku: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentDeleteDto {
    pub code: String,
    pub message: String,
}

impl Default for EnvironmentDeleteDto {
    fn default() -> Self {
        Self {
            code: "7".to_string(),
            message: "Deleted using Power Platform Terraform Provider".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvironmentCreatedDto {
    pub name: String,
    pub properties: ProvisioningStateDto,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProvisioningStateDto {
    pub provisioning_state: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateEnvironmentDetailsDto {
    pub domain_name: String,
    pub environment_location: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerativeAiFeaturesDto {
    pub properties: GenerativeAiFeaturesPropertiesDto,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerativeAiFeaturesPropertiesDto {
    pub bing_chat_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copilot_policies: Option<CopilotPoliciesDto>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrganizationSettingsDto {
    #[serde(rename = "_basecurrencyid_value", default)]
    pub base_currency_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TransactionCurrencyDto {
    #[serde(rename = "isocurrencycode")]
    pub iso_currency_code: String,
    #[serde(rename = "currencyname")]
    pub currency_name: String,
    #[serde(rename = "currencysymbol")]
    pub currency_symbol: String,
    #[serde(rename = "transactioncurrencyid")]
    pub transaction_currency_id: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LocationDto {
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    pub properties: LocationPropertiesDto,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct LocationPropertiesDto {
    pub display_name: String,
    pub code: String,
    pub is_disabled: bool,
    pub is_default: bool,
    pub can_provision_database: bool,
    pub can_provision_customer_engagement_database: bool,
    pub azure_regions: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CurrencyDto {
    pub name: String,
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub properties: CurrencyPropertiesDto,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CurrencyPropertiesDto {
    pub code: String,
    pub symbol: String,
    pub is_tenant_default: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LanguageDto {
    pub name: String,
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub properties: LanguagePropertiesDto,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct LanguagePropertiesDto {
    pub locale_id: i64,
    pub localized_name: String,
    pub display_name: String,
    pub is_tenant_default: bool,
}

/// Templates of a location grouped by category
pub type EnvironmentTemplatesDto = HashMap<String, Vec<EnvironmentTemplateDto>>;

/// Categories in the order the admin center lists them
pub const TEMPLATE_CATEGORIES: [&str; 12] = [
    "standard",
    "premium",
    "developer",
    "basic",
    "production",
    "sandbox",
    "trial",
    "default",
    "support",
    "subscriptionBasedTrial",
    "teams",
    "platform",
];

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EnvironmentTemplateDto {
    pub id: String,
    pub name: String,
    pub location: String,
    pub properties: EnvironmentTemplatePropertiesDto,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvironmentTemplatePropertiesDto {
    pub display_name: String,
    pub is_disabled: bool,
    pub disabled_reason: Option<DisabledReasonDto>,
    pub is_customer_engagement: bool,
    pub is_supported_for_reset_operation: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DisabledReasonDto {
    pub code: String,
    pub message: String,
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}
