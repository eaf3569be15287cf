//! Billing policies and tenant capacity

use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::api::common::{build_url, ApiQueryParams, ArrayResponse};
use crate::api::error::ApiError;
use crate::api::Client;
use crate::config::LICENSING_API_VERSION;

pub const BILLING_POLICY_ENABLED: &str = "Enabled";
pub const BILLING_POLICY_DISABLED: &str = "Disabled";

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct BillingPolicyDto {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub policy_type: String,
    pub status: String,
    pub location: String,
    pub billing_instrument: BillingInstrumentDto,
    pub created_on: String,
    pub created_by: PrincipalDto,
    pub last_modified_on: String,
    pub last_modified_by: PrincipalDto,
}

impl BillingPolicyDto {
    pub fn is_settled(&self) -> bool {
        self.status == BILLING_POLICY_ENABLED || self.status == BILLING_POLICY_DISABLED
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct BillingInstrumentDto {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub location: String,
    pub resource_group: String,
    pub subscription_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub subscription_name: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PrincipalDto {
    pub id: String,
    #[serde(rename = "type")]
    pub principal_type: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingPolicyCreateDto {
    pub location: String,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub status: String,
    pub billing_instrument: BillingInstrumentDto,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BillingPolicyUpdateDto {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub status: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct BillingPolicyEnvironmentDto {
    environment_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct EnvironmentIdsDto<'a> {
    environment_ids: &'a [String],
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct TenantCapacityDto {
    pub tenant_id: String,
    pub license_model_type: String,
    pub tenant_capacities: Vec<TenantCapacityEntryDto>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct TenantCapacityEntryDto {
    pub capacity_type: String,
    pub capacity_units: String,
    pub total_capacity: f64,
    pub max_capacity: f64,
    pub status: String,
    pub consumption: ConsumptionDto,
    pub overflow_capacity: Vec<OverflowCapacityDto>,
    pub capacity_entitlements: Vec<CapacityEntitlementDto>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ConsumptionDto {
    pub actual: f64,
    pub rated: f64,
    pub actual_updated_on: String,
    pub rated_updated_on: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct OverflowCapacityDto {
    pub capacity_type: String,
    pub value: f64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CapacityEntitlementDto {
    pub capacity_type: String,
    pub capacity_sub_type: String,
    pub total_capacity: f64,
    pub max_next_lifecycle_date: String,
}

pub struct LicensingApi<'a> {
    client: &'a Client,
}

impl<'a> LicensingApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    fn url(&self, path: &str) -> String {
        build_url(
            &self.client.config().urls.powerplatform_url,
            &format!("/licensing/{}", path.trim_start_matches('/')),
            &ApiQueryParams::api_version(LICENSING_API_VERSION),
        )
    }

    fn not_found(policy_id: &str) -> ApiError {
        ApiError::ObjectNotFound(format!("Billing Policy with ID '{}' not found", policy_id))
    }

    /// GET /licensing/billingPolicies
    pub async fn list(&self) -> Result<Vec<BillingPolicyDto>, ApiError> {
        let policies: ArrayResponse<BillingPolicyDto> =
            self.client.get(&self.url("billingPolicies")).await?;
        Ok(policies.value)
    }

    /// GET /licensing/billingPolicies/{id}
    pub async fn get(&self, policy_id: &str) -> Result<BillingPolicyDto, ApiError> {
        match self
            .client
            .get(&self.url(&format!("billingPolicies/{}", policy_id)))
            .await
        {
            Err(e) if e.status() == Some(404) => Err(Self::not_found(policy_id)),
            other => other,
        }
    }

    /// POST /licensing/BillingPolicies, then wait for the policy to settle
    pub async fn create(&self, policy: &BillingPolicyCreateDto) -> Result<BillingPolicyDto, ApiError> {
        let created: BillingPolicyDto = self
            .client
            .execute_json(Method::POST, &self.url("BillingPolicies"), Some(policy), &[201])
            .await?;
        if created.is_settled() {
            return Ok(created);
        }
        self.wait_for_final_status(&created.id).await
    }

    /// PUT /licensing/billingPolicies/{id}, then wait for the policy to settle
    pub async fn update(
        &self,
        policy_id: &str,
        policy: &BillingPolicyUpdateDto,
    ) -> Result<BillingPolicyDto, ApiError> {
        let updated: BillingPolicyDto = self
            .client
            .execute_json(
                Method::PUT,
                &self.url(&format!("billingPolicies/{}", policy_id)),
                Some(policy),
                &[200],
            )
            .await?;
        if updated.is_settled() {
            return Ok(updated);
        }
        self.wait_for_final_status(policy_id).await
    }

    /// DELETE /licensing/BillingPolicies/{id}
    pub async fn delete(&self, policy_id: &str) -> Result<(), ApiError> {
        self.client
            .execute::<()>(
                Method::DELETE,
                &self.url(&format!("BillingPolicies/{}", policy_id)),
                None,
                None,
                &[204],
            )
            .await?;
        Ok(())
    }

    /// Re-read the policy until its status is `Enabled` or `Disabled`
    pub async fn wait_for_final_status(&self, policy_id: &str) -> Result<BillingPolicyDto, ApiError> {
        let timeout = self.client.config().lifecycle_timeout;
        let poll = async {
            loop {
                let policy = self.get(policy_id).await?;
                if policy.is_settled() {
                    return Ok(policy);
                }
                tracing::debug!("Billing policy {} status: '{}'", policy_id, policy.status);
                self.client.sleep(self.client.default_retry_after()).await;
            }
        };
        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| ApiError::Timeout(timeout.as_secs()))?
    }

    /// GET /licensing/billingPolicies/{id}/environments
    pub async fn environments(&self, policy_id: &str) -> Result<Vec<String>, ApiError> {
        let response: Result<ArrayResponse<BillingPolicyEnvironmentDto>, ApiError> = self
            .client
            .get(&self.url(&format!("billingPolicies/{}/environments", policy_id)))
            .await;
        match response {
            Ok(environments) => Ok(environments
                .value
                .into_iter()
                .map(|e| e.environment_id)
                .collect()),
            Err(e) if e.status() == Some(404) => Err(Self::not_found(policy_id)),
            Err(e) => Err(e),
        }
    }

    /// POST /licensing/billingPolicies/{id}/environments/add
    pub async fn add_environments(&self, policy_id: &str, environment_ids: &[String]) -> Result<(), ApiError> {
        self.change_environments(policy_id, "add", environment_ids).await
    }

    /// POST /licensing/billingPolicies/{id}/environments/remove
    pub async fn remove_environments(
        &self,
        policy_id: &str,
        environment_ids: &[String],
    ) -> Result<(), ApiError> {
        self.change_environments(policy_id, "remove", environment_ids).await
    }

    async fn change_environments(
        &self,
        policy_id: &str,
        action: &str,
        environment_ids: &[String],
    ) -> Result<(), ApiError> {
        if environment_ids.is_empty() {
            return Ok(());
        }
        let body = EnvironmentIdsDto { environment_ids };
        self.client
            .execute(
                Method::POST,
                &self.url(&format!("billingPolicies/{}/environments/{}", policy_id, action)),
                None,
                Some(&body),
                &[200],
            )
            .await?;
        Ok(())
    }

    /// GET {licensing}/v0.1-alpha/tenants/{tenant}/TenantCapacity
    pub async fn tenant_capacity(&self, tenant_id: &str) -> Result<TenantCapacityDto, ApiError> {
        let url = build_url(
            &self.client.config().urls.licensing_url,
            &format!("/v0.1-alpha/tenants/{}/TenantCapacity", tenant_id),
            &ApiQueryParams::new(),
        );
        self.client.get(&url).await
    }
}
