//! Managed environment governance API

use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::api::common::{build_url, ApiQueryParams};
use crate::api::environments::{GovernanceConfigurationDto, MAX_OPERATION_ATTEMPTS};
use crate::api::error::ApiError;
use crate::api::Client;
use crate::config::{BAP_2021_API_VERSION, SOLUTION_CHECKER_RULESET_ID};

pub const PROTECTION_LEVEL_STANDARD: &str = "Standard";
pub const PROTECTION_LEVEL_BASIC: &str = "Basic";

const ADVISOR_ENDPOINT: &str = "microsoft.PowerAppsAdvisor";

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SolutionCheckerRuleDto {
    pub code: String,
    pub description: String,
    pub summary: String,
    pub how_to_fix: String,
    pub guidance_url: String,
    pub component_type: i64,
    pub primary_category: i64,
    pub include: bool,
    pub severity: i64,
}

impl SolutionCheckerRuleDto {
    pub fn primary_category_description(&self) -> &'static str {
        match self.primary_category {
            0 => "Error",
            1 => "Performance",
            2 => "Security",
            3 => "Design",
            4 => "Usage",
            _ => "Unknown",
        }
    }
}

pub struct ManagedEnvironmentApi<'a> {
    client: &'a Client,
}

impl<'a> ManagedEnvironmentApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    fn governance_url(&self, environment_id: &str) -> String {
        build_url(
            &self.client.config().urls.bapi_url,
            &format!(
                "/providers/Microsoft.BusinessAppPlatform/environments/{}/governanceConfiguration",
                environment_id
            ),
            &ApiQueryParams::api_version(BAP_2021_API_VERSION),
        )
    }

    /// POST governanceConfiguration with protection level `Standard` and the given settings
    pub async fn enable(
        &self,
        environment_id: &str,
        governance: &GovernanceConfigurationDto,
    ) -> Result<(), ApiError> {
        self.configure("enable", environment_id, governance, &[202, 204, 409])
            .await
    }

    /// POST governanceConfiguration with protection level `Basic`
    pub async fn disable(&self, environment_id: &str) -> Result<(), ApiError> {
        let governance = GovernanceConfigurationDto {
            protection_level: PROTECTION_LEVEL_BASIC.to_string(),
            settings: None,
        };
        self.configure("disable", environment_id, &governance, &[202, 409])
            .await
    }

    async fn configure(
        &self,
        operation: &str,
        environment_id: &str,
        governance: &GovernanceConfigurationDto,
        acceptable: &[u16],
    ) -> Result<(), ApiError> {
        let url = self.governance_url(environment_id);
        let mut retries = 0;
        loop {
            let response = self
                .client
                .execute(Method::POST, &url, None, Some(governance), acceptable)
                .await?;
            tracing::debug!(
                "Managed environment {} returned HTTP {}",
                operation,
                response.status
            );

            match self.client.wait_for_lifecycle(&response).await? {
                Some(lifecycle) if lifecycle.is_failed() => {
                    if retries >= MAX_OPERATION_ATTEMPTS {
                        return Err(ApiError::LifecycleFailed(format!(
                            "maximum retries ({}) reached for managed environment {} on lifecycle failure",
                            MAX_OPERATION_ATTEMPTS, operation
                        )));
                    }
                    retries += 1;
                    tracing::info!("Managed environment {} failed. Retrying", operation);
                    self.client.sleep(self.client.default_retry_after()).await;
                }
                _ => return Ok(()),
            }
        }
    }

    /// GET {advisor}/api/rule for the environment's advisor endpoint
    pub async fn solution_checker_rules(
        &self,
        environment_id: &str,
    ) -> Result<Vec<SolutionCheckerRuleDto>, ApiError> {
        let environment = self.client.environments().get(environment_id).await?;
        let advisor = environment
            .properties
            .runtime_endpoint(ADVISOR_ENDPOINT)
            .ok_or_else(|| ApiError::Validation("PowerAppsAdvisor URL is empty".to_string()))?;

        let advisor_url = url::Url::parse(advisor)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", advisor, e)))?;
        let base = advisor_url.origin().ascii_serialization();

        let url = build_url(
            &base,
            "/api/rule",
            &ApiQueryParams::api_version("2.0").add("ruleset", SOLUTION_CHECKER_RULESET_ID),
        );
        tracing::debug!("Fetching solution checker rules from {}", url);
        self.client.get(&url).await
    }

    /// Codes of the solution checker rules available to the environment
    pub async fn solution_checker_rule_codes(
        &self,
        environment_id: &str,
    ) -> Result<Vec<String>, ApiError> {
        Ok(self
            .solution_checker_rules(environment_id)
            .await?
            .into_iter()
            .map(|rule| rule.code)
            .collect())
    }
}
