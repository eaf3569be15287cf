//! Long-running operation polling

use reqwest::Method;
use serde::{Deserialize, Serialize};

use super::client::Client;
use super::common::ApiResponse;
use super::error::ApiError;

pub const HEADER_LOCATION: &str = "location";
pub const HEADER_OPERATION_LOCATION: &str = "operation-location";

pub const LIFECYCLE_SUCCEEDED: &str = "Succeeded";
pub const LIFECYCLE_FAILED: &str = "Failed";

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct LifecycleDto {
    pub id: String,
    pub links: LifecycleLinks,
    pub state: LifecycleState,
    #[serde(rename = "type")]
    pub operation_type: LifecycleState,
    pub created_date_time: String,
    pub last_action_date_time: String,
    pub requested_by: LifecycleRequestedBy,
    pub stages: Vec<LifecycleStage>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LifecycleLinks {
    #[serde(rename = "self")]
    pub self_link: LifecycleLink,
    pub environment: LifecycleLink,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LifecycleLink {
    pub path: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LifecycleState {
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct LifecycleRequestedBy {
    pub id: String,
    pub display_name: String,
    #[serde(rename = "type")]
    pub principal_type: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct LifecycleStage {
    pub id: String,
    pub name: String,
    pub state: LifecycleState,
    pub first_action_date_time: String,
    pub last_action_date_time: String,
}

impl LifecycleDto {
    pub fn is_succeeded(&self) -> bool {
        self.state.id == LIFECYCLE_SUCCEEDED
    }

    pub fn is_failed(&self) -> bool {
        self.state.id == LIFECYCLE_FAILED
    }

    /// Stages that ended in `Failed`, formatted for diagnostics
    pub fn failed_stages(&self) -> Vec<String> {
        self.stages
            .iter()
            .filter(|s| s.state.id == LIFECYCLE_FAILED)
            .map(|s| format!("{} ({})", s.name, s.id))
            .collect()
    }
}

/// Operation URL from `Location`, falling back to `Operation-Location`
pub fn operation_location(response: &ApiResponse) -> Option<&str> {
    response
        .header(HEADER_LOCATION)
        .or_else(|| response.header(HEADER_OPERATION_LOCATION))
}

impl Client {
    /// Poll the operation behind `response` until it succeeds or fails.
    ///
    /// Returns `Ok(None)` when the response carries no operation URL, meaning
    /// the server completed the work synchronously. A failed operation is
    /// returned as `Ok(Some(dto))` so callers can decide whether to retry.
    pub async fn wait_for_lifecycle(
        &self,
        response: &ApiResponse,
    ) -> Result<Option<LifecycleDto>, ApiError> {
        let location = match operation_location(response) {
            Some(location) => location.to_string(),
            None => {
                tracing::debug!("No operation location on HTTP {} response", response.status);
                return Ok(None);
            }
        };
        tracing::debug!("Waiting for lifecycle operation at {}", location);

        let timeout = self.config().lifecycle_timeout;
        let initial_wait = self.retry_after(&response.headers);

        let poll = async {
            let mut wait = initial_wait;
            loop {
                self.sleep(wait).await;

                let poll_response = self
                    .execute::<()>(Method::GET, &location, None, None, &[200])
                    .await?;
                let lifecycle: LifecycleDto = if poll_response.is_empty() {
                    LifecycleDto::default()
                } else {
                    poll_response.json()?
                };

                tracing::debug!("Lifecycle operation state: '{}'", lifecycle.state.id);

                if lifecycle.is_succeeded() || lifecycle.is_failed() {
                    return Ok(Some(lifecycle));
                }

                if poll_response.header("retry-after").is_some() {
                    wait = self.retry_after(&poll_response.headers);
                }
            }
        };

        match tokio::time::timeout(timeout, poll).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(
                    "Lifecycle operation at {} did not finish within {:?}",
                    location,
                    timeout
                );
                Err(ApiError::Timeout(timeout.as_secs()))
            }
        }
    }

    /// Like `wait_for_lifecycle`, with `Failed` turned into an error
    pub async fn wait_for_lifecycle_success(
        &self,
        response: &ApiResponse,
    ) -> Result<Option<LifecycleDto>, ApiError> {
        match self.wait_for_lifecycle(response).await? {
            Some(lifecycle) if lifecycle.is_failed() => {
                let stages = lifecycle.failed_stages();
                Err(ApiError::LifecycleFailed(if stages.is_empty() {
                    format!("operation {} failed", lifecycle.id)
                } else {
                    format!(
                        "operation {} failed in stages: {}",
                        lifecycle.id,
                        stages.join(", ")
                    )
                }))
            }
            other => Ok(other),
        }
    }
}
