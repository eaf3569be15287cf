//! Power Platform REST API client

pub mod auth;
pub mod certificate;
pub mod client;
pub mod common;
pub mod connectors;
pub mod environment_groups;
pub mod environment_settings;
pub mod environments;
pub mod error;
pub mod licensing;
pub mod lifecycle;
pub mod managed_environment;
pub mod pool;
pub mod powerapps;
pub mod tenant;
pub mod tenant_settings;

#[cfg(test)]
pub mod test_helpers;

pub use client::{Client, RetryConfig};
pub use common::{ApiQueryParams, ApiResponse, ArrayResponse};
pub use error::ApiError;
pub use lifecycle::LifecycleDto;
