use thiserror::Error;

pub const ERROR_OBJECT_NOT_FOUND: &str = "OBJECT_NOT_FOUND";
pub const ERROR_ENVIRONMENT_URL_NOT_FOUND: &str = "ENVIRONMENT_URL_NOT_FOUND";
pub const ERROR_ENVIRONMENTS_IN_ENV_GROUP: &str = "ENVIRONMENTS_IN_ENV_GROUP";
pub const ERROR_POLICY_ASSIGNED_TO_ENV_GROUP: &str = "POLICY_ASSIGNED_TO_ENV_GROUP";
pub const ERROR_ENVIRONMENT_CREATION: &str = "ENVIRONMENT_CREATION";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Unexpected HTTP status code. Expected: {expected:?}, received: {status}. Body: {body}")]
    UnexpectedHttpStatus {
        expected: Vec<u16>,
        status: u16,
        body: String,
    },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("No credentials provided. Configure a client secret, the Azure CLI or OIDC")]
    NoCredentials,

    #[error("Invalid URL '{0}', the URL must be absolute")]
    InvalidUrl(String),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("Request still failing with HTTP {status} after {attempts} attempts")]
    RetriesExhausted { status: u16, attempts: u32 },

    #[error("{0}")]
    ObjectNotFound(String),

    #[error("{0}")]
    EnvironmentUrlNotFound(String),

    #[error("{0}")]
    EnvironmentsInEnvGroup(String),

    #[error("{0}")]
    PolicyAssignedToEnvGroup(String),

    #[error("Environment creation failed: {0}")]
    EnvironmentCreation(String),

    #[error("{0}")]
    LifecycleFailed(String),

    #[error("{0}")]
    Validation(String),
}

impl ApiError {
    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::UnexpectedHttpStatus { status, .. } => Some(*status),
            ApiError::RetriesExhausted { status, .. } => Some(*status),
            ApiError::RequestError(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Provider error code for categorised failures
    pub fn code(&self) -> Option<&'static str> {
        match self {
            ApiError::ObjectNotFound(_) => Some(ERROR_OBJECT_NOT_FOUND),
            ApiError::EnvironmentUrlNotFound(_) => Some(ERROR_ENVIRONMENT_URL_NOT_FOUND),
            ApiError::EnvironmentsInEnvGroup(_) => Some(ERROR_ENVIRONMENTS_IN_ENV_GROUP),
            ApiError::PolicyAssignedToEnvGroup(_) => Some(ERROR_POLICY_ASSIGNED_TO_ENV_GROUP),
            ApiError::EnvironmentCreation(_) => Some(ERROR_ENVIRONMENT_CREATION),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::ObjectNotFound(_)) || self.status() == Some(404)
    }
}
