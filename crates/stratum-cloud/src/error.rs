//! Cloud resource error types

use thiserror::Error;

/// Errors surfaced by stores, resolvers and providers
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Strategy config unavailable: {0}")]
    ConfigUnavailable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Write conflict on {name}: expected version {expected}, found {actual}")]
    Conflict {
        name: String,
        expected: u64,
        actual: u64,
    },

    #[error("State file error: {0}")]
    StateError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Infrastructure hiccups that must not change a request's phase.
    ///
    /// The caller requeues and re-derives its decision on the next pass.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CloudError::ConfigUnavailable(_) | CloudError::Timeout(_) | CloudError::Conflict { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
