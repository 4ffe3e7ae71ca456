//! Reconciliation error types

use cloudboard_config::ConfigError;
use cloudboard_core::{CoreError, FeatureName};
use thiserror::Error;

/// Errors reported by the control plane collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Request refused synchronously (quota, malformed region, ...)
    #[error("Rejected: {0}")]
    Rejected(String),

    /// Control plane unreachable; worth retrying
    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Operation not found: {0}")]
    NotFound(String),

    #[error("API error: {0}")]
    Api(String),
}

impl RemoteError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Unavailable(_))
    }
}

/// Cloud reconciliation errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Submission rejected for {feature}: {reason}")]
    SubmissionRejected { feature: FeatureName, reason: String },

    #[error("Submission failed for {feature}: {source}")]
    SubmissionFailed {
        feature: FeatureName,
        #[source]
        source: RemoteError,
    },

    #[error("Tracking unavailable for operation {operation_id} after {attempts} attempt(s): {reason}")]
    TrackingUnavailable {
        operation_id: String,
        attempts: u32,
        reason: String,
    },

    /// The control plane has no record of the operation
    #[error("Operation {operation_id} is unknown to the control plane")]
    OperationNotFound { operation_id: String },

    #[error("Operation tracker is shut down")]
    TrackerClosed,

    #[error("Ledger error: {0}")]
    LedgerError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;
