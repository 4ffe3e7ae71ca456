//! Control plane collaborator traits
//!
//! The reconciliation engine never talks to the control plane directly; it
//! goes through [`RemoteOperations`], which adapters implement on top of
//! whatever API client they hold.

use crate::error::RemoteError;
use async_trait::async_trait;
use cloudboard_config::RetrySettings;
use cloudboard_core::{
    ArtifactBinding, ArtifactRequirement, CloudAccount, FeatureChange, FeatureName,
    PermissionFragment,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Identifier of a long-running operation on the control plane
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(String);

impl OperationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request sent to the control plane for one feature change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub account_id: String,
    pub change: FeatureChange,
    /// Permissions resolved for the target state; absent for disables
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<PermissionFragment>,
}

/// Status reported by the control plane for an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum RemoteStatus {
    Queued,
    Running,
    Succeeded,
    Failed(String),
}

/// Long-running operations on the control plane
#[async_trait]
pub trait RemoteOperations: Send + Sync {
    /// Submit a feature change. Synchronous refusals are `RemoteError::Rejected`.
    async fn submit(&self, request: &SubmitRequest) -> Result<OperationId, RemoteError>;

    /// Current status of a submitted operation
    async fn query(&self, id: &OperationId) -> Result<RemoteStatus, RemoteError>;

    /// Identity artifacts the control plane expects for `feature` on `account`
    async fn artifact_requirements(
        &self,
        _account: &CloudAccount,
        _feature: FeatureName,
    ) -> Result<Vec<ArtifactRequirement>, RemoteError> {
        Ok(Vec::new())
    }
}

/// Discovers identity artifacts present in a cloud account
///
/// Used by adapters before reconciling; the engine itself only matches what
/// it is given.
#[async_trait]
pub trait IdentityArtifactSource: Send + Sync {
    async fn list(&self, account: &CloudAccount) -> Result<Vec<ArtifactBinding>, RemoteError>;
}

/// Retry configuration for transient control plane failures
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Delay before retry number `attempt` (0-based), capped at `max_delay`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt as i32);
        let delay = self.initial_delay.as_secs_f64() * factor;
        // `min` also maps NaN to the cap
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()).max(0.0))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            backoff_multiplier: settings.multiplier,
        }
    }
}
