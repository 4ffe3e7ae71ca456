//! Reconciliation outcome types

use crate::error::CloudError;
use crate::remote::OperationId;
use cloudboard_core::{
    ArtifactBinding, ArtifactRequirement, ChangeKind, ChangeSet, Feature, FeatureName, MatchNote,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-feature outcome of a reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Succeeded,
    Failed,
    /// Never submitted
    Skipped,
    /// Submitted but still pending at the deadline
    TimedOut,
    /// Submitted but the final state is not known (cancelled, untrackable)
    Unknown,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeStatus::Succeeded => write!(f, "succeeded"),
            OutcomeStatus::Failed => write!(f, "failed"),
            OutcomeStatus::Skipped => write!(f, "skipped"),
            OutcomeStatus::TimedOut => write!(f, "timed-out"),
            OutcomeStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Machine-readable reason attached to a non-successful outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    ValidationFailed,
    SubmissionRejected,
    SubmissionFailed,
    OperationFailed,
    TrackingUnavailable,
    TimedOut,
    ArtifactsMissing,
    RequirementsUnavailable,
    Cancelled,
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            ReasonCode::ValidationFailed => "VALIDATION_FAILED",
            ReasonCode::SubmissionRejected => "SUBMISSION_REJECTED",
            ReasonCode::SubmissionFailed => "SUBMISSION_FAILED",
            ReasonCode::OperationFailed => "OPERATION_FAILED",
            ReasonCode::TrackingUnavailable => "TRACKING_UNAVAILABLE",
            ReasonCode::TimedOut => "TIMED_OUT",
            ReasonCode::ArtifactsMissing => "ARTIFACTS_MISSING",
            ReasonCode::RequirementsUnavailable => "REQUIREMENTS_UNAVAILABLE",
            ReasonCode::Cancelled => "CANCELLED",
        };
        f.write_str(code)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeReason {
    pub code: ReasonCode,
    pub message: String,
}

impl OutcomeReason {
    pub fn new(code: ReasonCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Reason for a change that errored before reaching a terminal status
    pub fn from_error(error: &CloudError) -> Self {
        let code = match error {
            CloudError::SubmissionRejected { .. } => ReasonCode::SubmissionRejected,
            CloudError::TrackingUnavailable { .. } | CloudError::OperationNotFound { .. } => {
                ReasonCode::TrackingUnavailable
            }
            CloudError::Core(e) if e.is_validation() => ReasonCode::ValidationFailed,
            _ => ReasonCode::SubmissionFailed,
        };
        Self::new(code, error.to_string())
    }
}

impl fmt::Display for OutcomeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// What happened to one feature during a pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureOutcome {
    pub name: FeatureName,
    /// Change attempted for the feature; `None` when validation stopped the pass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<ChangeKind>,
    pub status: OutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<OutcomeReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<OperationId>,
}

impl FeatureOutcome {
    pub fn succeeded(name: FeatureName, change: ChangeKind) -> Self {
        Self {
            name,
            change: Some(change),
            status: OutcomeStatus::Succeeded,
            reason: None,
            operation_id: None,
        }
    }

    pub fn with_status(
        name: FeatureName,
        change: Option<ChangeKind>,
        status: OutcomeStatus,
        reason: OutcomeReason,
    ) -> Self {
        Self {
            name,
            change,
            status,
            reason: Some(reason),
            operation_id: None,
        }
    }

    pub fn with_operation(mut self, id: OperationId) -> Self {
        self.operation_id = Some(id);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Succeeded
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Succeeded,
    PartialFailure,
    Failed,
}

impl OverallStatus {
    /// `Succeeded` when every change succeeded (vacuously for none),
    /// `PartialFailure` when only some did, `Failed` when none did
    pub fn aggregate(outcomes: &[FeatureOutcome]) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        if succeeded == outcomes.len() {
            OverallStatus::Succeeded
        } else if succeeded > 0 {
            OverallStatus::PartialFailure
        } else {
            OverallStatus::Failed
        }
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverallStatus::Succeeded => write!(f, "succeeded"),
            OverallStatus::PartialFailure => write!(f, "partial-failure"),
            OverallStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Identity artifact findings across every matched feature
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactReport {
    pub missing: Vec<ArtifactRequirement>,
    pub extra: Vec<ArtifactBinding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<MatchNote>,
}

/// Result of one reconciliation pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub account_id: String,
    pub overall_status: OverallStatus,
    pub features: Vec<FeatureOutcome>,
    pub artifacts: ArtifactReport,
    pub change_set: ChangeSet,
    /// Pass-level failure (validation)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ReconciliationResult {
    /// Every desired feature skipped; nothing was submitted
    pub fn validation_failed(account_id: String, desired: &[Feature], error: String) -> Self {
        let features = desired
            .iter()
            .map(|f| {
                FeatureOutcome::with_status(
                    f.name,
                    None,
                    OutcomeStatus::Skipped,
                    OutcomeReason::new(ReasonCode::ValidationFailed, error.clone()),
                )
            })
            .collect();

        Self {
            account_id,
            overall_status: OverallStatus::Failed,
            features,
            artifacts: ArtifactReport::default(),
            change_set: ChangeSet::default(),
            error: Some(error),
            duration_ms: 0,
        }
    }

    /// Nothing to change
    pub fn no_op(account_id: String) -> Self {
        Self::from_outcomes(account_id, ChangeSet::default(), Vec::new(), ArtifactReport::default())
    }

    pub fn from_outcomes(
        account_id: String,
        change_set: ChangeSet,
        features: Vec<FeatureOutcome>,
        artifacts: ArtifactReport,
    ) -> Self {
        Self {
            account_id,
            overall_status: OverallStatus::aggregate(&features),
            features,
            artifacts,
            change_set,
            error: None,
            duration_ms: 0,
        }
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn is_success(&self) -> bool {
        self.overall_status == OverallStatus::Succeeded
    }

    pub fn outcome(&self, name: FeatureName) -> Option<&FeatureOutcome> {
        self.features.iter().find(|o| o.name == name)
    }

    /// Compact view for callers and machine output
    pub fn report(&self) -> Report {
        Report {
            account_id: self.account_id.clone(),
            overall_status: self.overall_status,
            features: self
                .features
                .iter()
                .map(|o| FeatureReport {
                    name: o.name,
                    status: o.status,
                    reason: o.reason.clone(),
                })
                .collect(),
            artifacts: ArtifactSummary {
                missing: self.artifacts.missing.clone(),
                extra: self.artifacts.extra.clone(),
            },
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.report())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub account_id: String,
    pub overall_status: OverallStatus,
    pub features: Vec<FeatureReport>,
    pub artifacts: ArtifactSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureReport {
    pub name: FeatureName,
    pub status: OutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<OutcomeReason>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    pub missing: Vec<ArtifactRequirement>,
    pub extra: Vec<ArtifactBinding>,
}
