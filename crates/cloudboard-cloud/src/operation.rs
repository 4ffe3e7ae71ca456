//! Asynchronous operation state

use crate::remote::{OperationId, RemoteStatus};
use chrono::{DateTime, Utc};
use cloudboard_core::{ChangeKind, FeatureName};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a tracked operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    /// Still pending when the tracker stopped waiting; may complete out-of-band
    TimedOut,
}

impl OperationStatus {
    /// The tracker stops polling in a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationStatus::Succeeded | OperationStatus::Failed | OperationStatus::TimedOut
        )
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationStatus::Pending => write!(f, "pending"),
            OperationStatus::Running => write!(f, "running"),
            OperationStatus::Succeeded => write!(f, "succeeded"),
            OperationStatus::Failed => write!(f, "failed"),
            OperationStatus::TimedOut => write!(f, "timed-out"),
        }
    }
}

/// A feature change submitted to the control plane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsyncOperation {
    pub id: OperationId,
    pub kind: ChangeKind,
    pub feature: FeatureName,
    pub submitted_at: DateTime<Utc>,
    pub status: OperationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Status queries answered so far
    #[serde(default)]
    pub polls: u32,
}

impl AsyncOperation {
    pub fn new(id: OperationId, kind: ChangeKind, feature: FeatureName) -> Self {
        Self {
            id,
            kind,
            feature,
            submitted_at: Utc::now(),
            status: OperationStatus::Pending,
            error: None,
            polls: 0,
        }
    }

    /// Fold a status answer from the control plane into the operation
    pub fn observe(&mut self, status: RemoteStatus) {
        self.polls += 1;
        match status {
            RemoteStatus::Queued => self.status = OperationStatus::Pending,
            RemoteStatus::Running => self.status = OperationStatus::Running,
            RemoteStatus::Succeeded => {
                self.status = OperationStatus::Succeeded;
                self.error = None;
            }
            RemoteStatus::Failed(detail) => {
                self.status = OperationStatus::Failed;
                self.error = Some(detail);
            }
        }
    }

    pub fn mark_timed_out(&mut self) {
        self.status = OperationStatus::TimedOut;
    }
}
