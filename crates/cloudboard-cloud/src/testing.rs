//! In-memory control plane for tests
//!
//! Each feature follows a [`Script`] describing how its operations behave.
//! Features without a script succeed on the first status query.

use crate::error::RemoteError;
use crate::remote::{OperationId, RemoteOperations, RemoteStatus, SubmitRequest};
use async_trait::async_trait;
use cloudboard_core::{ArtifactRequirement, CloudAccount, FeatureName};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Scripted behaviour of the operations submitted for a feature
#[derive(Debug, Clone)]
pub enum Script {
    Succeed { after_polls: u32 },
    Fail { after_polls: u32, detail: String },
    /// Submission refused synchronously
    Reject(String),
    /// Submission fails with a transport error
    Unreachable(String),
    /// Never leaves `Running`
    Hang,
    /// First `failures` status queries fail transiently
    Flaky { failures: u32, then: Box<Script> },
}

impl Script {
    pub fn succeed_after(polls: u32) -> Self {
        Script::Succeed { after_polls: polls }
    }

    pub fn fail_after(polls: u32, detail: impl Into<String>) -> Self {
        Script::Fail {
            after_polls: polls,
            detail: detail.into(),
        }
    }
}

#[derive(Debug)]
struct FakeOperation {
    feature: FeatureName,
    script: Script,
    polls: u32,
    failures_seen: u32,
    finished: bool,
}

impl FakeOperation {
    fn answer(&mut self) -> Result<RemoteStatus, RemoteError> {
        let script = self.script.clone();
        self.answer_with(&script)
    }

    fn answer_with(&mut self, script: &Script) -> Result<RemoteStatus, RemoteError> {
        match script {
            Script::Flaky { failures, then } => {
                if self.failures_seen < *failures {
                    self.failures_seen += 1;
                    return Err(RemoteError::Unavailable("connection reset".into()));
                }
                self.answer_with(then)
            }
            Script::Succeed { after_polls } => {
                self.polls += 1;
                if self.polls >= *after_polls {
                    Ok(RemoteStatus::Succeeded)
                } else {
                    Ok(RemoteStatus::Running)
                }
            }
            Script::Fail {
                after_polls,
                detail,
            } => {
                self.polls += 1;
                if self.polls >= *after_polls {
                    Ok(RemoteStatus::Failed(detail.clone()))
                } else {
                    Ok(RemoteStatus::Running)
                }
            }
            Script::Hang | Script::Reject(_) | Script::Unreachable(_) => {
                self.polls += 1;
                Ok(RemoteStatus::Running)
            }
        }
    }
}

#[derive(Debug, Default)]
struct FakeState {
    operations: HashMap<OperationId, FakeOperation>,
    submissions: Vec<SubmitRequest>,
    active: usize,
    peak_active: usize,
}

/// Scriptable in-memory [`RemoteOperations`]
#[derive(Debug, Default)]
pub struct FakeRemote {
    scripts: HashMap<FeatureName, Script>,
    requirements: HashMap<FeatureName, Vec<ArtifactRequirement>>,
    state: Mutex<FakeState>,
    next_id: AtomicU64,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, feature: FeatureName, script: Script) -> Self {
        self.scripts.insert(feature, script);
        self
    }

    pub fn requirements(mut self, feature: FeatureName, requirements: Vec<ArtifactRequirement>) -> Self {
        self.requirements.insert(feature, requirements);
        self
    }

    /// Register an operation as if it had been submitted earlier
    pub fn seed_operation(&self, id: &OperationId, feature: FeatureName, script: Script) {
        let mut state = self.lock();
        state.operations.insert(
            id.clone(),
            FakeOperation {
                feature,
                script,
                polls: 0,
                failures_seen: 0,
                finished: false,
            },
        );
        state.active += 1;
        state.peak_active = state.peak_active.max(state.active);
    }

    pub fn submissions(&self) -> Vec<SubmitRequest> {
        self.lock().submissions.clone()
    }

    pub fn submissions_for(&self, feature: FeatureName) -> usize {
        self.lock()
            .submissions
            .iter()
            .filter(|s| s.change.feature_name() == feature)
            .count()
    }

    /// Most operations that were unfinished at the same time
    pub fn peak_active(&self) -> usize {
        self.lock().peak_active
    }

    pub fn polls(&self, feature: FeatureName) -> u32 {
        self.lock()
            .operations
            .values()
            .filter(|op| op.feature == feature)
            .map(|op| op.polls)
            .sum()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl RemoteOperations for FakeRemote {
    async fn submit(&self, request: &SubmitRequest) -> Result<OperationId, RemoteError> {
        let feature = request.change.feature_name();
        let script = self
            .scripts
            .get(&feature)
            .cloned()
            .unwrap_or(Script::succeed_after(1));

        let mut state = self.lock();
        state.submissions.push(request.clone());

        match script {
            Script::Reject(reason) => return Err(RemoteError::Rejected(reason)),
            Script::Unreachable(reason) => return Err(RemoteError::Unavailable(reason)),
            _ => {}
        }

        let id = OperationId::new(format!("op-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1));
        state.operations.insert(
            id.clone(),
            FakeOperation {
                feature,
                script,
                polls: 0,
                failures_seen: 0,
                finished: false,
            },
        );
        state.active += 1;
        state.peak_active = state.peak_active.max(state.active);
        Ok(id)
    }

    async fn query(&self, id: &OperationId) -> Result<RemoteStatus, RemoteError> {
        let mut state = self.lock();
        let op = state
            .operations
            .get_mut(id)
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;

        let status = op.answer()?;
        let newly_finished = matches!(status, RemoteStatus::Succeeded | RemoteStatus::Failed(_))
            && !op.finished;
        if newly_finished {
            op.finished = true;
            state.active -= 1;
        }
        Ok(status)
    }

    async fn artifact_requirements(
        &self,
        _account: &CloudAccount,
        feature: FeatureName,
    ) -> Result<Vec<ArtifactRequirement>, RemoteError> {
        Ok(self.requirements.get(&feature).cloned().unwrap_or_default())
    }
}
