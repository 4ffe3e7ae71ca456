//! Reconciliation orchestrator
//!
//! Drives one account from its current feature state to the desired one:
//!
//! 1. validate every desired feature against the permission catalog
//! 2. diff current against desired
//! 3. run disables, then enables, then updates; each phase is a barrier and
//!    its changes run concurrently within the tracker's in-flight limit
//! 4. match identity artifacts for features that need them
//! 5. aggregate per-feature outcomes
//!
//! At most one reconciliation per account may run at a time; callers are
//! responsible for that.

use crate::error::{CloudError, Result};
use crate::ledger::{FileLedger, MemoryLedger, OperationLedger, PendingEntry};
use crate::operation::{AsyncOperation, OperationStatus};
use crate::remote::{RemoteOperations, SubmitRequest};
use crate::result::{
    ArtifactReport, FeatureOutcome, OutcomeReason, OutcomeStatus, ReasonCode,
    ReconciliationResult,
};
use crate::tracker::{OperationTracker, TrackerConfig, is_unresolved};
use cloudboard_config::Settings;
use cloudboard_core::{
    ArtifactBinding, ChangeKind, CloudAccount, CloudVendor, CoreError, Feature, FeatureChange,
    FeatureName, PermissionCatalog, PermissionFragment, RoleKey, YamlCatalogSource, diff,
    match_artifacts,
};
use futures_util::future::join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const PHASES: [ChangeKind; 3] = [ChangeKind::Disable, ChangeKind::Enable, ChangeKind::Update];

/// Reconciles cloud account features against the control plane
pub struct Reconciler {
    catalog: Arc<PermissionCatalog>,
    remote: Arc<dyn RemoteOperations>,
    tracker: OperationTracker,
    ledger: Arc<dyn OperationLedger>,
}

impl Reconciler {
    /// Reconciler with an in-memory ledger
    pub fn new(
        catalog: Arc<PermissionCatalog>,
        remote: Arc<dyn RemoteOperations>,
        config: TrackerConfig,
    ) -> Self {
        let tracker = OperationTracker::new(remote.clone(), config);
        Self {
            catalog,
            remote,
            tracker,
            ledger: Arc::new(MemoryLedger::new()),
        }
    }

    /// Reconciler built from settings: catalog file (or the built-in one),
    /// tracker timing and an on-disk ledger
    pub fn from_settings(settings: &Settings, remote: Arc<dyn RemoteOperations>) -> Result<Self> {
        settings.validate()?;
        let catalog = catalog_from_settings(settings)?;
        let ledger_dir = match &settings.ledger_dir {
            Some(dir) => dir.clone(),
            None => cloudboard_config::default_ledger_dir()?,
        };

        Ok(
            Self::new(Arc::new(catalog), remote, TrackerConfig::from(settings))
                .with_ledger(Arc::new(FileLedger::new(ledger_dir))),
        )
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn OperationLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn tracker(&self) -> &OperationTracker {
        &self.tracker
    }

    pub fn catalog(&self) -> &PermissionCatalog {
        &self.catalog
    }

    /// Bring `account` to the `desired` feature state.
    ///
    /// Never fails: every problem is reported through the result, either as
    /// a pass-level validation error or as per-feature outcomes.
    pub async fn reconcile(
        &self,
        account: &CloudAccount,
        desired: &[Feature],
        bindings: &[ArtifactBinding],
        cancel: &CancellationToken,
    ) -> ReconciliationResult {
        let started = Instant::now();
        let account_id = account.account_id();
        tracing::info!(
            "Reconciling {} ({} desired feature(s))",
            account_id,
            desired.len()
        );

        let fragments = match self.validate(account.cloud, desired) {
            Ok(fragments) => fragments,
            Err(e) => {
                tracing::warn!("Validation failed for {}: {}", account_id, e);
                return ReconciliationResult::validation_failed(account_id, desired, e.to_string())
                    .with_duration_ms(elapsed_ms(started));
            }
        };

        let current = self.catalog.normalize(account.cloud, &account.features);
        let wanted = self.catalog.normalize(account.cloud, desired);
        let change_set = match diff(&current, &wanted) {
            Ok(change_set) => change_set,
            Err(e) => {
                tracing::warn!("Cannot diff features of {}: {}", account_id, e);
                return ReconciliationResult::validation_failed(account_id, desired, e.to_string())
                    .with_duration_ms(elapsed_ms(started));
            }
        };

        if change_set.is_empty() {
            tracing::info!("{} is already in the desired state", account_id);
            return ReconciliationResult::no_op(account_id).with_duration_ms(elapsed_ms(started));
        }
        tracing::info!("Planned changes for {}: {}", account_id, change_set.summary());

        let mut outcomes = Vec::with_capacity(change_set.len());
        for kind in PHASES {
            let changes = change_set.by_kind(kind);
            if changes.is_empty() {
                continue;
            }

            if cancel.is_cancelled() {
                outcomes.extend(changes.into_iter().map(cancelled_before_submit));
                continue;
            }

            tracing::info!("Phase {}: {} change(s)", kind, changes.len());
            let phase = changes.into_iter().map(|change| {
                let permissions = fragments.get(&change.feature_name()).cloned();
                self.run_change(account, &account_id, change, permissions, cancel)
            });
            outcomes.extend(join_all(phase).await);
        }

        let artifacts = self.match_identity(account, bindings, &mut outcomes).await;

        let result = ReconciliationResult::from_outcomes(account_id, change_set, outcomes, artifacts)
            .with_duration_ms(elapsed_ms(started));
        tracing::info!(
            "Reconciliation of {} finished: {}",
            result.account_id,
            result.overall_status
        );
        result
    }

    /// Check every desired feature and resolve its permissions
    fn validate(
        &self,
        cloud: CloudVendor,
        desired: &[Feature],
    ) -> std::result::Result<BTreeMap<FeatureName, PermissionFragment>, CoreError> {
        let mut fragments = BTreeMap::new();
        for feature in desired {
            feature.validate()?;
            let fragment = self.catalog.resolve_feature(cloud, feature)?;
            fragments.insert(feature.name, fragment);
        }
        Ok(fragments)
    }

    /// Submit (or resume) one change and wait for its outcome
    async fn run_change(
        &self,
        account: &CloudAccount,
        account_id: &str,
        change: &FeatureChange,
        permissions: Option<PermissionFragment>,
        cancel: &CancellationToken,
    ) -> FeatureOutcome {
        let name = change.feature_name();
        let kind = change.kind();

        let _slot = tokio::select! {
            biased;
            _ = cancel.cancelled() => return cancelled_before_submit(change),
            slot = self.tracker.acquire() => match slot {
                Ok(slot) => slot,
                Err(e) => {
                    return FeatureOutcome::with_status(
                        name,
                        Some(kind),
                        OutcomeStatus::Failed,
                        OutcomeReason::from_error(&e),
                    );
                }
            },
        };

        let resumed = self.resumable(account_id, change).await;
        let was_resumed = resumed.is_some();
        let op = match resumed {
            Some(op) => op,
            None => match self.submit(account, account_id, change, permissions.clone(), cancel).await {
                Ok(op) => op,
                Err(outcome) => return outcome,
            },
        };

        let mut id = op.id.clone();
        let mut awaited = self.tracker.await_default(op, cancel).await;

        if was_resumed && matches!(awaited, Err(CloudError::OperationNotFound { .. })) {
            tracing::warn!(
                "Control plane no longer knows operation {} for {}; submitting again",
                id,
                name
            );
            self.forget(account_id, name).await;
            let op = match self.submit(account, account_id, change, permissions, cancel).await {
                Ok(op) => op,
                Err(outcome) => return outcome,
            };
            id = op.id.clone();
            awaited = self.tracker.await_default(op, cancel).await;
        }

        let op = match awaited {
            Ok(op) => op,
            Err(e) => {
                if matches!(e, CloudError::OperationNotFound { .. }) {
                    self.forget(account_id, name).await;
                }
                // Otherwise left in the ledger: the operation may still complete
                tracing::warn!("Lost track of {} for {}: {}", id, name, e);
                return FeatureOutcome::with_status(
                    name,
                    Some(kind),
                    OutcomeStatus::Failed,
                    OutcomeReason::from_error(&e),
                )
                .with_operation(id);
            }
        };

        if is_unresolved(&op) {
            self.remember(account_id, change, &op).await;
        } else {
            self.forget(account_id, name).await;
        }

        let outcome = match op.status {
            OperationStatus::Succeeded => FeatureOutcome::succeeded(name, kind),
            OperationStatus::Failed => FeatureOutcome::with_status(
                name,
                Some(kind),
                OutcomeStatus::Failed,
                OutcomeReason::new(
                    ReasonCode::OperationFailed,
                    op.error.clone().unwrap_or_else(|| "operation failed".into()),
                ),
            ),
            OperationStatus::TimedOut => FeatureOutcome::with_status(
                name,
                Some(kind),
                OutcomeStatus::TimedOut,
                OutcomeReason::new(
                    ReasonCode::TimedOut,
                    format!(
                        "operation {} still pending after {:?}",
                        op.id,
                        self.tracker.config().timeout
                    ),
                ),
            ),
            OperationStatus::Pending | OperationStatus::Running => FeatureOutcome::with_status(
                name,
                Some(kind),
                OutcomeStatus::Unknown,
                OutcomeReason::new(
                    ReasonCode::Cancelled,
                    format!("stopped tracking operation {} while {}", op.id, op.status),
                ),
            ),
        };
        outcome.with_operation(id)
    }

    /// Submit a fresh operation for `change` and record it in the ledger
    async fn submit(
        &self,
        account: &CloudAccount,
        account_id: &str,
        change: &FeatureChange,
        permissions: Option<PermissionFragment>,
        cancel: &CancellationToken,
    ) -> std::result::Result<AsyncOperation, FeatureOutcome> {
        if cancel.is_cancelled() {
            return Err(cancelled_before_submit(change));
        }

        let request = SubmitRequest {
            account_id: account.account_id(),
            change: change.clone(),
            permissions,
        };
        match self.tracker.submit(&request).await {
            Ok(op) => {
                self.remember(account_id, change, &op).await;
                Ok(op)
            }
            Err(e) => {
                tracing::warn!("{} of {} not submitted: {}", change.kind(), change.feature_name(), e);
                Err(FeatureOutcome::with_status(
                    change.feature_name(),
                    Some(change.kind()),
                    OutcomeStatus::Failed,
                    OutcomeReason::from_error(&e),
                ))
            }
        }
    }

    /// Pending operation recorded by an earlier pass for the same change
    async fn resumable(&self, account_id: &str, change: &FeatureChange) -> Option<AsyncOperation> {
        let name = change.feature_name();
        match self.ledger.pending(account_id, name).await {
            Ok(Some(entry)) if entry.change == *change => {
                tracing::info!(
                    "Resuming {} of {} as operation {}",
                    change.kind(),
                    name,
                    entry.operation.id
                );
                let mut op = entry.operation;
                // Tracked again from scratch
                op.status = OperationStatus::Pending;
                op.error = None;
                Some(op)
            }
            Ok(Some(entry)) => {
                tracing::debug!(
                    "Ignoring pending operation {} for {}: change differs",
                    entry.operation.id,
                    name
                );
                None
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Ledger lookup failed for {}: {}", name, e);
                None
            }
        }
    }

    async fn remember(&self, account_id: &str, change: &FeatureChange, op: &AsyncOperation) {
        let entry = PendingEntry::new(change.clone(), op.clone());
        if let Err(e) = self.ledger.record(account_id, entry).await {
            tracing::warn!("Failed to record operation {}: {}", op.id, e);
        }
    }

    async fn forget(&self, account_id: &str, name: FeatureName) {
        if let Err(e) = self.ledger.clear(account_id, name).await {
            tracing::warn!("Failed to clear ledger entry for {}: {}", name, e);
        }
    }

    /// Match identity artifacts for succeeded enables and updates that need
    /// them. Features with missing artifacts are turned into failures.
    async fn match_identity(
        &self,
        account: &CloudAccount,
        bindings: &[ArtifactBinding],
        outcomes: &mut [FeatureOutcome],
    ) -> ArtifactReport {
        let mut report = ArtifactReport::default();
        let mut required: BTreeSet<RoleKey> = BTreeSet::new();
        let mut matched_any = false;

        for outcome in outcomes.iter_mut() {
            let needs_match = outcome.is_success()
                && matches!(outcome.change, Some(ChangeKind::Enable | ChangeKind::Update))
                && outcome.name.requires_identity_artifacts(account.cloud);
            if !needs_match {
                continue;
            }

            let requirements = match self.remote.artifact_requirements(account, outcome.name).await {
                Ok(requirements) => requirements,
                Err(e) => {
                    tracing::warn!("Cannot fetch artifact requirements for {}: {}", outcome.name, e);
                    outcome.status = OutcomeStatus::Failed;
                    outcome.reason = Some(OutcomeReason::new(
                        ReasonCode::RequirementsUnavailable,
                        e.to_string(),
                    ));
                    continue;
                }
            };
            matched_any = true;
            required.extend(requirements.iter().map(|r| r.role_key.clone()));

            let matched = match_artifacts(&requirements, bindings);
            if !matched.is_satisfied() {
                let missing: Vec<String> = matched.missing.iter().map(ToString::to_string).collect();
                tracing::warn!(
                    "{} is missing identity artifacts: {}",
                    outcome.name,
                    missing.join(", ")
                );
                outcome.status = OutcomeStatus::Failed;
                outcome.reason = Some(OutcomeReason::new(
                    ReasonCode::ArtifactsMissing,
                    format!("missing {}", missing.join(", ")),
                ));
            } else {
                tracing::debug!(
                    "{} matched {} identity artifact(s)",
                    outcome.name,
                    matched.matched_count()
                );
            }
            for requirement in matched.missing {
                if !report.missing.contains(&requirement) {
                    report.missing.push(requirement);
                }
            }
            report.notes.extend(matched.notes);
        }

        if matched_any {
            report.extra = bindings
                .iter()
                .filter(|b| !required.contains(&b.role_key))
                .cloned()
                .collect();
        }
        report
    }
}

/// Permission catalog named by the settings, or the built-in one
pub fn catalog_from_settings(settings: &Settings) -> Result<PermissionCatalog> {
    match &settings.catalog_path {
        Some(path) => {
            tracing::debug!("Loading permission catalog from {}", path.display());
            Ok(PermissionCatalog::load(&YamlCatalogSource::new(path)?)?)
        }
        None => Ok(PermissionCatalog::builtin()),
    }
}

fn cancelled_before_submit(change: &FeatureChange) -> FeatureOutcome {
    FeatureOutcome::with_status(
        change.feature_name(),
        Some(change.kind()),
        OutcomeStatus::Skipped,
        OutcomeReason::new(ReasonCode::Cancelled, "cancelled before submission"),
    )
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeRemote, Script};
    use cloudboard_core::{ArtifactKind, ArtifactRequirement};
    use std::time::Duration;

    fn config() -> TrackerConfig {
        TrackerConfig {
            timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(5),
            jitter_ratio: 0.0,
            max_in_flight: 4,
            retry: Default::default(),
        }
    }

    fn reconciler(remote: Arc<FakeRemote>) -> Reconciler {
        Reconciler::new(Arc::new(PermissionCatalog::builtin()), remote, config())
    }

    fn cnp() -> Feature {
        Feature::new(FeatureName::CloudNativeProtection)
            .with_groups(["BASIC"])
            .with_regions(["us-east-1"])
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_carries_no_permissions() {
        let remote = Arc::new(FakeRemote::new());
        let account = CloudAccount::new(CloudVendor::Aws, "123456789012").with_features(vec![cnp()]);

        let result = reconciler(remote.clone())
            .reconcile(&account, &[], &[], &CancellationToken::new())
            .await;

        assert!(result.is_success());
        let submissions = remote.submissions();
        assert_eq!(submissions.len(), 1);
        assert!(submissions[0].permissions.is_none());
        assert_eq!(submissions[0].account_id, "aws:123456789012");
    }

    #[tokio::test(start_paused = true)]
    async fn test_enable_carries_resolved_permissions() {
        let remote = Arc::new(FakeRemote::new());
        let account = CloudAccount::new(CloudVendor::Aws, "123456789012");

        reconciler(remote.clone())
            .reconcile(&account, &[cnp()], &[], &CancellationToken::new())
            .await;

        let submissions = remote.submissions();
        let fragment = submissions[0].permissions.as_ref().unwrap();
        assert_eq!(fragment.groups, vec!["BASIC".to_string()]);
        assert!(!fragment.permissions.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gcp_features_skip_artifact_matching() {
        let remote = Arc::new(FakeRemote::new().requirements(
            FeatureName::CloudNativeProtection,
            vec![ArtifactRequirement::new("CROSSACCOUNT", ArtifactKind::Role)],
        ));
        let account = CloudAccount::new(CloudVendor::Gcp, "project-1");
        let feature = Feature::new(FeatureName::CloudNativeProtection).with_groups(["BASIC"]);

        let result = reconciler(remote)
            .reconcile(&account, &[feature], &[], &CancellationToken::new())
            .await;

        // GCP features do not depend on identity artifacts
        assert!(result.is_success());
        assert!(result.artifacts.missing.is_empty());
    }
}
