//! cloudboard cloud
//!
//! The asynchronous half of the reconciliation engine: control plane
//! collaborator traits, the operation tracker, the pending-operation ledger
//! and the [`Reconciler`] that ties them to the pure diff/catalog/matcher
//! logic in `cloudboard-core`.

pub mod error;
pub mod ledger;
pub mod operation;
pub mod orchestrator;
pub mod remote;
pub mod result;
pub mod tracker;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-exports
pub use error::{CloudError, RemoteError, Result};
pub use ledger::{FileLedger, LedgerFile, MemoryLedger, OperationLedger, PendingEntry};
pub use operation::{AsyncOperation, OperationStatus};
pub use orchestrator::{Reconciler, catalog_from_settings};
pub use remote::{
    IdentityArtifactSource, OperationId, RemoteOperations, RemoteStatus, RetryConfig,
    SubmitRequest,
};
pub use result::{
    ArtifactReport, ArtifactSummary, FeatureOutcome, FeatureReport, OutcomeReason, OutcomeStatus,
    OverallStatus, ReasonCode, ReconciliationResult, Report,
};
pub use tracker::{InFlightGuard, OperationTracker, TrackerConfig, is_unresolved};
pub use tokio_util::sync::CancellationToken;
