//! Async operation tracker
//!
//! Submits feature changes and polls the resulting operations to a terminal
//! status. Polling waits are jittered so many tracked operations do not hit
//! the control plane in lockstep, and transient query failures are retried
//! with exponential backoff. The tracker never resubmits an operation.

use crate::error::{CloudError, RemoteError, Result};
use crate::operation::{AsyncOperation, OperationStatus};
use crate::remote::{OperationId, RemoteOperations, RemoteStatus, RetryConfig, SubmitRequest};
use cloudboard_config::Settings;
use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;

const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Tracker timing and concurrency settings
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// Random spread applied to each poll wait (0.2 = ±20%)
    pub jitter_ratio: f64,
    pub max_in_flight: usize,
    pub retry: RetryConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1800),
            poll_interval: Duration::from_secs(10),
            jitter_ratio: 0.2,
            max_in_flight: 4,
            retry: RetryConfig::default(),
        }
    }
}

impl From<&Settings> for TrackerConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            timeout: Duration::from_secs(settings.tracker.timeout_secs),
            poll_interval: Duration::from_millis(settings.tracker.poll_interval_ms),
            jitter_ratio: settings.tracker.jitter_ratio,
            max_in_flight: settings.tracker.max_in_flight.max(1),
            retry: RetryConfig::from(&settings.retry),
        }
    }
}

/// Slot held while an operation is in flight; released on drop
#[derive(Debug)]
pub struct InFlightGuard {
    _permit: OwnedSemaphorePermit,
    counter: Arc<AtomicUsize>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Submits and polls control plane operations
#[derive(Clone)]
pub struct OperationTracker {
    remote: Arc<dyn RemoteOperations>,
    config: TrackerConfig,
    permits: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
}

impl OperationTracker {
    pub fn new(remote: Arc<dyn RemoteOperations>, config: TrackerConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_in_flight.max(1)));
        Self {
            remote,
            config,
            permits,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Operations currently holding an in-flight slot
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Wait for an in-flight slot
    pub async fn acquire(&self) -> Result<InFlightGuard> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| CloudError::TrackerClosed)?;
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        Ok(InFlightGuard {
            _permit: permit,
            counter: self.in_flight.clone(),
        })
    }

    /// Submit a change; fails fast when the control plane refuses it
    pub async fn submit(&self, request: &SubmitRequest) -> Result<AsyncOperation> {
        let feature = request.change.feature_name();
        let kind = request.change.kind();

        let id = self.remote.submit(request).await.map_err(|e| match e {
            RemoteError::Rejected(reason) => CloudError::SubmissionRejected { feature, reason },
            other => CloudError::SubmissionFailed {
                feature,
                source: other,
            },
        })?;

        tracing::info!("Submitted {} of {} as operation {}", kind, feature, id);
        Ok(AsyncOperation::new(id, kind, feature))
    }

    /// [`await_operation`](Self::await_operation) with the configured timeout
    /// and poll interval
    pub async fn await_default(
        &self,
        op: AsyncOperation,
        cancel: &CancellationToken,
    ) -> Result<AsyncOperation> {
        self.await_operation(op, self.config.timeout, self.config.poll_interval, cancel)
            .await
    }

    /// Poll `op` until it is terminal, `timeout` elapses, or `cancel` fires.
    ///
    /// On timeout the operation comes back as `TimedOut`. On cancellation it
    /// comes back with its last known, non-terminal status.
    pub async fn await_operation(
        &self,
        mut op: AsyncOperation,
        timeout: Duration,
        poll_interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<AsyncOperation> {
        let started = Instant::now();
        // Far enough out to never fire when `timeout` overflows the clock
        let deadline = started
            .checked_add(timeout)
            .unwrap_or_else(|| started + FAR_FUTURE);

        loop {
            let Some(status) = self.query_with_retry(&op.id, cancel).await? else {
                tracing::debug!("Stopped tracking {} on cancellation ({})", op.id, op.status);
                return Ok(op);
            };
            op.observe(status);

            if op.status.is_terminal() {
                tracing::debug!("Operation {} finished: {}", op.id, op.status);
                return Ok(op);
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(
                    "Operation {} for {} still {} after {:?}",
                    op.id,
                    op.feature,
                    op.status,
                    timeout
                );
                op.mark_timed_out();
                return Ok(op);
            }

            let wait = self.jittered(poll_interval).min(deadline - now);
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Stopped tracking {} on cancellation ({})", op.id, op.status);
                    return Ok(op);
                }
                _ = sleep(wait) => {}
            }
        }
    }

    /// Query with bounded exponential backoff on transient failures.
    /// `None` when cancelled.
    async fn query_with_retry(
        &self,
        id: &OperationId,
        cancel: &CancellationToken,
    ) -> Result<Option<RemoteStatus>> {
        let retry = &self.config.retry;
        let max_attempts = retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(None),
                result = self.remote.query(id) => result,
            };

            match result {
                Ok(status) => return Ok(Some(status)),
                Err(RemoteError::NotFound(_)) => {
                    return Err(CloudError::OperationNotFound {
                        operation_id: id.to_string(),
                    });
                }
                Err(e) if e.is_transient() && attempt + 1 < max_attempts => {
                    let delay = retry.delay_for_attempt(attempt);
                    attempt += 1;
                    tracing::warn!(
                        "Status query for {} failed (attempt {}/{}): {}; retrying in {:?}",
                        id,
                        attempt,
                        max_attempts,
                        e,
                        delay
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(None),
                        _ = sleep(delay) => {}
                    }
                }
                Err(e) => {
                    return Err(CloudError::TrackingUnavailable {
                        operation_id: id.to_string(),
                        attempts: attempt + 1,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    fn jittered(&self, interval: Duration) -> Duration {
        let ratio = self.config.jitter_ratio;
        if ratio <= 0.0 {
            return interval;
        }
        let spread = rand::thread_rng().gen_range(-ratio..=ratio);
        interval.mul_f64((1.0 + spread).max(0.0))
    }
}

/// Whether an awaited operation ended without a terminal answer
pub fn is_unresolved(op: &AsyncOperation) -> bool {
    matches!(
        op.status,
        OperationStatus::Pending | OperationStatus::Running | OperationStatus::TimedOut
    )
}
