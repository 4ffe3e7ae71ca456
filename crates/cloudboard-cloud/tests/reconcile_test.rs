use cloudboard_cloud::testing::{FakeRemote, Script};
use cloudboard_cloud::{
    AsyncOperation, CancellationToken, CloudError, MemoryLedger, OperationId, OperationLedger,
    OutcomeStatus, OverallStatus, PendingEntry, ReasonCode, Reconciler, RetryConfig,
    TrackerConfig,
};
use cloudboard_config::{Settings, TrackerSettings};
use cloudboard_core::{
    ArtifactBinding, ArtifactKind, ArtifactRequirement, ChangeKind, CloudAccount, CloudVendor,
    Feature, FeatureChange, FeatureName, NamePattern, PermissionCatalog,
};
use std::sync::Arc;
use std::time::Duration;

const ACCOUNT: &str = "aws:123456789012";

fn config() -> TrackerConfig {
    TrackerConfig {
        timeout: Duration::from_secs(30),
        poll_interval: Duration::from_secs(5),
        jitter_ratio: 0.0,
        max_in_flight: 2,
        retry: RetryConfig::default(),
    }
}

fn reconciler(remote: &Arc<FakeRemote>) -> Reconciler {
    Reconciler::new(Arc::new(PermissionCatalog::builtin()), remote.clone(), config())
}

fn aws_account() -> CloudAccount {
    CloudAccount::new(CloudVendor::Aws, "123456789012").with_name("prod")
}

fn feature(name: FeatureName) -> Feature {
    Feature::new(name).with_groups(["BASIC"]).with_regions(["us-east-1"])
}

fn crossaccount_requirement() -> ArtifactRequirement {
    ArtifactRequirement::new("CROSSACCOUNT", ArtifactKind::Role)
        .with_pattern(NamePattern::Prefix("cb-".into()))
}

fn crossaccount_binding() -> ArtifactBinding {
    ArtifactBinding::new(
        "CROSSACCOUNT",
        ArtifactKind::Role,
        "arn:aws:iam::123456789012:role/cb-crossaccount",
    )
}

#[tokio::test(start_paused = true)]
async fn test_enable_end_to_end() {
    let remote = Arc::new(
        FakeRemote::new()
            .script(FeatureName::CloudNativeProtection, Script::succeed_after(2))
            .requirements(
                FeatureName::CloudNativeProtection,
                vec![crossaccount_requirement()],
            ),
    );
    let bindings = vec![
        crossaccount_binding(),
        ArtifactBinding::new(
            "EXOCOMPUTE_EKS_MASTERNODE",
            ArtifactKind::Role,
            "arn:aws:iam::123456789012:role/cb-master",
        ),
    ];

    let result = reconciler(&remote)
        .reconcile(
            &aws_account(),
            &[feature(FeatureName::CloudNativeProtection)],
            &bindings,
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(result.overall_status, OverallStatus::Succeeded);
    assert_eq!(result.account_id, ACCOUNT);
    let outcome = result.outcome(FeatureName::CloudNativeProtection).unwrap();
    assert_eq!(outcome.status, OutcomeStatus::Succeeded);
    assert_eq!(outcome.change, Some(ChangeKind::Enable));
    assert!(outcome.operation_id.is_some());

    assert!(result.artifacts.missing.is_empty());
    assert_eq!(result.artifacts.extra.len(), 1);
    assert_eq!(
        result.artifacts.extra[0].role_key.as_str(),
        "EXOCOMPUTE_EKS_MASTERNODE"
    );
    assert_eq!(remote.submissions_for(FeatureName::CloudNativeProtection), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_submission_is_partial_failure() {
    let remote = Arc::new(FakeRemote::new().script(
        FeatureName::Exocompute,
        Script::Reject("region not supported".into()),
    ));

    let result = reconciler(&remote)
        .reconcile(
            &aws_account(),
            &[
                feature(FeatureName::CloudNativeProtection),
                feature(FeatureName::Exocompute),
            ],
            &[],
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(result.overall_status, OverallStatus::PartialFailure);
    assert_eq!(
        result.outcome(FeatureName::CloudNativeProtection).unwrap().status,
        OutcomeStatus::Succeeded
    );
    let exo = result.outcome(FeatureName::Exocompute).unwrap();
    assert_eq!(exo.status, OutcomeStatus::Failed);
    let reason = exo.reason.as_ref().unwrap();
    assert_eq!(reason.code, ReasonCode::SubmissionRejected);
    assert!(reason.message.contains("region not supported"));
}

#[tokio::test(start_paused = true)]
async fn test_failed_operation_reports_detail() {
    let remote = Arc::new(FakeRemote::new().script(
        FeatureName::Exocompute,
        Script::fail_after(2, "cluster quota exceeded"),
    ));

    let result = reconciler(&remote)
        .reconcile(
            &aws_account(),
            &[feature(FeatureName::Exocompute)],
            &[],
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(result.overall_status, OverallStatus::Failed);
    let reason = result.features[0].reason.as_ref().unwrap();
    assert_eq!(reason.code, ReasonCode::OperationFailed);
    assert_eq!(reason.message, "cluster quota exceeded");
}

#[tokio::test(start_paused = true)]
async fn test_pending_operation_times_out() {
    let remote = Arc::new(FakeRemote::new().script(FeatureName::DataScanning, Script::Hang));
    let ledger = Arc::new(MemoryLedger::new());
    let reconciler = reconciler(&remote).with_ledger(ledger.clone());

    let start = tokio::time::Instant::now();
    let result = reconciler
        .reconcile(
            &aws_account(),
            &[feature(FeatureName::DataScanning)],
            &[],
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(start.elapsed(), Duration::from_secs(30));
    assert_eq!(result.overall_status, OverallStatus::Failed);
    let outcome = &result.features[0];
    assert_eq!(outcome.status, OutcomeStatus::TimedOut);
    assert_eq!(outcome.reason.as_ref().unwrap().code, ReasonCode::TimedOut);

    // kept for the next pass
    assert!(
        ledger
            .pending(ACCOUNT, FeatureName::DataScanning)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test(start_paused = true)]
async fn test_rerun_requeries_instead_of_resubmitting() {
    let remote = Arc::new(FakeRemote::new().script(FeatureName::DataScanning, Script::Hang));
    let reconciler = reconciler(&remote);
    let desired = [feature(FeatureName::DataScanning)];
    let cancel = CancellationToken::new();

    let first = reconciler.reconcile(&aws_account(), &desired, &[], &cancel).await;
    let second = reconciler.reconcile(&aws_account(), &desired, &[], &cancel).await;

    assert_eq!(first.features[0].status, OutcomeStatus::TimedOut);
    assert_eq!(second.features[0].status, OutcomeStatus::TimedOut);
    assert_eq!(first.features[0].operation_id, second.features[0].operation_id);
    assert_eq!(remote.submissions_for(FeatureName::DataScanning), 1);
}

#[tokio::test(start_paused = true)]
async fn test_resumes_recorded_operation() {
    let remote = Arc::new(FakeRemote::new());
    let desired = feature(FeatureName::CloudNativeArchival);
    let id = OperationId::new("op-previous");
    remote.seed_operation(&id, FeatureName::CloudNativeArchival, Script::succeed_after(1));

    let ledger = Arc::new(MemoryLedger::new());
    ledger
        .record(
            ACCOUNT,
            PendingEntry::new(
                FeatureChange::Enable {
                    feature: desired.clone(),
                },
                AsyncOperation::new(id.clone(), ChangeKind::Enable, FeatureName::CloudNativeArchival),
            ),
        )
        .await
        .unwrap();

    let result = reconciler(&remote)
        .with_ledger(ledger.clone())
        .reconcile(&aws_account(), &[desired], &[], &CancellationToken::new())
        .await;

    assert!(result.is_success());
    assert_eq!(result.features[0].operation_id, Some(id));
    assert_eq!(remote.submissions_for(FeatureName::CloudNativeArchival), 0);
    assert!(ledger.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_forgotten_operation_is_submitted_again() {
    // The control plane never issued this id
    let remote = Arc::new(FakeRemote::new());
    let desired = feature(FeatureName::CloudNativeArchival);
    let ledger = Arc::new(MemoryLedger::new());
    ledger
        .record(
            ACCOUNT,
            PendingEntry::new(
                FeatureChange::Enable {
                    feature: desired.clone(),
                },
                AsyncOperation::new(
                    OperationId::new("op-gone"),
                    ChangeKind::Enable,
                    FeatureName::CloudNativeArchival,
                ),
            ),
        )
        .await
        .unwrap();

    let result = reconciler(&remote)
        .with_ledger(ledger.clone())
        .reconcile(&aws_account(), &[desired], &[], &CancellationToken::new())
        .await;

    assert!(result.is_success());
    assert_eq!(remote.submissions_for(FeatureName::CloudNativeArchival), 1);
    let id = result.features[0].operation_id.clone().unwrap();
    assert_ne!(id, OperationId::new("op-gone"));
    assert!(ledger.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_tracking_unavailable_fails_the_feature() {
    let remote = Arc::new(FakeRemote::new().script(
        FeatureName::DataScanning,
        Script::Flaky {
            failures: 10,
            then: Box::new(Script::succeed_after(1)),
        },
    ));
    let ledger = Arc::new(MemoryLedger::new());
    let desired = [
        feature(FeatureName::CloudNativeProtection),
        feature(FeatureName::DataScanning),
    ];

    let result = reconciler(&remote)
        .with_ledger(ledger.clone())
        .reconcile(&aws_account(), &desired, &[], &CancellationToken::new())
        .await;

    assert_eq!(result.overall_status, OverallStatus::PartialFailure);
    let scanning = result.outcome(FeatureName::DataScanning).unwrap();
    assert_eq!(scanning.status, OutcomeStatus::Failed);
    assert_eq!(
        scanning.reason.as_ref().unwrap().code,
        ReasonCode::TrackingUnavailable
    );
    assert!(scanning.operation_id.is_some());
    // kept so the next pass re-queries the same operation
    assert_eq!(ledger.len(), 1);
    assert_eq!(remote.submissions_for(FeatureName::DataScanning), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stale_ledger_entry_is_not_resumed() {
    let remote = Arc::new(FakeRemote::new());
    let ledger = Arc::new(MemoryLedger::new());
    let old = feature(FeatureName::CloudNativeArchival);
    ledger
        .record(
            ACCOUNT,
            PendingEntry::new(
                FeatureChange::Enable { feature: old },
                AsyncOperation::new(
                    OperationId::new("op-stale"),
                    ChangeKind::Enable,
                    FeatureName::CloudNativeArchival,
                ),
            ),
        )
        .await
        .unwrap();

    let desired = Feature::new(FeatureName::CloudNativeArchival)
        .with_groups(["BASIC"])
        .with_regions(["eu-west-1"]);
    let result = reconciler(&remote)
        .with_ledger(ledger)
        .reconcile(&aws_account(), &[desired], &[], &CancellationToken::new())
        .await;

    assert!(result.is_success());
    assert_eq!(remote.submissions_for(FeatureName::CloudNativeArchival), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rerun_with_desired_state_is_noop() {
    let remote = Arc::new(FakeRemote::new());
    let current = vec![
        feature(FeatureName::CloudNativeProtection),
        feature(FeatureName::Exocompute),
    ];
    let account = aws_account().with_features(current.clone());

    let result = reconciler(&remote)
        .reconcile(&account, &current, &[], &CancellationToken::new())
        .await;

    assert_eq!(result.overall_status, OverallStatus::Succeeded);
    assert!(result.features.is_empty());
    assert!(result.change_set.is_empty());
    assert!(remote.submissions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_implicit_baseline_matches_recorded_groups() {
    let remote = Arc::new(FakeRemote::new());
    let account = aws_account().with_features(vec![feature(FeatureName::CloudNativeProtection)]);
    let desired = [Feature::new(FeatureName::CloudNativeProtection).with_regions(["us-east-1"])];

    for _ in 0..2 {
        let result = reconciler(&remote)
            .reconcile(&account, &desired, &[], &CancellationToken::new())
            .await;
        assert_eq!(result.overall_status, OverallStatus::Succeeded);
        assert!(result.change_set.is_empty());
    }
    assert!(remote.submissions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_validation_failure_submits_nothing() {
    let remote = Arc::new(FakeRemote::new());
    let desired = [
        feature(FeatureName::CloudNativeProtection),
        // baseline group missing
        Feature::new(FeatureName::Exocompute).with_groups(["PRIVATE_ENDPOINTS"]),
    ];

    let result = reconciler(&remote)
        .reconcile(&aws_account(), &desired, &[], &CancellationToken::new())
        .await;

    assert_eq!(result.overall_status, OverallStatus::Failed);
    assert!(result.error.as_deref().unwrap().contains("BASIC"));
    assert_eq!(result.features.len(), 2);
    for outcome in &result.features {
        assert_eq!(outcome.status, OutcomeStatus::Skipped);
        assert_eq!(outcome.reason.as_ref().unwrap().code, ReasonCode::ValidationFailed);
    }
    assert!(remote.submissions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unknown_group_fails_validation() {
    let remote = Arc::new(FakeRemote::new());
    let desired = [Feature::new(FeatureName::CloudNativeProtection).with_groups(["BASIC", "NOPE"])];

    let result = reconciler(&remote)
        .reconcile(&aws_account(), &desired, &[], &CancellationToken::new())
        .await;

    assert_eq!(result.overall_status, OverallStatus::Failed);
    assert!(result.error.as_deref().unwrap().contains("NOPE"));
    assert!(remote.submissions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_missing_artifacts_fail_the_feature() {
    let remote = Arc::new(FakeRemote::new().requirements(
        FeatureName::CloudNativeProtection,
        vec![crossaccount_requirement()],
    ));
    let bindings = vec![ArtifactBinding::new(
        "CROSSACCOUNT",
        ArtifactKind::Role,
        "arn:aws:iam::123456789012:role/other-role",
    )];

    let result = reconciler(&remote)
        .reconcile(
            &aws_account(),
            &[feature(FeatureName::CloudNativeProtection)],
            &bindings,
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(result.overall_status, OverallStatus::Failed);
    let outcome = &result.features[0];
    assert_eq!(outcome.status, OutcomeStatus::Failed);
    let reason = outcome.reason.as_ref().unwrap();
    assert_eq!(reason.code, ReasonCode::ArtifactsMissing);
    assert!(reason.message.contains("CROSSACCOUNT"));
    assert_eq!(result.artifacts.missing, vec![crossaccount_requirement()]);
    // the role key is required, so the mismatching binding is not an extra
    assert!(result.artifacts.extra.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_shared_role_key_reported_missing_once() {
    let remote = Arc::new(
        FakeRemote::new()
            .requirements(
                FeatureName::CloudNativeProtection,
                vec![crossaccount_requirement()],
            )
            .requirements(FeatureName::Exocompute, vec![crossaccount_requirement()]),
    );
    let desired = [
        feature(FeatureName::CloudNativeProtection),
        feature(FeatureName::Exocompute),
    ];

    let result = reconciler(&remote)
        .reconcile(&aws_account(), &desired, &[], &CancellationToken::new())
        .await;

    assert_eq!(result.overall_status, OverallStatus::Failed);
    for outcome in &result.features {
        assert_eq!(outcome.reason.as_ref().unwrap().code, ReasonCode::ArtifactsMissing);
    }
    assert_eq!(result.artifacts.missing, vec![crossaccount_requirement()]);
}

#[tokio::test(start_paused = true)]
async fn test_archival_encryption_needs_no_artifacts() {
    let remote = Arc::new(FakeRemote::new().requirements(
        FeatureName::CloudNativeArchivalEncryption,
        vec![crossaccount_requirement()],
    ));

    let result = reconciler(&remote)
        .reconcile(
            &aws_account(),
            &[feature(FeatureName::CloudNativeArchivalEncryption)],
            &[],
            &CancellationToken::new(),
        )
        .await;

    assert!(result.is_success());
    assert!(result.artifacts.missing.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_marks_inflight_unknown_and_rest_skipped() {
    let remote = Arc::new(
        FakeRemote::new().script(FeatureName::CloudNativeProtection, Script::Hang),
    );
    let ledger = Arc::new(MemoryLedger::new());
    let reconciler = reconciler(&remote).with_ledger(ledger.clone());

    let account = aws_account().with_features(vec![feature(FeatureName::DataScanning)]);
    let desired = [
        feature(FeatureName::CloudNativeProtection),
        Feature::new(FeatureName::DataScanning)
            .with_groups(["BASIC"])
            .with_regions(["us-east-1", "us-west-2"]),
    ];

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(7)).await;
        trigger.cancel();
    });

    let result = reconciler.reconcile(&account, &desired, &[], &cancel).await;

    assert_eq!(result.overall_status, OverallStatus::Failed);
    let cnp = result.outcome(FeatureName::CloudNativeProtection).unwrap();
    assert_eq!(cnp.status, OutcomeStatus::Unknown);
    assert_eq!(cnp.reason.as_ref().unwrap().code, ReasonCode::Cancelled);

    let scanning = result.outcome(FeatureName::DataScanning).unwrap();
    assert_eq!(scanning.change, Some(ChangeKind::Update));
    assert_eq!(scanning.status, OutcomeStatus::Skipped);
    assert_eq!(scanning.reason.as_ref().unwrap().code, ReasonCode::Cancelled);

    assert_eq!(remote.submissions().len(), 1);
    assert!(
        ledger
            .pending(ACCOUNT, FeatureName::CloudNativeProtection)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_limit_is_respected() {
    let names = [
        FeatureName::CloudNativeProtection,
        FeatureName::Exocompute,
        FeatureName::CloudNativeArchival,
        FeatureName::DataScanning,
        FeatureName::KubernetesProtection,
    ];
    let remote = Arc::new(
        names
            .iter()
            .fold(FakeRemote::new(), |r, n| r.script(*n, Script::succeed_after(3))),
    );
    let reconciler = reconciler(&remote);
    let desired: Vec<Feature> = names.iter().map(|n| feature(*n)).collect();

    let result = reconciler
        .reconcile(&aws_account(), &desired, &[], &CancellationToken::new())
        .await;

    assert!(result.is_success());
    assert_eq!(result.features.len(), names.len());
    assert_eq!(remote.peak_active(), 2);
    assert_eq!(reconciler.tracker().in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_disables_complete_before_enables() {
    let remote = Arc::new(
        FakeRemote::new()
            .script(FeatureName::Exocompute, Script::succeed_after(3))
            .script(FeatureName::CloudNativeProtection, Script::succeed_after(1)),
    );
    let account = aws_account().with_features(vec![feature(FeatureName::Exocompute)]);

    let result = reconciler(&remote)
        .reconcile(
            &account,
            &[feature(FeatureName::CloudNativeProtection)],
            &[],
            &CancellationToken::new(),
        )
        .await;

    assert!(result.is_success());
    let submissions = remote.submissions();
    assert_eq!(submissions.len(), 2);
    assert_eq!(submissions[0].change.kind(), ChangeKind::Disable);
    assert_eq!(submissions[1].change.kind(), ChangeKind::Enable);
    // the disable had finished polling before the enable went out
    assert_eq!(remote.polls(FeatureName::Exocompute), 3);
    assert_eq!(result.features[0].change, Some(ChangeKind::Disable));
}

#[tokio::test(start_paused = true)]
async fn test_report_json() {
    let remote = Arc::new(FakeRemote::new().script(
        FeatureName::Exocompute,
        Script::Reject("quota".into()),
    ));

    let result = reconciler(&remote)
        .reconcile(
            &aws_account(),
            &[
                feature(FeatureName::CloudNativeProtection),
                feature(FeatureName::Exocompute),
            ],
            &[],
            &CancellationToken::new(),
        )
        .await;

    let json: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
    assert_eq!(json["account_id"], ACCOUNT);
    assert_eq!(json["overall_status"], "partial_failure");
    let features = json["features"].as_array().unwrap();
    assert_eq!(features.len(), 2);
    assert!(features.iter().any(|f| f["name"] == "EXOCOMPUTE"
        && f["status"] == "failed"
        && f["reason"]["code"] == "SUBMISSION_REJECTED"));
}

#[tokio::test(start_paused = true)]
async fn test_from_settings_persists_ledger() {
    let temp_dir = tempfile::tempdir().unwrap();
    let settings = Settings {
        tracker: TrackerSettings {
            timeout_secs: 20,
            poll_interval_ms: 5000,
            jitter_ratio: 0.0,
            max_in_flight: 1,
        },
        ledger_dir: Some(temp_dir.path().join(".cloudboard")),
        ..Settings::default()
    };
    let remote = Arc::new(FakeRemote::new().script(FeatureName::DataScanning, Script::Hang));

    let reconciler = Reconciler::from_settings(&settings, remote.clone()).unwrap();
    let result = reconciler
        .reconcile(
            &aws_account(),
            &[feature(FeatureName::DataScanning)],
            &[],
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(result.features[0].status, OutcomeStatus::TimedOut);
    assert!(
        temp_dir
            .path()
            .join(".cloudboard")
            .join("operations.json")
            .exists()
    );
}

#[test]
fn test_from_settings_rejects_invalid_settings() {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut settings = Settings {
        ledger_dir: Some(temp_dir.path().to_path_buf()),
        ..Settings::default()
    };
    settings.tracker.timeout_secs = u64::MAX;
    assert!(matches!(
        Reconciler::from_settings(&settings, Arc::new(FakeRemote::new())),
        Err(CloudError::Config(_))
    ));

    settings.tracker.timeout_secs = 60;
    settings.retry.multiplier = -1.0;
    assert!(matches!(
        Reconciler::from_settings(&settings, Arc::new(FakeRemote::new())),
        Err(CloudError::Config(_))
    ));
}
