mod support;

use rlsguard::error::LoadError;
use rlsguard::verify::audit::{Auditor, Check};
use rlsguard::VerifierConfig;

use support::{fixture_path, unique_dir};

fn fixture_config() -> VerifierConfig {
    VerifierConfig::load(&fixture_path("config.yaml")).expect("fixture config should load")
}

#[test]
fn every_check_runs_and_only_sink_fails() {
    let config = fixture_config();
    assert_eq!(config.available_checks(), Check::ALL.to_vec());

    let report = Auditor::new(config)
        .run(&Check::ALL)
        .expect("fixture inputs should load");

    let failed: Vec<Check> = report
        .checks
        .iter()
        .filter(|outcome| !outcome.passed())
        .map(|outcome| outcome.check)
        .collect();
    assert_eq!(failed, vec![Check::Sink]);
    assert_eq!(report.violation_count(), 2);
    assert!(!report.passed());
}

#[test]
fn outcomes_follow_requested_order() {
    let report = Auditor::new(fixture_config())
        .run(&[Check::Entity, Check::Postgres])
        .expect("fixture inputs should load");

    let order: Vec<Check> = report.checks.iter().map(|o| o.check).collect();
    assert_eq!(order, vec![Check::Entity, Check::Postgres]);
    assert!(report.passed());
}

#[test]
fn registered_table_without_snapshot_aborts_the_run() {
    let snapshots = unique_dir("rlsguard_empty_snapshots");
    std::fs::create_dir_all(snapshots.join("mastermgmt")).expect("should create temp dir");
    let mut config = fixture_config();
    config.snapshot_dir = snapshots;

    let err = Auditor::new(config)
        .run(&[Check::Postgres])
        .expect_err("registered tables have no snapshots");
    assert!(matches!(err, LoadError::MissingSnapshot { .. }));
}

#[test]
fn unconfigured_check_is_rejected_before_loading() {
    let config = VerifierConfig {
        stage_file: fixture_path("missing_stage.json"),
        ..VerifierConfig::default()
    };

    let err = Auditor::new(config)
        .run(&[Check::Drift])
        .expect_err("drift needs a connector dir");
    assert!(matches!(err, LoadError::Config(_)));
    assert_eq!(
        err.to_string(),
        "invalid configuration: check drift requires connector_dir to be set"
    );
}
