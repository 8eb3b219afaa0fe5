mod support;

use rlsguard::output::formatter;
use rlsguard::output::report::build_report;
use rlsguard::verify::audit::{AuditReport, Auditor, Check};
use rlsguard::VerifierConfig;

use support::{fixture_path, unique_dir};

fn fixture_report() -> AuditReport {
    let config =
        VerifierConfig::load(&fixture_path("config.yaml")).expect("fixture config should load");
    Auditor::new(config)
        .run(&[Check::Postgres, Check::Sink])
        .expect("fixture inputs should load")
}

#[test]
fn markdown_report_for_fixture_audit() {
    insta::assert_snapshot!(build_report(&fixture_report()), @r"
    # rlsguard Audit Report

    ## Summary

    | Check | Status | Violations |
    |-------|--------|------------|
    | postgres | PASS | 0 |
    | sink | FAIL | 2 |

    ## Violations

    ### sink

    - **[sink-table-missing-ac]** `bob/ac_test_template_11_4`: table ac_test_template_11_4 synced from mastermgmt to bob is missing access control in service bob
    - **[sink-table-missing-ac]** `tom/ac_hasura_test_template_1`: table ac_hasura_test_template_1 synced from mastermgmt to tom is missing access control in service tom
    ");
}

#[test]
fn written_report_matches_rendered_report() {
    let report = fixture_report();
    let out_dir = unique_dir("rlsguard_formatter");

    formatter::write_output(&out_dir, "audit", &report).expect("artifacts should be written");

    let written = std::fs::read_to_string(out_dir.join("audit_report.md"))
        .expect("report should be readable");
    assert_eq!(
        written,
        build_report(&report),
        "written report should match build_report exactly"
    );

    let dump: Vec<serde_json::Value> = serde_json::from_str(
        &std::fs::read_to_string(out_dir.join("audit_violations.json"))
            .expect("violation dump should be readable"),
    )
    .expect("violation dump should be a JSON array");
    let tables: Vec<&str> = dump
        .iter()
        .filter_map(|v| v["table"].as_str())
        .collect();
    assert_eq!(
        tables,
        vec!["ac_test_template_11_4", "ac_hasura_test_template_1"]
    );
}

#[test]
fn write_output_rejects_traversal_names() {
    let out_dir = unique_dir("rlsguard_formatter_name");
    let err = formatter::write_output(&out_dir, "../escape", &AuditReport::default())
        .expect_err("traversal should be rejected");
    assert!(err.to_string().starts_with("Invalid output name '../escape'"));
}
