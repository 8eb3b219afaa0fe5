#![allow(dead_code)]

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use rlsguard::hasura::metadata::{parse_tables_yaml, HasuraTable};
use rlsguard::registry::stage::FileStage;
use rlsguard::registry::store::PolicyRegistry;
use rlsguard::snapshot::store::SnapshotStore;
use rlsguard::snapshot::table::TableSchema;

pub(crate) const SERVICE: &str = "mastermgmt";
pub(crate) const CUSTOM_TABLE: &str = "ac_test_template_11_4";
pub(crate) const HASURA_TABLE: &str = "ac_hasura_test_template_1";

pub(crate) fn fixture_path(relative: &str) -> PathBuf {
    PathBuf::from("tests/fixtures").join(relative)
}

pub(crate) fn read_fixture(relative: &str) -> String {
    std::fs::read_to_string(fixture_path(relative)).expect("fixture should be readable")
}

pub(crate) fn load_registry() -> PolicyRegistry {
    PolicyRegistry::load(&fixture_path("stage.json")).expect("fixture registry should decode")
}

pub(crate) fn load_stage(table: &str) -> FileStage {
    load_registry()
        .get(SERVICE, table)
        .cloned()
        .expect("fixture registry should contain the table")
}

pub(crate) fn snapshot_store() -> SnapshotStore {
    SnapshotStore::new(fixture_path("snapshots"))
}

pub(crate) fn load_snapshot(service: &str, table: &str) -> TableSchema {
    snapshot_store()
        .load(service, table)
        .expect("fixture snapshot should load")
}

pub(crate) fn load_hasura_table(table: &str) -> HasuraTable {
    let yaml = read_fixture("hasura/mastermgmt/files/hasura/metadata/tables.yaml");
    parse_tables_yaml(&yaml)
        .expect("fixture metadata should decode")
        .into_iter()
        .find(|t| t.table.name == table)
        .expect("fixture metadata should track the table")
}

pub(crate) fn unique_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock should be after epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("{prefix}_{nanos}"))
}
