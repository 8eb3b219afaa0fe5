//! Drivers that run each verifier over every service and table.
//!
//! Violations accumulate across tables; a load failure stops the driver since
//! nothing after it could be trusted.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::VerifierConfig;
use crate::error::{Error, LoadError, Violation, Violations};
use crate::hasura::metadata::HasuraMetadataLocator;
use crate::registry::lint::lint_registry;
use crate::registry::store::PolicyRegistry;
use crate::snapshot::ignore::IgnoreTables;
use crate::snapshot::store::SnapshotStore;
use crate::verify::drift::{compare_schema, SyncTable};
use crate::verify::entity::{load_entities, SchemaVerifier};
use crate::verify::hasura::verify_table_hasura_ac;
use crate::verify::legacy::verify_rls;
use crate::verify::postgres::verify_postgres_rls;
use crate::verify::sink::{sink_tables, verify_ac_for_all_sink_tables, ConnectorDir, ConnectorSource};

/// Check every registered table's live policies against the registry.
pub fn verify_postgres_ac(store: &SnapshotStore, registry: &PolicyRegistry) -> Result<(), Error> {
    let mut violations = Violations::new();
    for service in store.services()? {
        for table in registry.tables(&service) {
            let Some(stage) = registry.get(&service, table) else {
                continue;
            };
            let schema = store.load(&service, table)?;
            debug!(service = %service, table = %table, "verifying postgres access control");
            violations.record(verify_postgres_rls(&service, &schema, stage));
        }
    }
    violations.into_result()?;
    Ok(())
}

/// Check every registered table's Hasura permissions against the registry.
///
/// Services without Hasura metadata are skipped, as are tables missing on
/// either side.
pub fn verify_hasura_ac(
    locator: &HasuraMetadataLocator,
    registry: &PolicyRegistry,
) -> Result<(), Error> {
    let mut violations = Violations::new();
    for service in registry.services() {
        let metadata = match locator.load(service) {
            Ok(metadata) => metadata,
            Err(err) if err.is_not_found() => {
                info!(service = %service, "no hasura metadata, skipping service");
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        for table in registry.tables(service) {
            let (Some(stage), Some(tracked)) = (registry.get(service, table), metadata.get(table))
            else {
                continue;
            };
            debug!(service = %service, table = %table, "verifying hasura access control");
            violations.record_all(verify_table_hasura_ac(stage, tracked));
        }
    }
    violations.into_result()?;
    Ok(())
}

/// Check every snapshotted table against the simple multi-tenant convention.
pub fn verify_rls_all(
    store: &SnapshotStore,
    ignore: &IgnoreTables,
    bypass_accounts: &[String],
    registry: &PolicyRegistry,
) -> Result<(), Error> {
    let ac_tables = registry.ac_tables();
    let mut violations = Violations::new();
    for service in store.services()? {
        for path in store.table_files(&service)? {
            let schema = store.load_file(&path)?;
            violations.record(verify_rls(
                &service,
                &schema,
                ignore,
                bypass_accounts,
                &ac_tables,
            ));
        }
    }
    violations.into_result()?;
    Ok(())
}

/// Compare every replicated table with its source; returns the tables in sync.
///
/// Edges whose source or sink snapshot is missing are skipped.
pub fn verify_sink_drift(
    source: &dyn ConnectorSource,
    store: &SnapshotStore,
) -> Result<Vec<SyncTable>, Error> {
    let mut violations = Violations::new();
    let mut synced = Vec::new();
    for edge in sink_tables(source)? {
        let sink_schema = store.try_load(&edge.sink, &edge.table)?;
        let source_schema = store.try_load(&edge.source, &edge.table)?;
        let (Some(sink_schema), Some(source_schema)) = (sink_schema, source_schema) else {
            warn!(
                source = %edge.source,
                sink = %edge.sink,
                table = %edge.table,
                "snapshot missing for replicated table, skipping drift check"
            );
            continue;
        };
        match compare_schema(&sink_schema, &source_schema, &edge.sink, &edge.source) {
            Ok(table) => synced.push(table),
            Err(violation) => violations.push(violation),
        }
    }
    violations.into_result()?;
    Ok(synced)
}

/// Check every entity descriptor under `entity_dir` against its table snapshot.
pub fn verify_entities(
    entity_dir: &Path,
    store: &SnapshotStore,
    verifier: &SchemaVerifier,
) -> Result<(), Error> {
    let mut violations = Violations::new();
    for (service, entity) in load_entities(entity_dir)? {
        let schema = store.load(&service, &entity.table)?;
        violations.record(verifier.verify_entity(&service, &schema, &entity));
    }
    violations.into_result()?;
    Ok(())
}

/// One selectable check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Check {
    /// Registry-driven Postgres policy verification.
    Postgres,
    /// Registry-driven Hasura permission verification.
    Hasura,
    /// Simple multi-tenant RLS convention.
    Rls,
    /// Access-control propagation to CDC sinks.
    Sink,
    /// Schema drift between CDC sources and sinks.
    Drift,
    /// Entity mappings against snapshots.
    Entity,
    /// Registry predicate syntax.
    Lint,
}

impl Check {
    /// Every check, in run order.
    pub const ALL: [Check; 7] = [
        Check::Postgres,
        Check::Hasura,
        Check::Rls,
        Check::Sink,
        Check::Drift,
        Check::Entity,
        Check::Lint,
    ];

    /// Lowercase name used on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            Check::Postgres => "postgres",
            Check::Hasura => "hasura",
            Check::Rls => "rls",
            Check::Sink => "sink",
            Check::Drift => "drift",
            Check::Entity => "entity",
            Check::Lint => "lint",
        }
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Check {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Check::ALL
            .into_iter()
            .find(|check| check.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                format!("Invalid check: {s}. Expected one of postgres, hasura, rls, sink, drift, entity, lint")
            })
    }
}

/// Result of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckOutcome {
    /// Check that ran.
    pub check: Check,
    /// Violations it found; empty when it passed.
    pub violations: Violations,
}

impl CheckOutcome {
    /// True when no violation was found.
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Outcomes of an audit run, in run order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    /// Per-check outcomes.
    pub checks: Vec<CheckOutcome>,
}

impl AuditReport {
    /// True when every check passed.
    pub fn passed(&self) -> bool {
        self.checks.iter().all(CheckOutcome::passed)
    }

    /// Total number of violations.
    pub fn violation_count(&self) -> usize {
        self.checks.iter().map(|c| c.violations.len()).sum()
    }

    /// Every violation across checks, in run order.
    pub fn violations(&self) -> impl Iterator<Item = &Violation> {
        self.checks.iter().flat_map(|c| c.violations.iter())
    }
}

/// Runs a set of checks over the inputs named by a [`VerifierConfig`].
#[derive(Debug, Clone)]
pub struct Auditor {
    config: VerifierConfig,
}

impl Auditor {
    /// Auditor over `config`.
    pub fn new(config: VerifierConfig) -> Self {
        Self { config }
    }

    /// Configuration in use.
    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Run `checks` in the given order.
    ///
    /// Violations are collected per check; the first load failure aborts the run.
    pub fn run(&self, checks: &[Check]) -> Result<AuditReport, LoadError> {
        self.config.validate(checks)?;
        let registry = PolicyRegistry::load(&self.config.stage_file)?;
        let store = SnapshotStore::new(&self.config.snapshot_dir);

        let mut report = AuditReport::default();
        for &check in checks {
            info!(check = %check, "running check");
            let violations = match self.run_check(check, &registry, &store) {
                Ok(()) => Violations::new(),
                Err(Error::Violations(violations)) => violations,
                Err(Error::Load(err)) => return Err(err),
            };
            report.checks.push(CheckOutcome { check, violations });
        }
        Ok(report)
    }

    fn run_check(
        &self,
        check: Check,
        registry: &PolicyRegistry,
        store: &SnapshotStore,
    ) -> Result<(), Error> {
        let config = &self.config;
        match check {
            Check::Postgres => verify_postgres_ac(store, registry),
            Check::Hasura => {
                let root = required(config.hasura_root.as_deref(), "hasura_root")?;
                let locator = HasuraMetadataLocator::new(root, config.hasura_layout);
                verify_hasura_ac(&locator, registry)
            }
            Check::Rls => {
                let ignore = match &config.ignore_tables_file {
                    Some(path) => IgnoreTables::load(path)?,
                    None => IgnoreTables::new(),
                };
                verify_rls_all(store, &ignore, &config.bypass_rls_accounts, registry)
            }
            Check::Sink => {
                let dir = required(config.connector_dir.as_deref(), "connector_dir")?;
                verify_ac_for_all_sink_tables(dir, registry)
            }
            Check::Drift => {
                let dir = required(config.connector_dir.as_deref(), "connector_dir")?;
                let source = ConnectorDir::new(dir);
                let synced = verify_sink_drift(&source, store)?;
                debug!(tables = synced.len(), "replicated tables in sync");
                Ok(())
            }
            Check::Entity => {
                let dir = required(config.entity_dir.as_deref(), "entity_dir")?;
                let verifier = SchemaVerifier::new(config.ignored_resource_path_services.clone());
                verify_entities(dir, store, &verifier)
            }
            Check::Lint => {
                lint_registry(registry)?;
                Ok(())
            }
        }
    }
}

fn required<'a>(path: Option<&'a Path>, setting: &str) -> Result<&'a Path, LoadError> {
    path.ok_or_else(|| LoadError::Config(format!("{setting} is not set")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checks_parse_case_insensitively() {
        assert_eq!("Postgres".parse::<Check>(), Ok(Check::Postgres));
        assert_eq!("lint".parse::<Check>(), Ok(Check::Lint));
        assert!("metrics".parse::<Check>().is_err());
    }

    #[test]
    fn report_passes_only_without_violations() {
        let mut report = AuditReport::default();
        report.checks.push(CheckOutcome {
            check: Check::Lint,
            violations: Violations::new(),
        });
        assert!(report.passed());
        assert_eq!(report.violation_count(), 0);
    }
}
