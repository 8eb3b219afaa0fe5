//! Access-control propagation across CDC replication edges.
//!
//! Connector configs are named `<source>_to_<sink>_<table>[_sink_connector][_v<N>].json`.
//! A table that is access controlled in its source service must also be
//! access controlled in every service it is replicated into.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Error, LoadError, Violation, ViolationKind, Violations};
use crate::registry::store::PolicyRegistry;
use crate::snapshot::store::files_with_extension;

static CONNECTOR_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<source>[a-z0-9]+)_to_(?P<sink>[a-z0-9]+)_(?P<table>.+?)(?:_sink_connector)?(?:_v\d+)?(?:\.json)?$",
    )
    .expect("connector name pattern is valid")
});

/// One replication edge: `table` flows from `source` into `sink`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SinkTable {
    /// Service the table is replicated from.
    pub source: String,
    /// Service the table is replicated into.
    pub sink: String,
    /// Replicated table.
    pub table: String,
}

impl SinkTable {
    /// Parse a connector file name; `None` when it does not follow the naming convention.
    pub fn parse(name: &str) -> Option<Self> {
        let caps = CONNECTOR_NAME.captures(name)?;
        Some(Self {
            source: caps["source"].to_string(),
            sink: caps["sink"].to_string(),
            table: caps["table"].to_string(),
        })
    }
}

/// Somewhere connector names can be listed from.
pub trait ConnectorSource {
    /// Connector names in discovery order.
    fn connector_names(&self) -> Result<Vec<String>, LoadError>;
}

/// Connector configs stored as `*.json` files under a directory tree.
#[derive(Debug, Clone)]
pub struct ConnectorDir {
    root: PathBuf,
}

impl ConnectorDir {
    /// Source over `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ConnectorSource for ConnectorDir {
    fn connector_names(&self) -> Result<Vec<String>, LoadError> {
        Ok(files_with_extension(&self.root, "json")?
            .into_iter()
            .filter_map(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .map(str::to_string)
            })
            .collect())
    }
}

impl ConnectorSource for Vec<String> {
    fn connector_names(&self) -> Result<Vec<String>, LoadError> {
        Ok(self.clone())
    }
}

/// Distinct replication edges in discovery order; unparseable names are skipped.
pub fn sink_tables(source: &dyn ConnectorSource) -> Result<Vec<SinkTable>, LoadError> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for name in source.connector_names()? {
        let Some(edge) = SinkTable::parse(&name) else {
            warn!(connector = %name, "connector name does not follow <source>_to_<sink>_<table>");
            continue;
        };
        if seen.insert(edge.clone()) {
            out.push(edge);
        }
    }
    Ok(out)
}

/// Report every edge whose table is access controlled at the source but not at the sink.
pub fn find_sink_tables_missing_ac(
    edges: &[SinkTable],
    registry: &PolicyRegistry,
) -> Result<(), Violations> {
    let mut violations = Violations::new();
    for edge in edges {
        if !registry.is_registered(&edge.source, &edge.table) {
            continue;
        }
        if registry.is_registered(&edge.sink, &edge.table) {
            debug!(source = %edge.source, sink = %edge.sink, table = %edge.table, "sink table is access controlled");
            continue;
        }
        violations.push(Violation::new(
            ViolationKind::SinkTableMissingAc,
            &edge.table,
            &edge.sink,
            format!(
                "table {} synced from {} to {} is missing access control in service {}",
                edge.table, edge.source, edge.sink, edge.sink
            ),
        ));
    }
    violations.into_result()
}

/// Cross-check every edge listed by `source`.
pub fn detect_sink_tables_missing_ac(
    source: &dyn ConnectorSource,
    registry: &PolicyRegistry,
) -> Result<(), Error> {
    let edges = sink_tables(source)?;
    find_sink_tables_missing_ac(&edges, registry)?;
    Ok(())
}

/// Cross-check every connector config under `connector_dir`.
pub fn verify_ac_for_all_sink_tables(
    connector_dir: &Path,
    registry: &PolicyRegistry,
) -> Result<(), Error> {
    detect_sink_tables_missing_ac(&ConnectorDir::new(connector_dir), registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_connector_names_with_optional_suffixes() {
        let plain = SinkTable::parse("bob_to_tom_users.json").expect("plain name should parse");
        assert_eq!(
            plain,
            SinkTable {
                source: "bob".to_string(),
                sink: "tom".to_string(),
                table: "users".to_string(),
            }
        );

        let suffixed = SinkTable::parse("bob_to_fatima_student_packages_sink_connector_v2.json")
            .expect("suffixed name should parse");
        assert_eq!(suffixed.sink, "fatima");
        assert_eq!(suffixed.table, "student_packages");

        let versioned = SinkTable::parse("mastermgmt_to_bob_locations_v3").expect("versioned name");
        assert_eq!(versioned.table, "locations");

        assert!(SinkTable::parse("README.json").is_none());
        assert!(SinkTable::parse("bob_users.json").is_none());
    }

    #[test]
    fn duplicate_edges_are_reported_once() {
        let names = vec![
            "bob_to_tom_users.json".to_string(),
            "not-a-connector.json".to_string(),
            "bob_to_tom_users_v2.json".to_string(),
            "bob_to_eureka_users.json".to_string(),
        ];
        let edges = sink_tables(&names).expect("in-memory source cannot fail");
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].sink, "tom");
        assert_eq!(edges[1].sink, "eureka");
    }

    #[test]
    fn only_source_controlled_tables_must_propagate() {
        let registry = PolicyRegistry::from_json(
            r#"[
                {"service": "bob", "table_name": "users", "stages": []},
                {"service": "eureka", "table_name": "users", "stages": []}
            ]"#,
        )
        .expect("registry should decode");
        let names = vec![
            "bob_to_tom_users.json".to_string(),
            "bob_to_eureka_users.json".to_string(),
            "bob_to_tom_courses.json".to_string(),
        ];

        let err = detect_sink_tables_missing_ac(&names, &registry).expect_err("tom lacks AC");
        assert_eq!(
            err.to_string(),
            "table users synced from bob to tom is missing access control in service tom"
        );
        assert_eq!(err.violations()[0].kind, ViolationKind::SinkTableMissingAc);
    }
}
