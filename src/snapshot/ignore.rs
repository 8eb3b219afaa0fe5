use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Deserialize;

use crate::error::LoadError;
use crate::snapshot::store::load_json;

#[derive(Debug, Deserialize)]
struct IgnoreEntry {
    name: String,
    #[serde(default)]
    tables: Vec<String>,
}

/// Tables exempt from RLS checks, keyed by database/service.
///
/// Decoded from `{<group>: [{"name": <db>, "tables": [...]}]}`; group names
/// only organize the file and are merged away.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreTables {
    by_service: BTreeMap<String, BTreeSet<String>>,
}

impl IgnoreTables {
    /// Empty registry: nothing is ignored.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the ignore registry from JSON text.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let groups: BTreeMap<String, Vec<IgnoreEntry>> = serde_json::from_str(json)?;
        Ok(Self::from_groups(groups))
    }

    /// Load the ignore registry from a file.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let groups: BTreeMap<String, Vec<IgnoreEntry>> = load_json(path)?;
        Ok(Self::from_groups(groups))
    }

    fn from_groups(groups: BTreeMap<String, Vec<IgnoreEntry>>) -> Self {
        let mut out = Self::new();
        for entry in groups.into_values().flatten() {
            for table in entry.tables {
                out.insert(&entry.name, &table);
            }
        }
        out
    }

    /// Exempt one table.
    pub fn insert(&mut self, service: &str, table: &str) {
        self.by_service
            .entry(service.to_string())
            .or_default()
            .insert(table.to_string());
    }

    /// True when `table` in `service` is exempt.
    pub fn contains(&self, service: &str, table: &str) -> bool {
        self.by_service
            .get(service)
            .is_some_and(|tables| tables.contains(table))
    }

    /// Number of exempt tables across all services.
    pub fn len(&self) -> usize {
        self.by_service.values().map(BTreeSet::len).sum()
    }

    /// True when nothing is exempt.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
