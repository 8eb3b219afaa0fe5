use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::LoadError;
use crate::registry::stage::FileStage;
use crate::snapshot::store::load_json;

/// The access-control registry (`stage.json`): intended policies per service and table.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    stages: BTreeMap<(String, String), FileStage>,
    services: Vec<String>,
    tables_by_service: BTreeMap<String, Vec<String>>,
}

impl PolicyRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from decoded entries; later duplicates replace earlier ones.
    pub fn from_stages(stages: impl IntoIterator<Item = FileStage>) -> Self {
        let mut registry = Self::new();
        for stage in stages {
            registry.insert(stage);
        }
        registry
    }

    /// Decode the registry from a JSON array of entries.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let stages: Vec<FileStage> = serde_json::from_str(json)?;
        Ok(Self::from_stages(stages))
    }

    /// Load the registry file.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let stages: Vec<FileStage> = load_json(path)?;
        Ok(Self::from_stages(stages))
    }

    /// Add or replace one entry.
    pub fn insert(&mut self, stage: FileStage) {
        let key = (stage.service.clone(), stage.table_name.clone());
        if !self.services.contains(&stage.service) {
            self.services.push(stage.service.clone());
        }
        let tables = self
            .tables_by_service
            .entry(stage.service.clone())
            .or_default();
        if !tables.contains(&stage.table_name) {
            tables.push(stage.table_name.clone());
        }
        self.stages.insert(key, stage);
    }

    /// Entry for one table.
    pub fn get(&self, service: &str, table: &str) -> Option<&FileStage> {
        self.stages.get(&(service.to_string(), table.to_string()))
    }

    /// True when `table` is registered for access control in `service`.
    pub fn is_registered(&self, service: &str, table: &str) -> bool {
        self.get(service, table).is_some()
    }

    /// Services in first-registration order.
    pub fn services(&self) -> &[String] {
        &self.services
    }

    /// Tables of a service in registration order.
    pub fn tables(&self, service: &str) -> &[String] {
        self.tables_by_service
            .get(service)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Every entry, ordered by `(service, table)`.
    pub fn stages(&self) -> impl Iterator<Item = &FileStage> {
        self.stages.values()
    }

    /// Registered tables grouped by service.
    pub fn ac_tables(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut grouped: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (service, table) in self.stages.keys() {
            grouped
                .entry(service.clone())
                .or_default()
                .insert(table.clone());
        }
        grouped
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// True when the registry has no entries.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGISTRY: &str = r#"[
        {"service": "mastermgmt", "table_name": "zones", "revision": 1, "stages": []},
        {"service": "bob", "table_name": "users", "revision": 1, "stages": []},
        {"service": "mastermgmt", "table_name": "areas", "revision": 1, "stages": []},
        {"service": "bob", "table_name": "users", "revision": 2, "stages": []}
    ]"#;

    #[test]
    fn indexes_entries_in_registration_order() {
        let registry = PolicyRegistry::from_json(REGISTRY).expect("registry should decode");

        assert_eq!(registry.len(), 3);
        assert_eq!(
            registry.services(),
            &["mastermgmt".to_string(), "bob".to_string()]
        );
        assert_eq!(
            registry.tables("mastermgmt"),
            &["zones".to_string(), "areas".to_string()]
        );
        assert!(registry.tables("tom").is_empty());
    }

    #[test]
    fn duplicate_entries_keep_the_latest_revision() {
        let registry = PolicyRegistry::from_json(REGISTRY).expect("registry should decode");
        let users = registry.get("bob", "users").expect("users should be registered");
        assert_eq!(users.revision, 2);
        assert_eq!(registry.tables("bob"), &["users".to_string()]);
    }

    #[test]
    fn groups_access_controlled_tables_by_service() {
        let registry = PolicyRegistry::from_json(REGISTRY).expect("registry should decode");
        let grouped = registry.ac_tables();
        assert!(grouped["mastermgmt"].contains("areas"));
        assert!(grouped["bob"].contains("users"));
        assert!(registry.is_registered("bob", "users"));
        assert!(!registry.is_registered("tom", "users"));
    }
}
