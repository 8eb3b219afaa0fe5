use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::LoadError;
use crate::hasura::metadata::HasuraLayout;
use crate::snapshot::store::load_yaml;
use crate::verify::audit::Check;

fn default_snapshot_dir() -> PathBuf {
    PathBuf::from("mock/testing/testdata")
}

fn default_stage_file() -> PathBuf {
    PathBuf::from("accesscontrol/stage.json")
}

fn default_ignored_resource_path_services() -> Vec<String> {
    vec!["zeus".to_string()]
}

/// Inputs and exemptions for an audit run.
///
/// Every field has a default so a config file only lists what differs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VerifierConfig {
    /// Root of `<service>/<table>.json` schema snapshots.
    pub snapshot_dir: PathBuf,
    /// Access-control registry (`stage.json`).
    pub stage_file: PathBuf,
    /// Tables exempt from the simple RLS convention.
    pub ignore_tables_file: Option<PathBuf>,
    /// Directory of CDC connector configs.
    pub connector_dir: Option<PathBuf>,
    /// Charts root holding per-service Hasura metadata.
    pub hasura_root: Option<PathBuf>,
    /// Hasura metadata layout under `hasura_root`.
    pub hasura_layout: HasuraLayout,
    /// Root of `<service>/<table>.json` entity descriptors.
    pub entity_dir: Option<PathBuf>,
    /// Table owners whose tables are not subject to the simple RLS convention.
    pub bypass_rls_accounts: Vec<String>,
    /// Services whose tables need no `resource_path` column.
    pub ignored_resource_path_services: Vec<String>,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            snapshot_dir: default_snapshot_dir(),
            stage_file: default_stage_file(),
            ignore_tables_file: None,
            connector_dir: None,
            hasura_root: None,
            hasura_layout: HasuraLayout::default(),
            entity_dir: None,
            bypass_rls_accounts: Vec::new(),
            ignored_resource_path_services: default_ignored_resource_path_services(),
        }
    }
}

impl VerifierConfig {
    /// Decode a config document.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Load a config file.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        load_yaml(path)
    }

    /// Checks whose inputs are configured, in run order.
    pub fn available_checks(&self) -> Vec<Check> {
        Check::ALL
            .into_iter()
            .filter(|check| self.missing_input(*check).is_none())
            .collect()
    }

    /// Fail when a requested check lacks its input.
    pub fn validate(&self, checks: &[Check]) -> Result<(), LoadError> {
        for check in checks {
            if let Some(setting) = self.missing_input(*check) {
                return Err(LoadError::Config(format!(
                    "check {check} requires {setting} to be set"
                )));
            }
        }
        Ok(())
    }

    fn missing_input(&self, check: Check) -> Option<&'static str> {
        match check {
            Check::Hasura if self.hasura_root.is_none() => Some("hasura_root"),
            Check::Sink | Check::Drift if self.connector_dir.is_none() => Some("connector_dir"),
            Check::Entity if self.entity_dir.is_none() => Some("entity_dir"),
            _ => None,
        }
    }
}
