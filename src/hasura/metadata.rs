use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LoadError;
use crate::registry::stage::PolicyCommand;
use crate::snapshot::store::{files_with_extension, load_yaml};

/// Qualified table reference inside Hasura metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HasuraTableRef {
    /// Schema, usually `public`.
    #[serde(default)]
    pub schema: String,
    /// Table name.
    pub name: String,
}

/// Body of one role's permission.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PermissionBody {
    /// Row filter.
    #[serde(default)]
    pub filter: Option<serde_yaml::Value>,
    /// Row check.
    #[serde(default)]
    pub check: Option<serde_yaml::Value>,
    /// Exposed columns.
    #[serde(default)]
    pub columns: Option<Vec<String>>,
}

/// Permission entry for one role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolePermission {
    /// Hasura role.
    pub role: String,
    /// Permission body.
    #[serde(default)]
    pub permission: PermissionBody,
}

/// One entry of Hasura's `tables.yaml` (or one v2 per-table file).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HasuraTable {
    /// Tracked table.
    pub table: HasuraTableRef,
    /// Select permissions.
    #[serde(default)]
    pub select_permissions: Option<Vec<RolePermission>>,
    /// Insert permissions.
    #[serde(default)]
    pub insert_permissions: Option<Vec<RolePermission>>,
    /// Update permissions.
    #[serde(default)]
    pub update_permissions: Option<Vec<RolePermission>>,
    /// Delete permissions.
    #[serde(default)]
    pub delete_permissions: Option<Vec<RolePermission>>,
}

impl HasuraTable {
    /// Permission block for one command; `None` when the block is absent.
    pub fn permissions(&self, command: PolicyCommand) -> Option<&[RolePermission]> {
        match command {
            PolicyCommand::Select => self.select_permissions.as_deref(),
            PolicyCommand::Insert => self.insert_permissions.as_deref(),
            PolicyCommand::Update => self.update_permissions.as_deref(),
            PolicyCommand::Delete => self.delete_permissions.as_deref(),
            PolicyCommand::All => None,
        }
    }

    /// Mutable permission block for one command.
    pub fn permissions_mut(&mut self, command: PolicyCommand) -> Option<&mut Vec<RolePermission>> {
        match command {
            PolicyCommand::Select => self.select_permissions.as_mut(),
            PolicyCommand::Insert => self.insert_permissions.as_mut(),
            PolicyCommand::Update => self.update_permissions.as_mut(),
            PolicyCommand::Delete => self.delete_permissions.as_mut(),
            PolicyCommand::All => None,
        }
    }
}

/// Decode a v1 `tables.yaml` document.
pub fn parse_tables_yaml(yaml: &str) -> Result<Vec<HasuraTable>, serde_yaml::Error> {
    serde_yaml::from_str(yaml)
}

/// How a service's Hasura metadata is laid out on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HasuraLayout {
    /// `<root>/<svc>/files/hasura/metadata/tables.yaml`
    #[default]
    V1,
    /// `<root>/<svc>/files/hasurav2/metadata/databases/<svc>/tables/*.yaml`
    V2,
}

impl std::str::FromStr for HasuraLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "v1" | "1" => Ok(HasuraLayout::V1),
            "v2" | "2" => Ok(HasuraLayout::V2),
            _ => Err(format!("Invalid Hasura layout: {s}")),
        }
    }
}

/// Locates and loads Hasura metadata per service.
#[derive(Debug, Clone)]
pub struct HasuraMetadataLocator {
    root: PathBuf,
    layout: HasuraLayout,
}

impl HasuraMetadataLocator {
    /// Locator over a charts root directory.
    pub fn new(root: impl Into<PathBuf>, layout: HasuraLayout) -> Self {
        Self {
            root: root.into(),
            layout,
        }
    }

    /// Metadata path for a service (a file for v1, a directory for v2).
    pub fn path_for(&self, service: &str) -> PathBuf {
        match self.layout {
            HasuraLayout::V1 => self
                .root
                .join(service)
                .join("files/hasura/metadata/tables.yaml"),
            HasuraLayout::V2 => self
                .root
                .join(service)
                .join("files/hasurav2/metadata/databases")
                .join(service)
                .join("tables"),
        }
    }

    /// Tracked tables of a service keyed by table name.
    ///
    /// A missing file or directory surfaces as a `LoadError` for which
    /// [`LoadError::is_not_found`] is true.
    pub fn load(&self, service: &str) -> Result<BTreeMap<String, HasuraTable>, LoadError> {
        let path = self.path_for(service);
        debug!(service, path = %path.display(), "loading hasura metadata");
        let tables = match self.layout {
            HasuraLayout::V1 => load_yaml::<Vec<HasuraTable>>(&path)?,
            HasuraLayout::V2 => load_v2_tables(&path)?,
        };
        Ok(tables
            .into_iter()
            .map(|table| (table.table.name.clone(), table))
            .collect())
    }
}

fn load_v2_tables(dir: &Path) -> Result<Vec<HasuraTable>, LoadError> {
    let mut tables = Vec::new();
    for path in files_with_extension(dir, "yaml")? {
        if path.file_name().is_some_and(|name| name == "tables.yaml") {
            continue;
        }
        tables.push(load_yaml::<HasuraTable>(&path)?);
    }
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLES_YAML: &str = r"
- table:
    schema: public
    name: docs
  select_permissions:
  - role: MANABIE
    permission:
      columns:
      - id
      filter:
        owner:
          _eq: X-Hasura-User-Id
      allow_aggregations: true
  insert_permissions:
  - role: MANABIE
    permission:
      check: {}
      set:
        resource_path: x-hasura-Resource-Path
- table:
    schema: public
    name: granted_permissions
";

    #[test]
    fn decodes_v1_tables_yaml_ignoring_unknown_keys() {
        let tables = parse_tables_yaml(TABLES_YAML).expect("tables.yaml should decode");
        assert_eq!(tables.len(), 2);

        let docs = &tables[0];
        assert_eq!(docs.table.name, "docs");
        let select = docs
            .permissions(PolicyCommand::Select)
            .expect("select block should exist");
        assert_eq!(select[0].role, "MANABIE");
        assert!(select[0].permission.filter.is_some());
        assert!(docs.permissions(PolicyCommand::Update).is_none());

        assert!(tables[1].permissions(PolicyCommand::Select).is_none());
    }

    #[test]
    fn locator_builds_layout_specific_paths() {
        let v1 = HasuraMetadataLocator::new("charts", HasuraLayout::V1);
        assert_eq!(
            v1.path_for("bob"),
            PathBuf::from("charts/bob/files/hasura/metadata/tables.yaml")
        );
        let v2 = HasuraMetadataLocator::new("charts", HasuraLayout::V2);
        assert_eq!(
            v2.path_for("bob"),
            PathBuf::from("charts/bob/files/hasurav2/metadata/databases/bob/tables")
        );
    }

    #[test]
    fn missing_metadata_is_reported_as_not_found() {
        let locator = HasuraMetadataLocator::new("/definitely/not/here", HasuraLayout::V1);
        let err = locator.load("bob").expect_err("missing metadata should fail");
        assert!(err.is_not_found());
    }

    #[test]
    fn layout_parses_from_cli_text() {
        assert_eq!("v2".parse::<HasuraLayout>(), Ok(HasuraLayout::V2));
        assert_eq!("1".parse::<HasuraLayout>(), Ok(HasuraLayout::V1));
        assert!("v3".parse::<HasuraLayout>().is_err());
    }
}
