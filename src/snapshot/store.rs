use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::LoadError;
use crate::snapshot::table::TableSchema;

/// Read a file into a string, tagging failures with the path.
pub(crate) fn read_file(path: &Path) -> Result<String, LoadError> {
    fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Decode a JSON file.
pub(crate) fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let content = read_file(path)?;
    serde_json::from_str(&content).map_err(|source| LoadError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Decode a YAML file.
pub(crate) fn load_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let content = read_file(path)?;
    serde_yaml::from_str(&content).map_err(|source| LoadError::Yaml {
        path: path.to_path_buf(),
        source,
    })
}

/// Every file under `root` (recursively) with the given extension, sorted by path.
pub(crate) fn files_with_extension(root: &Path, extension: &str) -> Result<Vec<PathBuf>, LoadError> {
    let mut out = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = fs::read_dir(&dir).map_err(|source| LoadError::Io {
            path: dir.clone(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| LoadError::Io {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|e| e == extension) {
                out.push(path);
            }
        }
    }
    out.sort();
    Ok(out)
}

/// On-disk snapshot directory laid out as `<root>/<service>/**/<table>.json`.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    /// Open a store rooted at `root`. Nothing is read until queried.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Service names (immediate sub-directories), sorted.
    pub fn services(&self) -> Result<Vec<String>, LoadError> {
        let entries = fs::read_dir(&self.root).map_err(|source| LoadError::Io {
            path: self.root.clone(),
            source,
        })?;
        let mut services = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| LoadError::Io {
                path: self.root.clone(),
                source,
            })?;
            if entry.path().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    services.push(name.to_string());
                }
            }
        }
        services.sort();
        Ok(services)
    }

    /// Snapshot files of one service, sorted by path.
    pub fn table_files(&self, service: &str) -> Result<Vec<PathBuf>, LoadError> {
        files_with_extension(&self.root.join(service), "json")
    }

    /// Table names of one service, in file order.
    pub fn tables(&self, service: &str) -> Result<Vec<String>, LoadError> {
        Ok(self
            .table_files(service)?
            .iter()
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()))
            .map(ToString::to_string)
            .collect())
    }

    /// Path of a table's snapshot, if one exists.
    pub fn find(&self, service: &str, table: &str) -> Result<Option<PathBuf>, LoadError> {
        let service_dir = self.root.join(service);
        if !service_dir.is_dir() {
            return Ok(None);
        }
        Ok(self
            .table_files(service)?
            .into_iter()
            .find(|p| p.file_stem().and_then(|s| s.to_str()) == Some(table)))
    }

    /// Load one snapshot file.
    pub fn load_file(&self, path: &Path) -> Result<TableSchema, LoadError> {
        debug!(path = %path.display(), "loading table snapshot");
        load_json(path)
    }

    /// Load a table's snapshot; `Ok(None)` when the table was never snapshotted.
    pub fn try_load(&self, service: &str, table: &str) -> Result<Option<TableSchema>, LoadError> {
        match self.find(service, table)? {
            Some(path) => self.load_file(&path).map(Some),
            None => Ok(None),
        }
    }

    /// Load a table's snapshot, failing when it does not exist.
    pub fn load(&self, service: &str, table: &str) -> Result<TableSchema, LoadError> {
        self.try_load(service, table)?
            .ok_or_else(|| LoadError::MissingSnapshot {
                service: service.to_string(),
                table: table.to_string(),
            })
    }
}
