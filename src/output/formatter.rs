use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::output::report;
use crate::verify::audit::AuditReport;

/// Failure to write audit artifacts.
#[derive(Debug, Error)]
pub enum OutputError {
    /// The artifact name would escape the output directory.
    #[error("Invalid output name '{name}': {reason}")]
    InvalidName {
        /// Rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },
    /// Creating the directory or writing a file failed.
    #[error("Failed to write {}: {source}", path.display())]
    Io {
        /// Target path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Serializing the violation dump failed.
    #[error("Failed to serialize violations: {0}")]
    Json(#[from] serde_json::Error),
}

/// Write `<name>_report.md` and `<name>_violations.json` into `output_dir`.
pub fn write_output(output_dir: &Path, name: &str, audit: &AuditReport) -> Result<(), OutputError> {
    validate_output_name(name)?;

    std::fs::create_dir_all(output_dir).map_err(|source| OutputError::Io {
        path: output_dir.to_path_buf(),
        source,
    })?;

    let report_path = output_dir.join(format!("{name}_report.md"));
    write_file(&report_path, &report::build_report(audit))?;

    let violations: Vec<_> = audit.violations().collect();
    let json = serde_json::to_string_pretty(&violations)?;
    write_file(&output_dir.join(format!("{name}_violations.json")), &json)?;

    Ok(())
}

fn write_file(path: &Path, content: &str) -> Result<(), OutputError> {
    std::fs::write(path, content).map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn validate_output_name(name: &str) -> Result<(), OutputError> {
    let invalid = |reason| {
        Err(OutputError::InvalidName {
            name: name.to_string(),
            reason,
        })
    };
    if name.trim().is_empty() {
        return invalid("must not be empty");
    }
    let candidate = Path::new(name);
    if candidate.is_absolute() {
        return invalid("absolute paths are not allowed");
    }
    if candidate.components().any(|component| {
        matches!(
            component,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    }) {
        return invalid("traversal segments are not allowed");
    }
    if name.contains('/') || name.contains('\\') {
        return invalid("path separators are not allowed");
    }
    Ok(())
}
