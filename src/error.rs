use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Failure to load an input needed by a check ("could not check").
#[derive(Debug, Error)]
pub enum LoadError {
    /// Reading a file or directory failed.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// Path that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A JSON document did not match the expected shape.
    #[error("failed to parse JSON file {}: {source}", path.display())]
    Json {
        /// Offending file.
        path: PathBuf,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },
    /// A YAML document did not match the expected shape.
    #[error("failed to parse YAML file {}: {source}", path.display())]
    Yaml {
        /// Offending file.
        path: PathBuf,
        /// Underlying decode error.
        #[source]
        source: serde_yaml::Error,
    },
    /// A table is registered for access control but no snapshot exists for it.
    #[error("failed to find schema snapshot for table {table} in service {service}")]
    MissingSnapshot {
        /// Owning service.
        service: String,
        /// Registered table name.
        table: String,
    },
    /// Configuration is unusable for the requested checks.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl LoadError {
    /// True when the underlying cause is a missing file or directory.
    pub fn is_not_found(&self) -> bool {
        matches!(self, LoadError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Category of a policy violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// `relrowsecurity` is false.
    RlsNotEnabled,
    /// `relforcerowsecurity` is false.
    RlsNotForced,
    /// A policy is not granted to `public`.
    NotGrantedToPublic,
    /// Policy name does not follow `rls_<table>[_restrictive]`.
    WrongPolicyName,
    /// The restrictive multi-tenant policy is not declared `RESTRICTIVE`.
    RestrictiveModeMismatch,
    /// USING/WITH CHECK differs from the canonical `permission_check` predicate.
    PredicateMismatch,
    /// A live policy has no counterpart in the registry.
    UnexpectedPolicy,
    /// USING text does not match the registry.
    UsingMismatch,
    /// WITH CHECK text does not match the registry.
    WithCheckMismatch,
    /// No restrictive policy on the table.
    MissingRestrictivePolicy,
    /// No permissive policy on the table.
    MissingPermissivePolicy,
    /// More than one restrictive policy on the table.
    WrongRestrictiveCount,
    /// A registry policy has no live counterpart.
    MissingRegistryPolicy,
    /// The relation kind cannot carry row-level security (views).
    UnsupportedTableType,
    /// Hasura metadata lacks a whole permission block expected by the registry.
    MissingHasuraPermission,
    /// A registry role is absent from the Hasura permission block.
    MissingHasuraRole,
    /// Hasura filter expression does not match the registry.
    HasuraFilterMismatch,
    /// Hasura check expression does not match the registry.
    HasuraCheckMismatch,
    /// A replicated table lost its access-control registration on the sink side.
    SinkTableMissingAc,
    /// A sink column does not exist on the source table.
    MissingSourceColumn,
    /// Sink and source column types differ.
    ColumnTypeMismatch,
    /// Sink column is `NOT NULL` while the source column is nullable.
    NullableMismatch,
    /// Constraint present on one side of a replication edge is missing on the other.
    ConstraintMismatch,
    /// An entity field has no backing column or an incompatible type.
    EntityFieldMismatch,
    /// `resource_path` column is missing or does not default to `autofillresourcepath()`.
    ResourcePathMismatch,
    /// A registry predicate does not parse as a PostgreSQL expression.
    UnparseablePredicate,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ViolationKind::RlsNotEnabled => "rls-not-enabled",
            ViolationKind::RlsNotForced => "rls-not-forced",
            ViolationKind::NotGrantedToPublic => "not-granted-to-public",
            ViolationKind::WrongPolicyName => "wrong-policy-name",
            ViolationKind::RestrictiveModeMismatch => "restrictive-mode-mismatch",
            ViolationKind::PredicateMismatch => "predicate-mismatch",
            ViolationKind::UnexpectedPolicy => "unexpected-policy",
            ViolationKind::UsingMismatch => "using-mismatch",
            ViolationKind::WithCheckMismatch => "with-check-mismatch",
            ViolationKind::MissingRestrictivePolicy => "missing-restrictive-policy",
            ViolationKind::MissingPermissivePolicy => "missing-permissive-policy",
            ViolationKind::WrongRestrictiveCount => "wrong-restrictive-count",
            ViolationKind::MissingRegistryPolicy => "missing-registry-policy",
            ViolationKind::UnsupportedTableType => "unsupported-table-type",
            ViolationKind::MissingHasuraPermission => "missing-hasura-permission",
            ViolationKind::MissingHasuraRole => "missing-hasura-role",
            ViolationKind::HasuraFilterMismatch => "hasura-filter-mismatch",
            ViolationKind::HasuraCheckMismatch => "hasura-check-mismatch",
            ViolationKind::SinkTableMissingAc => "sink-table-missing-ac",
            ViolationKind::MissingSourceColumn => "missing-source-column",
            ViolationKind::ColumnTypeMismatch => "column-type-mismatch",
            ViolationKind::NullableMismatch => "nullable-mismatch",
            ViolationKind::ConstraintMismatch => "constraint-mismatch",
            ViolationKind::EntityFieldMismatch => "entity-field-mismatch",
            ViolationKind::ResourcePathMismatch => "resource-path-mismatch",
            ViolationKind::UnparseablePredicate => "unparseable-predicate",
        };
        f.write_str(text)
    }
}

/// One failed check on one table ("checked and failed").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{message}")]
pub struct Violation {
    /// Violation category.
    pub kind: ViolationKind,
    /// Table the violation is about.
    pub table: String,
    /// Owning service, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    /// Human-readable description.
    pub message: String,
}

impl Violation {
    /// Build a violation scoped to a table inside a service.
    pub fn new(
        kind: ViolationKind,
        table: impl Into<String>,
        service: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            table: table.into(),
            service: Some(service.into()),
            message: message.into(),
        }
    }

    /// Build a violation for a table whose service is not part of the context.
    pub fn for_table(
        kind: ViolationKind,
        table: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            table: table.into(),
            service: None,
            message: message.into(),
        }
    }
}

/// Ordered collection of violations gathered by an accumulating check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Violations(Vec<Violation>);

impl Violations {
    /// Empty collection.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append one violation.
    pub fn push(&mut self, violation: Violation) {
        self.0.push(violation);
    }

    /// Append every violation of `other`, keeping order.
    pub fn extend(&mut self, other: Violations) {
        self.0.extend(other.0);
    }

    /// Record the error side of a fail-fast result.
    pub fn record<T>(&mut self, result: Result<T, Violation>) {
        if let Err(violation) = result {
            self.push(violation);
        }
    }

    /// Record the error side of an accumulating result.
    pub fn record_all(&mut self, result: Result<(), Violations>) {
        if let Err(violations) = result {
            self.extend(violations);
        }
    }

    /// True when nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of recorded violations.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Recorded violations in discovery order.
    pub fn as_slice(&self) -> &[Violation] {
        &self.0
    }

    /// Iterate in discovery order.
    pub fn iter(&self) -> std::slice::Iter<'_, Violation> {
        self.0.iter()
    }

    /// `Ok(())` when empty, otherwise `Err(self)`.
    pub fn into_result(self) -> Result<(), Violations> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Messages joined one per line.
    pub fn lines(&self) -> String {
        self.0
            .iter()
            .map(|v| v.message.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for Violations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, violation) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str("; ")?;
            }
            f.write_str(&violation.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for Violations {}

impl From<Violation> for Violations {
    fn from(violation: Violation) -> Self {
        Self(vec![violation])
    }
}

impl FromIterator<Violation> for Violations {
    fn from_iter<I: IntoIterator<Item = Violation>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Violations {
    type Item = Violation;
    type IntoIter = std::vec::IntoIter<Violation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Violations {
    type Item = &'a Violation;
    type IntoIter = std::slice::Iter<'a, Violation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Top-level result of an orchestrated check.
#[derive(Debug, Error)]
pub enum Error {
    /// Inputs could not be loaded; nothing was verified.
    #[error(transparent)]
    Load(#[from] LoadError),
    /// Inputs were verified and at least one violation was found.
    #[error("{0}")]
    Violations(Violations),
}

impl Error {
    /// True for "checked and failed", false for "could not check".
    pub fn is_violation(&self) -> bool {
        matches!(self, Error::Violations(_))
    }

    /// Violations carried by this error (empty for load failures).
    pub fn violations(&self) -> &[Violation] {
        match self {
            Error::Violations(v) => v.as_slice(),
            Error::Load(_) => &[],
        }
    }
}

impl From<Violations> for Error {
    fn from(violations: Violations) -> Self {
        Error::Violations(violations)
    }
}

impl From<Violation> for Error {
    fn from(violation: Violation) -> Self {
        Error::Violations(violation.into())
    }
}
