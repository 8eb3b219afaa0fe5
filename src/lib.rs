//! Statically verify `PostgreSQL` row-level security and Hasura permissions
//! against a declarative access-control registry.
#![warn(missing_docs)]

/// Audit configuration loaded from YAML.
pub mod config;
/// Load errors, policy violations, and their aggregation.
pub mod error;
/// Hasura metadata model and loaders.
pub mod hasura;
/// Markdown report and violation dump output.
pub mod output;
/// Policy naming conventions and SQL predicate parsing.
pub mod parser;
/// Declarative access-control registry.
pub mod registry;
/// On-disk schema snapshots.
pub mod snapshot;
/// The verifiers and their orchestration.
pub mod verify;

pub use config::VerifierConfig;
pub use error::{Error, LoadError, Violation, ViolationKind, Violations};
