use serde::Serialize;

use crate::error::{Violation, ViolationKind};
use crate::snapshot::table::{ConstraintType, TableSchema};

/// A replicated table whose sink schema is compatible with its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncTable {
    /// Table name.
    pub table: String,
    /// Source service.
    pub source: String,
    /// Sink service.
    pub sink: String,
    /// Sink columns, all present on the source.
    pub columns: Vec<String>,
    /// Primary-key columns shared by both sides.
    pub primary_keys: Vec<String>,
}

/// Check that a sink table can receive rows replicated from `source`.
///
/// Stops at the first mismatch. Every sink column must exist on the source with
/// the same data type, a `NOT NULL` sink column needs a `NOT NULL` source
/// column, every non foreign-key sink constraint needs a source constraint of
/// the same kind on the same column, and every source primary-key column must
/// be a primary-key column on the sink too.
pub fn compare_schema(
    sink: &TableSchema,
    source: &TableSchema,
    sink_name: &str,
    source_name: &str,
) -> Result<SyncTable, Violation> {
    let table = sink.table_name.as_str();

    for column in &sink.schema {
        let name = &column.column_name;
        let Some(origin) = source.column(name) else {
            return Err(Violation::new(
                ViolationKind::MissingSourceColumn,
                table,
                sink_name,
                format!(
                    "column {name} of table {table} in service {sink_name} does not exist in table {} of service {source_name}",
                    source.table_name
                ),
            ));
        };
        if column.data_type != origin.data_type {
            return Err(Violation::new(
                ViolationKind::ColumnTypeMismatch,
                table,
                sink_name,
                format!(
                    "column {name} of table {table} has type {} in service {sink_name} but {} in service {source_name}",
                    column.data_type, origin.data_type
                ),
            ));
        }
        if column.is_not_null() && !origin.is_not_null() {
            return Err(Violation::new(
                ViolationKind::NullableMismatch,
                table,
                sink_name,
                format!(
                    "column {name} of table {table} nullable is not match: NOT NULL in service {sink_name} but nullable in service {source_name}"
                ),
            ));
        }
    }

    for constraint in &sink.constraints {
        if constraint.constraint_type == ConstraintType::ForeignKey {
            continue;
        }
        let matched = source.constraints.iter().any(|other| {
            other.constraint_type == constraint.constraint_type
                && other.column_name == constraint.column_name
        });
        if !matched {
            return Err(Violation::new(
                ViolationKind::ConstraintMismatch,
                table,
                sink_name,
                format!(
                    "constraint {} ({} on column {}) of table {table} in service {sink_name} has no counterpart in service {source_name}",
                    constraint.constraint_name, constraint.constraint_type, constraint.column_name
                ),
            ));
        }
    }

    let mut primary_keys = Vec::new();
    for key in source.constraints_of(&ConstraintType::PrimaryKey) {
        let mirrored = sink
            .constraints_of(&ConstraintType::PrimaryKey)
            .any(|other| other.column_name == key.column_name);
        if !mirrored {
            return Err(Violation::new(
                ViolationKind::ConstraintMismatch,
                table,
                sink_name,
                format!(
                    "primary key on column {} of table {} in service {source_name} is missing in service {sink_name}",
                    key.column_name, source.table_name
                ),
            ));
        }
        primary_keys.push(key.column_name.clone());
    }

    Ok(SyncTable {
        table: table.to_string(),
        source: source_name.to_string(),
        sink: sink_name.to_string(),
        columns: sink.schema.iter().map(|c| c.column_name.clone()).collect(),
        primary_keys,
    })
}
