//! Round-trip check between an entity's field mapping and its table snapshot.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LoadError, Violation, ViolationKind};
use crate::snapshot::store::{load_json, SnapshotStore};
use crate::snapshot::table::TableSchema;

/// Column default every multi-tenant table must use for `resource_path`.
pub const RESOURCE_PATH_DEFAULT: &str = "autofillresourcepath()";
/// Tenant discriminator column.
pub const RESOURCE_PATH_COLUMN: &str = "resource_path";

/// Value representation an entity field uses for one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnValueKind {
    /// Character data.
    Text,
    /// 16-bit integer.
    Int2,
    /// 32-bit integer.
    Int4,
    /// 64-bit integer.
    Int8,
    /// Single-precision float.
    Float4,
    /// Double-precision float.
    Float8,
    /// Arbitrary-precision number.
    Numeric,
    /// Boolean.
    Bool,
    /// Timestamp with time zone.
    Timestamptz,
    /// Timestamp without time zone.
    Timestamp,
    /// Calendar date.
    Date,
    /// Time of day.
    Time,
    /// Time span.
    Interval,
    /// UUID.
    Uuid,
    /// JSON document (`json` or `jsonb`).
    Json,
    /// Raw bytes.
    Bytea,
    /// Array of text values.
    TextArray,
    /// Array of integers.
    IntArray,
}

impl ColumnValueKind {
    /// `information_schema.columns.data_type` values this representation can hold.
    pub fn allowed_types(self) -> &'static [&'static str] {
        match self {
            ColumnValueKind::Text => &["text", "character varying", "character"],
            ColumnValueKind::Int2 => &["smallint"],
            ColumnValueKind::Int4 => &["integer", "smallint"],
            ColumnValueKind::Int8 => &["bigint", "integer", "smallint"],
            ColumnValueKind::Float4 => &["real"],
            ColumnValueKind::Float8 => &["double precision", "real"],
            ColumnValueKind::Numeric => &["numeric"],
            ColumnValueKind::Bool => &["boolean"],
            ColumnValueKind::Timestamptz => &["timestamp with time zone"],
            ColumnValueKind::Timestamp => &["timestamp without time zone"],
            ColumnValueKind::Date => &["date"],
            ColumnValueKind::Time => &["time without time zone", "time with time zone"],
            ColumnValueKind::Interval => &["interval"],
            ColumnValueKind::Uuid => &["uuid"],
            ColumnValueKind::Json => &["jsonb", "json"],
            ColumnValueKind::Bytea => &["bytea"],
            ColumnValueKind::TextArray | ColumnValueKind::IntArray => &["ARRAY"],
        }
    }

    /// True when a column of `data_type` can hold this representation.
    pub fn accepts(self, data_type: &str) -> bool {
        self.allowed_types().contains(&data_type)
    }
}

impl fmt::Display for ColumnValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ColumnValueKind::Text => "text",
            ColumnValueKind::Int2 => "int2",
            ColumnValueKind::Int4 => "int4",
            ColumnValueKind::Int8 => "int8",
            ColumnValueKind::Float4 => "float4",
            ColumnValueKind::Float8 => "float8",
            ColumnValueKind::Numeric => "numeric",
            ColumnValueKind::Bool => "bool",
            ColumnValueKind::Timestamptz => "timestamptz",
            ColumnValueKind::Timestamp => "timestamp",
            ColumnValueKind::Date => "date",
            ColumnValueKind::Time => "time",
            ColumnValueKind::Interval => "interval",
            ColumnValueKind::Uuid => "uuid",
            ColumnValueKind::Json => "json",
            ColumnValueKind::Bytea => "bytea",
            ColumnValueKind::TextArray => "text_array",
            ColumnValueKind::IntArray => "int_array",
        };
        f.write_str(text)
    }
}

/// One mapped field of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityField {
    /// Backing column.
    pub column: String,
    /// Value representation.
    pub kind: ColumnValueKind,
}

/// Field mapping of an entity onto one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    /// Backing table.
    pub table: String,
    /// Mapped fields.
    #[serde(default)]
    pub fields: Vec<EntityField>,
}

impl EntityDescriptor {
    /// Decode a descriptor from JSON text.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Load a descriptor file.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        load_json(path)
    }
}

/// Entity descriptors under `<dir>/<service>/**/*.json`, as `(service, descriptor)` pairs.
pub fn load_entities(dir: &Path) -> Result<Vec<(String, EntityDescriptor)>, LoadError> {
    let layout = SnapshotStore::new(dir);
    let mut out = Vec::new();
    for service in layout.services()? {
        for path in layout.table_files(&service)? {
            out.push((service.clone(), EntityDescriptor::load(&path)?));
        }
    }
    Ok(out)
}

/// Checks entity mappings against table snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaVerifier {
    ignored_resource_path_services: Vec<String>,
}

impl Default for SchemaVerifier {
    fn default() -> Self {
        Self::new(vec!["zeus".to_string()])
    }
}

impl SchemaVerifier {
    /// Verifier exempting the given services from the `resource_path` rule.
    pub fn new(ignored_resource_path_services: Vec<String>) -> Self {
        Self {
            ignored_resource_path_services,
        }
    }

    fn requires_resource_path(&self, service: &str) -> bool {
        !self
            .ignored_resource_path_services
            .iter()
            .any(|ignored| ignored == service)
    }

    /// Check that `entity` and `schema` describe the same columns with compatible
    /// types, and that the table carries a properly defaulted `resource_path`.
    pub fn verify_entity(
        &self,
        service: &str,
        schema: &TableSchema,
        entity: &EntityDescriptor,
    ) -> Result<(), Violation> {
        let table = schema.table_name.as_str();
        if entity.table != table {
            return Err(Violation::new(
                ViolationKind::EntityFieldMismatch,
                table,
                service,
                format!(
                    "entity for table {} does not describe table {table} in service {service}",
                    entity.table
                ),
            ));
        }

        for field in &entity.fields {
            let Some(column) = schema.column(&field.column) else {
                return Err(Violation::new(
                    ViolationKind::EntityFieldMismatch,
                    table,
                    service,
                    format!(
                        "field {} of entity {table} has no column in table {table} in service {service}",
                        field.column
                    ),
                ));
            };
            if !field.kind.accepts(&column.data_type) {
                return Err(Violation::new(
                    ViolationKind::EntityFieldMismatch,
                    table,
                    service,
                    format!(
                        "column {} of table {table} in service {service} has type {} which does not match field kind {}",
                        field.column, column.data_type, field.kind
                    ),
                ));
            }
        }

        for column in &schema.schema {
            if !entity.fields.iter().any(|f| f.column == column.column_name) {
                return Err(Violation::new(
                    ViolationKind::EntityFieldMismatch,
                    table,
                    service,
                    format!(
                        "column {} of table {table} in service {service} is not mapped by the entity",
                        column.column_name
                    ),
                ));
            }
        }

        if !self.requires_resource_path(service) {
            return Ok(());
        }
        let Some(resource_path) = schema.column(RESOURCE_PATH_COLUMN) else {
            return Err(Violation::new(
                ViolationKind::ResourcePathMismatch,
                table,
                service,
                format!("table {table} in service {service} has no {RESOURCE_PATH_COLUMN} column"),
            ));
        };
        if resource_path.column_default.as_deref() != Some(RESOURCE_PATH_DEFAULT) {
            return Err(Violation::new(
                ViolationKind::ResourcePathMismatch,
                table,
                service,
                format!(
                    "{RESOURCE_PATH_COLUMN} of table {table} in service {service} must default to {RESOURCE_PATH_DEFAULT}"
                ),
            ));
        }
        Ok(())
    }
}
