use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::parser::names::is_granted_to_public;

/// Policy combination mode in `PostgreSQL` RLS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyMode {
    /// OR-combined policy branch.
    #[serde(rename = "PERMISSIVE", alias = "permissive")]
    Permissive,
    /// AND-combined policy branch.
    #[serde(rename = "RESTRICTIVE", alias = "restrictive")]
    Restrictive,
}

impl fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyMode::Permissive => write!(f, "PERMISSIVE"),
            PolicyMode::Restrictive => write!(f, "RESTRICTIVE"),
        }
    }
}

/// Relation kind reported by `information_schema.tables.table_type`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TableType {
    /// Ordinary table. Snapshots without a `type` field are treated as base tables.
    #[default]
    #[serde(rename = "BASE TABLE")]
    BaseTable,
    /// View; row-level security does not apply.
    #[serde(rename = "VIEW")]
    View,
    /// Any other relation kind (foreign table, local temporary, ...).
    #[serde(untagged)]
    Other(String),
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableType::BaseTable => f.write_str("BASE TABLE"),
            TableType::View => f.write_str("VIEW"),
            TableType::Other(other) => f.write_str(other),
        }
    }
}

/// `information_schema.columns.is_nullable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Nullability {
    /// Column accepts NULL.
    #[serde(rename = "YES")]
    Nullable,
    /// Column is `NOT NULL`.
    #[serde(rename = "NO")]
    NotNull,
}

/// Constraint kind from `information_schema.table_constraints`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintType {
    /// `PRIMARY KEY`
    #[serde(rename = "PRIMARY KEY")]
    PrimaryKey,
    /// `FOREIGN KEY`
    #[serde(rename = "FOREIGN KEY")]
    ForeignKey,
    /// `UNIQUE`
    #[serde(rename = "UNIQUE")]
    Unique,
    /// `CHECK`
    #[serde(rename = "CHECK")]
    Check,
    /// Anything else the catalog may report.
    #[serde(untagged)]
    Other(String),
}

impl fmt::Display for ConstraintType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintType::PrimaryKey => f.write_str("PRIMARY KEY"),
            ConstraintType::ForeignKey => f.write_str("FOREIGN KEY"),
            ConstraintType::Unique => f.write_str("UNIQUE"),
            ConstraintType::Check => f.write_str("CHECK"),
            ConstraintType::Other(other) => f.write_str(other),
        }
    }
}

/// One column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    /// Column name.
    pub column_name: String,
    /// Postgres data type as rendered by `information_schema` (`text`, `timestamp with time zone`, ...).
    pub data_type: String,
    /// Default expression, if any.
    #[serde(default)]
    pub column_default: Option<String>,
    /// Whether the column accepts NULL.
    pub is_nullable: Nullability,
}

impl FieldSchema {
    /// True for `NOT NULL` columns.
    pub fn is_not_null(&self) -> bool {
        self.is_nullable == Nullability::NotNull
    }
}

/// One constraint entry; multi-column constraints appear once per column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConstraint {
    /// Constraint name.
    pub constraint_name: String,
    /// Constrained column.
    pub column_name: String,
    /// Constraint kind.
    pub constraint_type: ConstraintType,
}

/// One live RLS policy, as read from `pg_policies` joined with `pg_class`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TablePolicy {
    /// Table the policy is defined on.
    #[serde(rename = "tablename")]
    pub table_name: String,
    /// Policy name.
    #[serde(rename = "policyname")]
    pub policy_name: String,
    /// `USING` expression.
    #[serde(default)]
    pub qual: Option<String>,
    /// `WITH CHECK` expression.
    #[serde(default)]
    pub with_check: Option<String>,
    /// `pg_class.relrowsecurity`.
    #[serde(rename = "relrowsecurity", default, deserialize_with = "null_as_default")]
    pub row_security: bool,
    /// `pg_class.relforcerowsecurity`.
    #[serde(
        rename = "relforcerowsecurity",
        default,
        deserialize_with = "null_as_default"
    )]
    pub force_row_security: bool,
    /// Permissive or restrictive.
    pub permissive: PolicyMode,
    /// Grantee roles.
    #[serde(default, deserialize_with = "deserialize_roles")]
    pub roles: Vec<String>,
}

impl TablePolicy {
    /// `USING` text, empty when absent.
    pub fn qual_text(&self) -> &str {
        self.qual.as_deref().unwrap_or_default()
    }

    /// `WITH CHECK` text, empty when absent.
    pub fn with_check_text(&self) -> &str {
        self.with_check.as_deref().unwrap_or_default()
    }

    /// True when the policy applies to every role.
    pub fn is_granted_to_public(&self) -> bool {
        is_granted_to_public(&self.roles)
    }

    /// True for `RESTRICTIVE` policies.
    pub fn is_restrictive(&self) -> bool {
        self.permissive == PolicyMode::Restrictive
    }
}

/// Structural snapshot of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Columns in ordinal order.
    #[serde(default, deserialize_with = "null_as_default")]
    pub schema: Vec<FieldSchema>,
    /// Live RLS policies.
    #[serde(default, deserialize_with = "null_as_default")]
    pub policies: Vec<TablePolicy>,
    /// Constraints.
    #[serde(rename = "constraint", default, deserialize_with = "null_as_default")]
    pub constraints: Vec<FieldConstraint>,
    /// Table name, unique inside one service.
    pub table_name: String,
    /// Relation kind.
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub table_type: TableType,
    /// Owning role.
    #[serde(default)]
    pub owner: Option<String>,
}

impl TableSchema {
    /// Parse a snapshot document.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Look a column up by name.
    pub fn column(&self, name: &str) -> Option<&FieldSchema> {
        self.schema.iter().find(|c| c.column_name == name)
    }

    /// Constraints of the given kind.
    pub fn constraints_of<'a>(
        &'a self,
        kind: &'a ConstraintType,
    ) -> impl Iterator<Item = &'a FieldConstraint> + 'a {
        self.constraints
            .iter()
            .filter(move |c| &c.constraint_type == kind)
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Role lists arrive as a JSON array, a pgtype array object
/// (`{"Elements": [...], "Dimensions": [...], "Status": 2}`) or a Postgres
/// array literal (`"{public}"`).
#[derive(Deserialize)]
#[serde(untagged)]
enum RolesRepr {
    List(Vec<String>),
    PgArray {
        #[serde(rename = "Elements", default)]
        elements: Option<Vec<String>>,
    },
    Literal(String),
}

fn deserialize_roles<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let roles = match Option::<RolesRepr>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(RolesRepr::List(list)) => list,
        Some(RolesRepr::PgArray { elements }) => elements.unwrap_or_default(),
        Some(RolesRepr::Literal(literal)) => parse_array_literal(&literal),
    };
    Ok(roles)
}

fn parse_array_literal(literal: &str) -> Vec<String> {
    let inner = literal
        .trim()
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .unwrap_or(literal);
    inner
        .split(',')
        .map(|role| role.trim().trim_matches('"').to_string())
        .filter(|role| !role.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY_PGTYPE: &str = r#"{
        "tablename": "users",
        "policyname": "rls_users",
        "qual": "permission_check(resource_path, 'users'::text)",
        "with_check": null,
        "relrowsecurity": true,
        "relforcerowsecurity": null,
        "permissive": "PERMISSIVE",
        "roles": {"Elements": ["public"], "Dimensions": [{"Length": 1, "LowerBound": 1}], "Status": 2}
    }"#;

    #[test]
    fn decodes_pgtype_encoded_policy() {
        let policy: TablePolicy = serde_json::from_str(POLICY_PGTYPE).expect("policy should decode");
        assert_eq!(policy.policy_name, "rls_users");
        assert_eq!(policy.with_check, None);
        assert_eq!(policy.with_check_text(), "");
        assert!(policy.row_security);
        assert!(!policy.force_row_security);
        assert_eq!(policy.permissive, PolicyMode::Permissive);
        assert_eq!(policy.roles, vec!["public".to_string()]);
        assert!(policy.is_granted_to_public());
    }

    #[test]
    fn decodes_role_lists_and_array_literals() {
        let list: TablePolicy = serde_json::from_str(
            r#"{"tablename":"t","policyname":"p","permissive":"RESTRICTIVE","roles":["bob","public"]}"#,
        )
        .expect("list roles should decode");
        assert_eq!(list.roles, vec!["bob".to_string(), "public".to_string()]);
        assert!(list.is_restrictive());

        let literal: TablePolicy = serde_json::from_str(
            r#"{"tablename":"t","policyname":"p","permissive":"PERMISSIVE","roles":"{bob,\"public\"}"}"#,
        )
        .expect("literal roles should decode");
        assert_eq!(literal.roles, vec!["bob".to_string(), "public".to_string()]);

        let missing: TablePolicy = serde_json::from_str(
            r#"{"tablename":"t","policyname":"p","permissive":"PERMISSIVE","roles":null}"#,
        )
        .expect("null roles should decode");
        assert!(missing.roles.is_empty());
        assert!(!missing.is_granted_to_public());
    }

    #[test]
    fn table_type_defaults_to_base_table_and_keeps_unknown_kinds() {
        let table = TableSchema::from_json(r#"{"schema": [], "policies": null, "table_name": "t"}"#)
            .expect("minimal snapshot should decode");
        assert_eq!(table.table_type, TableType::BaseTable);
        assert!(table.policies.is_empty());
        assert!(table.constraints.is_empty());

        let view = TableSchema::from_json(r#"{"table_name": "v", "type": "VIEW"}"#)
            .expect("view snapshot should decode");
        assert_eq!(view.table_type, TableType::View);

        let foreign = TableSchema::from_json(r#"{"table_name": "f", "type": "FOREIGN"}"#)
            .expect("foreign snapshot should decode");
        assert_eq!(foreign.table_type, TableType::Other("FOREIGN".to_string()));
        assert_eq!(foreign.table_type.to_string(), "FOREIGN");
    }

    #[test]
    fn column_and_constraint_lookup() {
        let table = TableSchema::from_json(
            r#"{
                "schema": [
                    {"column_name": "id", "data_type": "text", "column_default": null, "is_nullable": "NO"},
                    {"column_name": "name", "data_type": "text", "column_default": null, "is_nullable": "YES"}
                ],
                "constraint": [
                    {"constraint_name": "pk__t", "column_name": "id", "constraint_type": "PRIMARY KEY"},
                    {"constraint_name": "fk__t", "column_name": "name", "constraint_type": "FOREIGN KEY"}
                ],
                "table_name": "t"
            }"#,
        )
        .expect("snapshot should decode");
        assert!(table.column("id").is_some_and(FieldSchema::is_not_null));
        assert!(table.column("name").is_some_and(|c| !c.is_not_null()));
        assert!(table.column("missing").is_none());
        assert_eq!(table.constraints_of(&ConstraintType::PrimaryKey).count(), 1);
        assert_eq!(table.constraints_of(&ConstraintType::Unique).count(), 0);
    }
}
