use serde::{Deserialize, Serialize};

/// DML command a policy or permission applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyCommand {
    /// SELECT only.
    #[serde(alias = "SELECT")]
    Select,
    /// INSERT only.
    #[serde(alias = "INSERT")]
    Insert,
    /// UPDATE only.
    #[serde(alias = "UPDATE")]
    Update,
    /// DELETE only.
    #[serde(alias = "DELETE")]
    Delete,
    /// All DML commands.
    #[serde(alias = "ALL")]
    All,
}

impl PolicyCommand {
    /// The four commands Hasura tracks permissions for.
    pub const HASURA: [PolicyCommand; 4] = [
        PolicyCommand::Select,
        PolicyCommand::Insert,
        PolicyCommand::Update,
        PolicyCommand::Delete,
    ];

    /// Lowercase keyword.
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyCommand::Select => "select",
            PolicyCommand::Insert => "insert",
            PolicyCommand::Update => "update",
            PolicyCommand::Delete => "delete",
            PolicyCommand::All => "all",
        }
    }
}

impl std::fmt::Display for PolicyCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generated Postgres policy: name plus its full expected content.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PostgresPolicyStage {
    /// Policy name.
    pub name: String,
    /// Expected `USING` and `WITH CHECK` text, concatenated.
    #[serde(default)]
    pub content: String,
}

/// Postgres section produced by a template.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PostgresStage {
    /// Generated policies.
    #[serde(default)]
    pub policies: Vec<PostgresPolicyStage>,
}

/// Hand-written Postgres policy carried by a custom-policy stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomPostgresPolicy {
    /// Policy name.
    pub name: String,
    /// `USING` expression; empty when absent.
    #[serde(default)]
    pub using: String,
    /// `WITH CHECK` expression; empty when absent.
    #[serde(default)]
    pub with_check: String,
    /// Command the policy is declared `FOR`.
    #[serde(rename = "for", default)]
    pub command: Option<PolicyCommand>,
}

impl CustomPostgresPolicy {
    /// Registry content as compared against live policies.
    pub fn content(&self) -> String {
        format!("{}{}", self.using, self.with_check)
    }
}

/// Expected Hasura permission for one role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HasuraRoleRule {
    /// Hasura role name.
    pub name: String,
    /// Row filter (`select`/`update`/`delete`).
    #[serde(default)]
    pub filter: Option<serde_json::Value>,
    /// Row check (`insert`/`update`).
    #[serde(default)]
    pub check: Option<serde_json::Value>,
}

/// Expected Hasura permissions per command.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HasuraPolicies {
    /// Select rules.
    #[serde(default)]
    pub select_permission: Option<Vec<HasuraRoleRule>>,
    /// Insert rules.
    #[serde(default)]
    pub insert_permission: Option<Vec<HasuraRoleRule>>,
    /// Update rules.
    #[serde(default)]
    pub update_permission: Option<Vec<HasuraRoleRule>>,
    /// Delete rules.
    #[serde(default)]
    pub delete_permission: Option<Vec<HasuraRoleRule>>,
}

impl HasuraPolicies {
    /// Rules declared for one command.
    pub fn rules(&self, command: PolicyCommand) -> &[HasuraRoleRule] {
        let rules = match command {
            PolicyCommand::Select => self.select_permission.as_deref(),
            PolicyCommand::Insert => self.insert_permission.as_deref(),
            PolicyCommand::Update => self.update_permission.as_deref(),
            PolicyCommand::Delete => self.delete_permission.as_deref(),
            PolicyCommand::All => None,
        };
        rules.unwrap_or_default()
    }
}

/// Hasura section produced by a template.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HasuraStage {
    /// Metadata file the template was applied to.
    #[serde(default)]
    pub stage_dir: Option<String>,
    /// Commands the template granted.
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Relationship used to join the permission table.
    #[serde(default)]
    pub relationship: Option<String>,
    /// Relationship path used as the first hop of the filter.
    #[serde(default)]
    pub first_level_query: Option<String>,
    /// Expected role rules.
    #[serde(default)]
    pub hasura_policies: Option<HasuraPolicies>,
}

/// Which layers a template granted permissions on.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StagePermissions {
    /// Postgres commands.
    #[serde(default)]
    pub postgres: Option<Vec<String>>,
    /// Hasura commands.
    #[serde(default)]
    pub hasura: Option<Vec<String>>,
}

/// One template applied to a table.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TemplateStage {
    /// Template identifier (`"1"`, `"1.1"`, `"4"`, ...).
    #[serde(default)]
    pub template: String,
    /// Generated Hasura section.
    #[serde(default)]
    pub hasura: Option<HasuraStage>,
    /// Generated Postgres section.
    #[serde(default)]
    pub postgres: Option<PostgresStage>,
    /// Access-path table the template joins through.
    #[serde(rename = "accessPathTable", default)]
    pub access_path_table: Option<String>,
    /// Location column.
    #[serde(rename = "locationCol", default)]
    pub location_col: Option<String>,
    /// Permission name prefix (`accesscontrol.<table>`).
    #[serde(rename = "permissionPrefix", default)]
    pub permission_prefix: Option<String>,
    /// Granted layers.
    #[serde(default)]
    pub permissions: Option<StagePermissions>,
    /// Owner column for owner-based templates.
    #[serde(rename = "ownerCol", default)]
    pub owner_col: Option<String>,
    /// True when the stage carries hand-written policies.
    #[serde(default)]
    pub use_custom_policy: Option<bool>,
    /// Hand-written Hasura rules.
    #[serde(default)]
    pub hasura_policies: Option<HasuraPolicies>,
    /// Hand-written Postgres policies.
    #[serde(default)]
    pub postgres_policies: Option<Vec<CustomPostgresPolicy>>,
}

impl TemplateStage {
    /// True when `use_custom_policy` is set.
    pub fn uses_custom_policy(&self) -> bool {
        self.use_custom_policy.unwrap_or(false)
    }

    /// Hand-written Postgres policies, only when the stage opts into them.
    pub fn custom_postgres_policies(&self) -> Option<&[CustomPostgresPolicy]> {
        if !self.uses_custom_policy() {
            return None;
        }
        self.postgres_policies.as_deref()
    }

    /// True when the stage declares anything the Postgres verifier checks.
    pub fn declares_postgres(&self) -> bool {
        let granted = self
            .permissions
            .as_ref()
            .is_some_and(|p| p.postgres.is_some());
        granted || self.postgres_policies.is_some()
    }

    /// Every Hasura rule set that applies: generated first, then custom.
    pub fn hasura_policy_sets(&self) -> impl Iterator<Item = &HasuraPolicies> {
        let generated = self.hasura.as_ref().and_then(|h| h.hasura_policies.as_ref());
        let custom = if self.uses_custom_policy() {
            self.hasura_policies.as_ref()
        } else {
            None
        };
        generated.into_iter().chain(custom)
    }
}

/// Registry entry for one table in one service.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FileStage {
    /// Source YAML the entry was generated from.
    #[serde(default)]
    pub filename: String,
    /// Owning service.
    pub service: String,
    /// Entry revision.
    #[serde(default)]
    pub revision: u32,
    /// Table name.
    pub table_name: String,
    /// Applied templates.
    #[serde(rename = "stages", default)]
    pub template_stages: Vec<TemplateStage>,
}

impl FileStage {
    /// True when no stage declares Postgres permissions; the Postgres check is bypassed.
    pub fn bypasses_postgres(&self) -> bool {
        !self.template_stages.iter().any(TemplateStage::declares_postgres)
    }
}
