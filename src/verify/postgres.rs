//! Registry-driven verification of a table's live Postgres RLS policies.
//!
//! Each live policy is checked fail-fast: RLS flags and public grant first,
//! then the restrictive tenant policy against its canonical predicate, then
//! every other policy against the registry content. Once all policies pass,
//! the table must carry exactly one restrictive policy, at least one
//! permissive policy, and a live counterpart for every registry policy.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{Violation, ViolationKind};
use crate::parser::names::{permission_check_predicate, restrictive_policy_name};
use crate::registry::stage::{FileStage, TemplateStage};
use crate::snapshot::table::{TablePolicy, TableSchema};
use crate::verify::normalize::contains_normalized;

/// Registry policies of one table, with a "seen live" flag per name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagePolicySet {
    seen: BTreeMap<String, bool>,
    content: BTreeMap<String, String>,
}

impl StagePolicySet {
    /// True when the registry declares a policy with this name.
    pub fn contains(&self, name: &str) -> bool {
        self.seen.contains_key(name)
    }

    /// Expected content (`using` followed by `with_check`) of a policy.
    pub fn content(&self, name: &str) -> Option<&str> {
        self.content.get(name).map(String::as_str)
    }

    /// Record that a live policy with this name passed its checks.
    pub fn mark_seen(&mut self, name: &str) {
        if let Some(seen) = self.seen.get_mut(name) {
            *seen = true;
        }
    }

    /// Registry policy names with no live counterpart yet, in name order.
    pub fn unseen(&self) -> impl Iterator<Item = &str> {
        self.seen
            .iter()
            .filter(|(_, seen)| !**seen)
            .map(|(name, _)| name.as_str())
    }

    /// Number of declared policies.
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// True when nothing is declared.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    fn insert(&mut self, name: &str, content: String) {
        self.seen.insert(name.to_string(), false);
        self.content.insert(name.to_string(), content);
    }
}

/// Gather every Postgres policy the registry declares across a table's stages.
///
/// Generated policies (`postgres.policies`) come first within a stage, then
/// hand-written ones when the stage opts into custom policies. A later
/// declaration of the same name replaces the earlier content.
pub fn collect_stage_policies(stages: &[TemplateStage]) -> StagePolicySet {
    let mut set = StagePolicySet::default();
    for stage in stages {
        if let Some(postgres) = &stage.postgres {
            for policy in &postgres.policies {
                set.insert(&policy.name, policy.content.clone());
            }
        }
        if let Some(customs) = stage.custom_postgres_policies() {
            for policy in customs {
                set.insert(&policy.name, policy.content());
            }
        }
    }
    set
}

/// Per-table verifier state: expected policies plus mode counters.
#[derive(Debug)]
pub struct PostgresAccessControlVerifier<'a> {
    service: &'a str,
    expected: StagePolicySet,
    restrictive: usize,
    permissive: usize,
}

impl<'a> PostgresAccessControlVerifier<'a> {
    /// Verifier for one table of `service` against the given registry entry.
    pub fn new(service: &'a str, stage: &FileStage) -> Self {
        Self {
            service,
            expected: collect_stage_policies(&stage.template_stages),
            restrictive: 0,
            permissive: 0,
        }
    }

    /// Check one live policy and update the counters.
    pub fn check_policy(&mut self, policy: &TablePolicy) -> Result<(), Violation> {
        self.verify_enabled_rls(policy)?;
        self.verify_restrictive_multi_tenant(policy)?;
        self.verify_content(policy)?;

        self.expected.mark_seen(&policy.policy_name);
        if policy.is_restrictive() {
            self.restrictive += 1;
        } else {
            self.permissive += 1;
        }
        Ok(())
    }

    /// Run every policy of `table` through [`Self::check_policy`] and apply
    /// the table-level checks.
    pub fn run(mut self, table: &TableSchema) -> Result<(), Violation> {
        for policy in &table.policies {
            self.check_policy(policy)?;
        }
        self.finish(&table.table_name)
    }

    /// Table-level checks once every live policy passed.
    pub fn finish(self, table: &str) -> Result<(), Violation> {
        let service = self.service;
        if self.permissive == 0 {
            return Err(Violation::new(
                ViolationKind::MissingPermissivePolicy,
                table,
                service,
                format!("table {table} in service {service} missing permissive rls policy"),
            ));
        }
        if self.restrictive == 0 {
            return Err(Violation::new(
                ViolationKind::MissingRestrictivePolicy,
                table,
                service,
                format!("table {table} in service {service} missing restrictive rls policy"),
            ));
        }
        if self.restrictive != 1 {
            return Err(Violation::new(
                ViolationKind::WrongRestrictiveCount,
                table,
                service,
                format!(
                    "table {table} in service {service} must have only one restrictive policy instead of {} policies",
                    self.restrictive
                ),
            ));
        }
        if let Some(missing) = self.expected.unseen().next() {
            return Err(Violation::new(
                ViolationKind::MissingRegistryPolicy,
                table,
                service,
                format!("table {table} in service {service} missing {missing} policy"),
            ));
        }
        Ok(())
    }

    fn verify_enabled_rls(&self, policy: &TablePolicy) -> Result<(), Violation> {
        let table = &policy.table_name;
        let service = self.service;
        if !policy.force_row_security {
            return Err(Violation::new(
                ViolationKind::RlsNotForced,
                table,
                service,
                format!("please force row level security for table {table} in service {service}"),
            ));
        }
        if !policy.row_security {
            return Err(Violation::new(
                ViolationKind::RlsNotEnabled,
                table,
                service,
                format!("row security is not enable for table {table} in service {service}"),
            ));
        }
        if !policy.is_granted_to_public() {
            return Err(Violation::new(
                ViolationKind::NotGrantedToPublic,
                table,
                service,
                format!("policy for table {table} in service {service} is not granted to public"),
            ));
        }
        Ok(())
    }

    fn verify_restrictive_multi_tenant(&self, policy: &TablePolicy) -> Result<(), Violation> {
        let table = &policy.table_name;
        let service = self.service;
        let name = restrictive_policy_name(table);
        if policy.policy_name != name {
            return Ok(());
        }
        if !policy.is_restrictive() {
            return Err(Violation::new(
                ViolationKind::RestrictiveModeMismatch,
                table,
                service,
                format!("policy {name} on table {table} in service {service} must be restrictive policy"),
            ));
        }
        let canonical = permission_check_predicate(table);
        if policy.qual_text() != canonical {
            return Err(Violation::new(
                ViolationKind::PredicateMismatch,
                table,
                service,
                format!(
                    "function permission_check is not in policy for table {table} in service {service}. Please change to {canonical}"
                ),
            ));
        }
        if policy.with_check_text() != canonical {
            return Err(Violation::new(
                ViolationKind::PredicateMismatch,
                table,
                service,
                format!(
                    "with_check in policy does not use function permission_check for table {table} in service {service}. Please use with_check in policy with {canonical}"
                ),
            ));
        }
        Ok(())
    }

    fn verify_content(&self, policy: &TablePolicy) -> Result<(), Violation> {
        let table = &policy.table_name;
        let service = self.service;
        let name = &policy.policy_name;
        if *name == restrictive_policy_name(table) {
            return Ok(());
        }
        let Some(content) = self.expected.content(name) else {
            return Err(Violation::new(
                ViolationKind::UnexpectedPolicy,
                table,
                service,
                format!("policy {name} on table {table} in service {service} is unexpected policy"),
            ));
        };
        if !contains_normalized(content, policy.qual_text()) {
            return Err(Violation::new(
                ViolationKind::UsingMismatch,
                table,
                service,
                format!(
                    "policy {name} on table {table} in service {service} have content using is not correct"
                ),
            ));
        }
        if !contains_normalized(content, policy.with_check_text()) {
            return Err(Violation::new(
                ViolationKind::WithCheckMismatch,
                table,
                service,
                format!(
                    "policy {name} on table {table} in service {service} have content with check is not correct"
                ),
            ));
        }
        Ok(())
    }
}

/// Verify a table's live policies against its registry entry.
///
/// Entries that declare neither Postgres permissions nor custom policies are
/// not checked at all.
pub fn verify_postgres_rls(
    service: &str,
    table: &TableSchema,
    stage: &FileStage,
) -> Result<(), Violation> {
    if stage.bypasses_postgres() {
        debug!(service, table = %table.table_name, "no postgres declarations, skipping");
        return Ok(());
    }
    PostgresAccessControlVerifier::new(service, stage).run(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::stage::{CustomPostgresPolicy, PostgresPolicyStage, PostgresStage};
    use crate::snapshot::table::PolicyMode;

    fn policy(name: &str, mode: PolicyMode, qual: Option<&str>) -> TablePolicy {
        TablePolicy {
            table_name: "docs".to_string(),
            policy_name: name.to_string(),
            qual: qual.map(str::to_string),
            with_check: qual.map(str::to_string),
            row_security: true,
            force_row_security: true,
            permissive: mode,
            roles: vec!["public".to_string()],
        }
    }

    fn restrictive() -> TablePolicy {
        policy(
            "rls_docs_restrictive",
            PolicyMode::Restrictive,
            Some("permission_check(resource_path, 'docs'::text)"),
        )
    }

    fn stage() -> FileStage {
        FileStage {
            service: "bob".to_string(),
            table_name: "docs".to_string(),
            template_stages: vec![TemplateStage {
                postgres: Some(PostgresStage {
                    policies: vec![PostgresPolicyStage {
                        name: "rls_docs".to_string(),
                        content: "owner = current_user".to_string(),
                    }],
                }),
                use_custom_policy: Some(true),
                postgres_policies: Some(vec![CustomPostgresPolicy {
                    name: "rls_docs_custom".to_string(),
                    using: "1 = 1".to_string(),
                    with_check: String::new(),
                    command: None,
                }]),
                ..TemplateStage::default()
            }],
            ..FileStage::default()
        }
    }

    fn table(policies: Vec<TablePolicy>) -> TableSchema {
        TableSchema {
            schema: Vec::new(),
            policies,
            constraints: Vec::new(),
            table_name: "docs".to_string(),
            table_type: Default::default(),
            owner: None,
        }
    }

    #[test]
    fn collects_generated_and_custom_policies() {
        let set = collect_stage_policies(&stage().template_stages);
        assert_eq!(set.len(), 2);
        assert_eq!(set.content("rls_docs"), Some("owner = current_user"));
        assert_eq!(set.content("rls_docs_custom"), Some("1 = 1"));
        assert_eq!(set.unseen().collect::<Vec<_>>(), ["rls_docs", "rls_docs_custom"]);
    }

    #[test]
    fn passes_when_every_declared_policy_is_live() {
        let live = table(vec![
            restrictive(),
            policy("rls_docs", PolicyMode::Permissive, Some("(owner = CURRENT_USER)")),
            policy("rls_docs_custom", PolicyMode::Permissive, Some("(1 = 1)")),
        ]);
        assert_eq!(verify_postgres_rls("bob", &live, &stage()), Ok(()));
    }

    #[test]
    fn two_restrictive_policies_are_rejected() {
        let mut second = restrictive();
        second.policy_name = "rls_docs_custom".to_string();
        second.qual = Some("1 = 1".to_string());
        second.with_check = None;
        let live = table(vec![
            restrictive(),
            second,
            policy("rls_docs", PolicyMode::Permissive, Some("owner = current_user")),
        ]);
        let violation = verify_postgres_rls("bob", &live, &stage()).expect_err("should fail");
        assert_eq!(violation.kind, ViolationKind::WrongRestrictiveCount);
        assert_eq!(
            violation.message,
            "table docs in service bob must have only one restrictive policy instead of 2 policies"
        );
    }

    #[test]
    fn restrictive_policy_must_be_declared_restrictive() {
        let mut wrong = restrictive();
        wrong.permissive = PolicyMode::Permissive;
        let violation = verify_postgres_rls("bob", &table(vec![wrong]), &stage())
            .expect_err("permissive tenant policy should fail");
        assert_eq!(violation.kind, ViolationKind::RestrictiveModeMismatch);
        assert_eq!(
            violation.message,
            "policy rls_docs_restrictive on table docs in service bob must be restrictive policy"
        );
    }

    #[test]
    fn restrictive_predicate_is_compared_exactly() {
        let mut wrong = restrictive();
        wrong.qual = Some("permission_check(resource_path, 'docs')".to_string());
        let violation = verify_postgres_rls("bob", &table(vec![wrong]), &stage())
            .expect_err("uncast predicate should fail");
        assert_eq!(violation.kind, ViolationKind::PredicateMismatch);
        assert!(violation
            .message
            .starts_with("function permission_check is not in policy for table docs"));

        let mut wrong_check = restrictive();
        wrong_check.with_check = None;
        let violation = verify_postgres_rls("bob", &table(vec![wrong_check]), &stage())
            .expect_err("missing with_check should fail");
        assert!(violation
            .message
            .starts_with("with_check in policy does not use function permission_check"));
    }

    #[test]
    fn bypassed_stage_is_not_checked() {
        let bypassed = FileStage {
            service: "bob".to_string(),
            table_name: "docs".to_string(),
            ..FileStage::default()
        };
        assert_eq!(verify_postgres_rls("bob", &table(Vec::new()), &bypassed), Ok(()));
    }
}
