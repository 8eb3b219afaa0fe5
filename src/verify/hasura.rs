//! Verification of Hasura role permissions against the registry.
//!
//! Each of the four commands is checked on its own and every failing command
//! is reported; within one command the first filter/check mismatch stops that
//! command's comparison.

use std::collections::BTreeMap;

use tracing::info;

use crate::error::{Violation, ViolationKind, Violations};
use crate::hasura::metadata::{HasuraTable, RolePermission};
use crate::registry::stage::{FileStage, HasuraRoleRule, PolicyCommand};
use crate::verify::normalize::contains_normalized;

type RoleRules<'a> = BTreeMap<&'a str, Vec<&'a HasuraRoleRule>>;

/// Compares one table's Hasura metadata with its registry entry.
#[derive(Debug)]
pub struct HasuraAccessControlVerifier<'a> {
    metadata: &'a HasuraTable,
    stage: &'a FileStage,
    expected: BTreeMap<PolicyCommand, RoleRules<'a>>,
}

impl<'a> HasuraAccessControlVerifier<'a> {
    /// Build the per-command role maps from every stage of the entry.
    pub fn new(metadata: &'a HasuraTable, stage: &'a FileStage) -> Self {
        let mut expected: BTreeMap<PolicyCommand, RoleRules<'a>> = BTreeMap::new();
        for template in &stage.template_stages {
            for policies in template.hasura_policy_sets() {
                for command in PolicyCommand::HASURA {
                    for rule in policies.rules(command) {
                        expected
                            .entry(command)
                            .or_default()
                            .entry(rule.name.as_str())
                            .or_default()
                            .push(rule);
                    }
                }
            }
        }
        Self {
            metadata,
            stage,
            expected,
        }
    }

    /// Roles the registry expects for a command, in name order.
    pub fn expected_roles(&self, command: PolicyCommand) -> Vec<&str> {
        self.expected
            .get(&command)
            .map(|roles| roles.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Check all four commands and report every violation found.
    pub fn run(&self) -> Result<(), Violations> {
        let mut violations = Violations::new();
        for command in PolicyCommand::HASURA {
            violations.record_all(self.verify_command(command));
        }
        violations.into_result()
    }

    fn table(&self) -> &str {
        &self.stage.table_name
    }

    fn violation(&self, kind: ViolationKind, message: String) -> Violation {
        Violation::new(kind, self.table(), &self.stage.service, message)
    }

    fn verify_command(&self, command: PolicyCommand) -> Result<(), Violations> {
        let expected = self.expected.get(&command);
        let has_expected = expected.is_some_and(|roles| !roles.is_empty());
        let Some(live) = self.metadata.permissions(command) else {
            if has_expected {
                return Err(self
                    .violation(
                        ViolationKind::MissingHasuraPermission,
                        format!(
                            "role ({command}) on table {} missing {command} permission",
                            self.table()
                        ),
                    )
                    .into());
            }
            return Ok(());
        };

        let mut seen: BTreeMap<&str, bool> = expected
            .map(|roles| roles.keys().map(|role| (*role, false)).collect())
            .unwrap_or_default();
        for permission in live {
            self.compare_permission(command, permission)
                .map_err(Violations::from)?;
            if let Some(flag) = seen.get_mut(permission.role.as_str()) {
                *flag = true;
            }
        }

        seen.into_iter()
            .filter(|(_, seen)| !seen)
            .map(|(role, _)| {
                self.violation(
                    ViolationKind::MissingHasuraRole,
                    format!(
                        "role ({command}) on table {} missing permission: {role}",
                        self.table()
                    ),
                )
            })
            .collect::<Violations>()
            .into_result()
    }

    fn compare_permission(
        &self,
        command: PolicyCommand,
        permission: &RolePermission,
    ) -> Result<(), Violation> {
        let role = permission.role.as_str();
        let Some(rules) = self.expected.get(&command).and_then(|roles| roles.get(role)) else {
            info!(
                command = %command,
                role,
                table = self.table(),
                "role is not tracked in the registry"
            );
            return Ok(());
        };

        let (filter, check) = match command {
            PolicyCommand::Select => (permission.permission.filter.as_ref(), None),
            PolicyCommand::Insert => (None, permission.permission.check.as_ref()),
            _ => (
                permission.permission.filter.as_ref(),
                permission.permission.check.as_ref(),
            ),
        };
        let live_filter = live_text(filter);
        let live_check = live_text(check);

        for rule in rules {
            if !contains_normalized(&live_filter, &stage_text(rule.filter.as_ref())) {
                return Err(self.violation(
                    ViolationKind::HasuraFilterMismatch,
                    format!(
                        "role ({command}) {role} on table {} have content of filter is not correct",
                        self.table()
                    ),
                ));
            }
            if !contains_normalized(&live_check, &stage_text(rule.check.as_ref())) {
                return Err(self.violation(
                    ViolationKind::HasuraCheckMismatch,
                    format!(
                        "role ({command}) {role} on table {} have content of check is not correct",
                        self.table()
                    ),
                ));
            }
        }
        Ok(())
    }
}

/// YAML rendering of a live expression with mapping keys sorted.
fn live_text(value: Option<&serde_yaml::Value>) -> String {
    let Some(value) = value.filter(|v| !v.is_null()) else {
        return String::new();
    };
    // Mappings keep file order; going through a JSON value sorts the keys.
    let rendered = match serde_json::to_value(value) {
        Ok(sorted) => serde_yaml::to_string(&sorted),
        Err(_) => serde_yaml::to_string(value),
    };
    rendered.unwrap_or_default()
}

/// JSON rendering of a registry expression.
fn stage_text(value: Option<&serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(value) => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// Verify one table's Hasura metadata against its registry entry.
pub fn verify_table_hasura_ac(stage: &FileStage, metadata: &HasuraTable) -> Result<(), Violations> {
    HasuraAccessControlVerifier::new(metadata, stage).run()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_rendering_ignores_key_order() {
        let a: serde_yaml::Value =
            serde_yaml::from_str("b: 1\na: {_eq: X-Hasura-User-Id}").expect("yaml should parse");
        let b: serde_yaml::Value =
            serde_yaml::from_str("a: {_eq: X-Hasura-User-Id}\nb: 1").expect("yaml should parse");
        assert_eq!(live_text(Some(&a)), live_text(Some(&b)));
        assert_eq!(live_text(None), "");
        assert_eq!(live_text(Some(&serde_yaml::Value::Null)), "");
    }

    #[test]
    fn stage_rendering_treats_null_as_absent() {
        assert_eq!(stage_text(None), "");
        assert_eq!(stage_text(Some(&serde_json::Value::Null)), "");
        assert_eq!(
            stage_text(Some(&serde_json::json!({"owner": {"_eq": "X-Hasura-User-Id"}}))),
            r#"{"owner":{"_eq":"X-Hasura-User-Id"}}"#
        );
    }

    #[test]
    fn untracked_live_roles_are_accepted() {
        let metadata: Vec<HasuraTable> = serde_yaml::from_str(
            r"
- table: {schema: public, name: docs}
  select_permissions:
  - role: GUEST
    permission:
      filter: {}
",
        )
        .expect("metadata should decode");
        let stage = FileStage {
            service: "bob".to_string(),
            table_name: "docs".to_string(),
            ..FileStage::default()
        };
        let verifier = HasuraAccessControlVerifier::new(&metadata[0], &stage);
        assert!(verifier.expected_roles(PolicyCommand::Select).is_empty());
        assert_eq!(verifier.run(), Ok(()));
    }
}
