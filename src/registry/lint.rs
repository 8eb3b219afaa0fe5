use tracing::debug;

use crate::error::{Violation, ViolationKind, Violations};
use crate::parser::predicate::{called_functions, parse_predicate};
use crate::registry::stage::FileStage;
use crate::registry::store::PolicyRegistry;

/// Check that every hand-written predicate in one entry parses as PostgreSQL.
///
/// Empty `using`/`with_check` fields mean "absent" and are skipped.
pub fn lint_stage(stage: &FileStage) -> Result<(), Violations> {
    let mut violations = Violations::new();
    for template in &stage.template_stages {
        let Some(policies) = template.postgres_policies.as_deref() else {
            continue;
        };
        for policy in policies {
            for (clause, text) in [("using", &policy.using), ("with_check", &policy.with_check)] {
                if text.trim().is_empty() {
                    continue;
                }
                match parse_predicate(text) {
                    Ok(expr) => debug!(
                        policy = %policy.name,
                        clause,
                        functions = ?called_functions(&expr),
                        "registry predicate parsed"
                    ),
                    Err(reason) => violations.push(Violation::new(
                        ViolationKind::UnparseablePredicate,
                        &stage.table_name,
                        &stage.service,
                        format!(
                            "policy {} on table {} in service {} has unparseable {clause}: {reason}",
                            policy.name, stage.table_name, stage.service
                        ),
                    )),
                }
            }
        }
    }
    violations.into_result()
}

/// Lint every registry entry.
pub fn lint_registry(registry: &PolicyRegistry) -> Result<(), Violations> {
    let mut violations = Violations::new();
    for stage in registry.stages() {
        violations.record_all(lint_stage(stage));
    }
    violations.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage_with(using: &str, with_check: &str) -> FileStage {
        serde_json::from_value(serde_json::json!({
            "service": "bob",
            "table_name": "docs",
            "stages": [{
                "template": "1.1",
                "use_custom_policy": true,
                "postgres_policies": [
                    {"name": "rls_docs_custom", "using": using, "with_check": with_check, "for": "all"}
                ]
            }]
        }))
        .expect("stage should decode")
    }

    #[test]
    fn accepts_well_formed_predicates() {
        let stage = stage_with(
            "current_setting('app.user_id') = owners\n",
            "(\n  1 = 1\n)\n",
        );
        assert!(lint_stage(&stage).is_ok());
    }

    #[test]
    fn reports_each_broken_clause() {
        let stage = stage_with("owners = (", "1 = 1 1");
        let violations = lint_stage(&stage).expect_err("broken predicates should be reported");
        assert_eq!(violations.len(), 2);
        assert!(violations
            .iter()
            .all(|v| v.kind == ViolationKind::UnparseablePredicate));
        assert!(violations.as_slice()[0]
            .message
            .starts_with("policy rls_docs_custom on table docs in service bob has unparseable using"));
    }

    #[test]
    fn registry_lint_walks_every_entry() {
        let registry = PolicyRegistry::from_stages([stage_with("", ""), stage_with("(", "")]);
        // Same (service, table) key: the later entry wins.
        assert_eq!(registry.len(), 1);
        assert_eq!(
            lint_registry(&registry)
                .expect_err("broken entry should be reported")
                .len(),
            1
        );
    }
}
