use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::error::{Violation, ViolationKind};
use crate::parser::names::{
    permission_check_predicate, permissive_policy_name, restrictive_policy_name,
};
use crate::snapshot::ignore::IgnoreTables;
use crate::snapshot::table::{TablePolicy, TableSchema, TableType};

/// Verify the simple multi-tenant convention on one table: a permissive
/// `rls_<t>` and a restrictive `rls_<t>_restrictive`, both using the canonical
/// `permission_check` predicate verbatim.
///
/// Tables in `ignore` or registered in `ac_tables` (checked by the registry
/// verifier instead) are skipped, as are tables owned by a bypass account.
pub fn verify_rls(
    service: &str,
    table: &TableSchema,
    ignore: &IgnoreTables,
    bypass_accounts: &[String],
    ac_tables: &BTreeMap<String, BTreeSet<String>>,
) -> Result<(), Violation> {
    let name = table.table_name.as_str();
    if ignore.contains(service, name) {
        debug!(service, table = name, "table ignored");
        return Ok(());
    }
    if ac_tables
        .get(service)
        .is_some_and(|tables| tables.contains(name))
    {
        debug!(service, table = name, "table has registry access control");
        return Ok(());
    }
    if let Some(owner) = &table.owner {
        if bypass_accounts.iter().any(|account| account == owner) {
            debug!(service, table = name, owner = %owner, "owner bypasses rls");
            return Ok(());
        }
    }
    if table.table_type != TableType::BaseTable {
        return Err(Violation::new(
            ViolationKind::UnsupportedTableType,
            name,
            service,
            format!(
                "table {name} in service {service} has unsupported type {}",
                table.table_type
            ),
        ));
    }

    let mut permissive = false;
    let mut restrictive = false;
    for policy in &table.policies {
        check_policy(service, name, policy)?;
        if policy.is_restrictive() {
            restrictive = true;
        } else {
            permissive = true;
        }
    }

    if !permissive {
        return Err(Violation::new(
            ViolationKind::MissingPermissivePolicy,
            name,
            service,
            format!("table {name} in service {service} missing permissive rls policy"),
        ));
    }
    if !restrictive {
        return Err(Violation::new(
            ViolationKind::MissingRestrictivePolicy,
            name,
            service,
            format!("table {name} in service {service} missing restrictive rls policy"),
        ));
    }
    Ok(())
}

fn check_policy(service: &str, table: &str, policy: &TablePolicy) -> Result<(), Violation> {
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
    if !policy.is_granted_to_public() {
        return Err(Violation::new(
            ViolationKind::NotGrantedToPublic,
            table,
            service,
            format!("policy for table {table} in service {service} is not granted to public"),
        ));
    }

    let expected = if policy.is_restrictive() {
        restrictive_policy_name(table)
    } else {
        permissive_policy_name(table)
    };
    if policy.policy_name != expected {
        return Err(Violation::new(
            ViolationKind::WrongPolicyName,
            table,
            service,
            format!(
                "policy {} on table {table} in service {service} must be named {expected}",
                policy.policy_name
            ),
        ));
    }
    Ok(())
}
