/// Grantee name that makes a policy apply to every role.
pub const PUBLIC_ROLE: &str = "public";

/// Return the identifier without surrounding double quotes.
pub fn unquote_identifier(ident: &str) -> &str {
    ident
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(ident)
}

/// Normalize an identifier for case-insensitive matching.
///
/// Trims whitespace, removes surrounding double quotes on a single identifier,
/// and lowercases the result.
pub fn normalize_identifier(ident: &str) -> String {
    unquote_identifier(ident.trim()).to_ascii_lowercase()
}

/// Name of the single permissive policy under the legacy multi-tenant convention.
pub fn permissive_policy_name(table: &str) -> String {
    format!("rls_{table}")
}

/// Name of the tenant-isolation restrictive policy.
pub fn restrictive_policy_name(table: &str) -> String {
    format!("rls_{table}_restrictive")
}

/// Canonical tenant-isolation predicate as Postgres renders it in `pg_policies`.
pub fn permission_check_predicate(table: &str) -> String {
    format!("permission_check(resource_path, '{table}'::text)")
}

/// True when the grantee list contains `public`.
pub fn is_granted_to_public<S: AsRef<str>>(roles: &[S]) -> bool {
    roles
        .iter()
        .any(|role| normalize_identifier(role.as_ref()) == PUBLIC_ROLE)
}
