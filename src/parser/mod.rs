/// Identifier helpers and the `rls_<table>` naming convention.
pub mod names;
/// `sqlparser` wrapper for policy predicates.
pub mod predicate;
