/// Per-check drivers over all services and the `Auditor` that runs them.
pub mod audit;
/// Schema-drift comparison between CDC sources and sinks.
pub mod drift;
/// Entity field mappings checked against table snapshots.
pub mod entity;
/// Hasura role permissions checked against the registry.
pub mod hasura;
/// The simple `rls_<table>` / `rls_<table>_restrictive` convention.
pub mod legacy;
/// Predicate text normalization.
pub mod normalize;
/// Live Postgres policies checked against the registry.
pub mod postgres;
/// Access-control propagation along CDC replication edges.
pub mod sink;
