/// Hasura `tables.yaml` model and per-service metadata loading.
pub mod metadata;
