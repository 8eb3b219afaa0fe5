/// Tables exempt from RLS verification.
pub mod ignore;
/// Directory-backed snapshot store and shared file loaders.
pub mod store;
/// Serde model of one table snapshot (columns, constraints, live policies).
pub mod table;
