/// Syntax lint for hand-written registry predicates.
pub mod lint;
/// Serde model of registry entries (`FileStage`/`TemplateStage`).
pub mod stage;
/// Indexed registry loaded from `stage.json`.
pub mod store;
