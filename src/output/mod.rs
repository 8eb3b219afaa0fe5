/// Writes the audit report and violation dump to disk.
pub mod formatter;
/// Builds a Markdown summary report from audit outcomes.
pub mod report;
