use std::fmt;

use crate::verify::audit::AuditReport;

/// Markdown rendering of an [`AuditReport`].
pub struct MarkdownReport<'a>(pub &'a AuditReport);

impl fmt::Display for MarkdownReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.0;
        writeln!(f, "# rlsguard Audit Report")?;
        writeln!(f)?;

        writeln!(f, "## Summary")?;
        writeln!(f)?;
        writeln!(f, "| Check | Status | Violations |")?;
        writeln!(f, "|-------|--------|------------|")?;
        for outcome in &report.checks {
            let status = if outcome.passed() { "PASS" } else { "FAIL" };
            writeln!(
                f,
                "| {} | {} | {} |",
                outcome.check,
                status,
                outcome.violations.len()
            )?;
        }

        writeln!(f)?;
        writeln!(f, "## Violations")?;
        writeln!(f)?;
        if report.passed() {
            return writeln!(f, "No violations found.");
        }
        for outcome in report.checks.iter().filter(|o| !o.passed()) {
            writeln!(f, "### {}", outcome.check)?;
            writeln!(f)?;
            for violation in &outcome.violations {
                let scope = match &violation.service {
                    Some(service) => format!("{service}/{}", violation.table),
                    None => violation.table.clone(),
                };
                writeln!(f, "- **[{}]** `{scope}`: {}", violation.kind, violation.message)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Build the Markdown audit report.
pub fn build_report(report: &AuditReport) -> String {
    MarkdownReport(report).to_string()
}
