//! CLI entry point for `rlsguard`.

use std::path::PathBuf;
use std::process;
use std::str::FromStr;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rlsguard::config::VerifierConfig;
use rlsguard::hasura::metadata::HasuraLayout;
use rlsguard::output::formatter;
use rlsguard::verify::audit::{AuditReport, Auditor, Check};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}. Expected text or json")),
        }
    }
}

#[derive(Parser)]
#[command(
    name = "rlsguard",
    about = "Verify PostgreSQL RLS policies and Hasura permissions against an access-control registry"
)]
struct Cli {
    /// YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Root of `<service>/<table>.json` schema snapshots
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    /// Access-control registry (`stage.json`)
    #[arg(long)]
    stage_file: Option<PathBuf>,

    /// Tables exempt from the simple RLS convention
    #[arg(long)]
    ignore_tables: Option<PathBuf>,

    /// Directory of CDC connector configs
    #[arg(long)]
    connector_dir: Option<PathBuf>,

    /// Charts root holding per-service Hasura metadata
    #[arg(long)]
    hasura_root: Option<PathBuf>,

    /// Hasura metadata layout (v1 or v2)
    #[arg(long)]
    hasura_layout: Option<HasuraLayout>,

    /// Root of `<service>/<table>.json` entity descriptors
    #[arg(long)]
    entity_dir: Option<PathBuf>,

    /// Table owner exempt from the simple RLS convention (repeatable)
    #[arg(long = "bypass-account")]
    bypass_accounts: Vec<String>,

    /// Check to run (repeatable); defaults to every configured check
    #[arg(long = "check")]
    checks: Vec<Check>,

    /// Write a Markdown report and JSON violation dump here
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Artifact name prefix
    #[arg(long, default_value = "rlsguard")]
    name: String,

    /// Stdout format
    #[arg(long, default_value = "text")]
    format: OutputFormat,

    /// Print verbose diagnostics
    #[arg(long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_config(cli: &Cli) -> VerifierConfig {
    let mut config = match &cli.config {
        Some(path) => match VerifierConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading config: {e}");
                process::exit(2);
            }
        },
        None => VerifierConfig::default(),
    };

    if let Some(dir) = &cli.snapshot_dir {
        config.snapshot_dir = dir.clone();
    }
    if let Some(file) = &cli.stage_file {
        config.stage_file = file.clone();
    }
    if cli.ignore_tables.is_some() {
        config.ignore_tables_file = cli.ignore_tables.clone();
    }
    if cli.connector_dir.is_some() {
        config.connector_dir = cli.connector_dir.clone();
    }
    if cli.hasura_root.is_some() {
        config.hasura_root = cli.hasura_root.clone();
    }
    if let Some(layout) = cli.hasura_layout {
        config.hasura_layout = layout;
    }
    if cli.entity_dir.is_some() {
        config.entity_dir = cli.entity_dir.clone();
    }
    config
        .bypass_rls_accounts
        .extend(cli.bypass_accounts.iter().cloned());
    config
}

fn print_report(report: &AuditReport, format: OutputFormat) {
    match format {
        OutputFormat::Text => {
            for violation in report.violations() {
                println!("{}", violation.message);
            }
        }
        OutputFormat::Json => match serde_json::to_string_pretty(report) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing report: {e}");
                process::exit(2);
            }
        },
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = build_config(&cli);

    let mut checks: Vec<Check> = Vec::new();
    for check in &cli.checks {
        if !checks.contains(check) {
            checks.push(*check);
        }
    }
    if checks.is_empty() {
        checks = config.available_checks();
    }

    let report = match Auditor::new(config).run(&checks) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(2);
        }
    };

    for outcome in &report.checks {
        info!(
            check = %outcome.check,
            violations = outcome.violations.len(),
            "{}",
            if outcome.passed() { "passed" } else { "failed" }
        );
    }
    print_report(&report, cli.format);

    if let Some(dir) = &cli.output_dir {
        if let Err(e) = formatter::write_output(dir, &cli.name, &report) {
            eprintln!("Error writing output: {e}");
            process::exit(2);
        }
    }

    if !report.passed() {
        process::exit(1);
    }
}
