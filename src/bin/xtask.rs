use std::collections::HashSet;
use std::env;
use std::process::{Command, ExitCode};

const BLESS_ENV: &str = "RLSGUARD_BLESS";

fn print_usage() {
    eprintln!(
        "Usage:
  cargo run --bin xtask -- precommit [--locked]
  cargo run --bin xtask -- ci [--locked]
  cargo run --bin xtask -- bless [--locked]"
    );
}

fn run_command(program: &str, args: &[&str], envs: &[(&str, &str)]) -> Result<(), String> {
    eprintln!("+ {program} {}", args.join(" "));
    let status = Command::new(program)
        .args(args)
        .envs(envs.iter().copied())
        .status()
        .map_err(|error| format!("Failed to run `{program}`: {error}"))?;

    if status.success() {
        Ok(())
    } else {
        Err(format!(
            "Command `{program} {}` exited with status {status}",
            args.join(" ")
        ))
    }
}

fn cargo_args_with_locked(args: &[&str], locked: bool) -> Vec<String> {
    if !locked {
        return args.iter().map(ToString::to_string).collect();
    }

    let mut out = Vec::with_capacity(args.len() + 1);
    let mut inserted = false;
    for arg in args {
        if !inserted && *arg == "--" {
            out.push("--locked".to_string());
            inserted = true;
        }
        out.push((*arg).to_string());
    }
    if !inserted {
        out.push("--locked".to_string());
    }

    out
}

fn run_cargo(args: &[&str], locked: bool, envs: &[(&str, &str)]) -> Result<(), String> {
    let args = cargo_args_with_locked(args, locked);
    let arg_refs = args.iter().map(String::as_str).collect::<Vec<_>>();
    run_command("cargo", &arg_refs, envs)
}

fn run_precommit(locked: bool) -> Result<(), String> {
    run_command("cargo", &["fmt", "--all", "--", "--check"], &[])?;
    run_command(
        "cargo",
        &["clippy", "--all-targets", "--", "-D", "warnings"],
        &[],
    )?;
    run_cargo(&["test", "--lib", "--tests"], locked, &[])
}

fn run_ci(locked: bool) -> Result<(), String> {
    run_precommit(locked)?;
    run_cargo(&["test", "--doc"], locked, &[])
}

/// Rerun the golden-file tests with blessing enabled so they rewrite their expectations.
fn run_bless(locked: bool) -> Result<(), String> {
    run_cargo(&["test", "--test", "sink_ac_golden_tests"], locked, &[(BLESS_ENV, "1")])
}

fn parse_flags(rest: &[String], allowed: &[&str]) -> Result<HashSet<String>, ExitCode> {
    let allowed_set: HashSet<&str> = allowed.iter().copied().collect();
    let mut flags = HashSet::new();

    for flag in rest {
        if !allowed_set.contains(flag.as_str()) {
            eprintln!("Unknown option: {flag}");
            print_usage();
            return Err(ExitCode::from(2));
        }
        flags.insert(flag.clone());
    }

    Ok(flags)
}

fn main() -> ExitCode {
    let mut args = env::args().skip(1);
    let Some(command) = args.next() else {
        print_usage();
        return ExitCode::from(2);
    };

    let runner: fn(bool) -> Result<(), String> = match command.as_str() {
        "precommit" => run_precommit,
        "ci" => run_ci,
        "bless" => run_bless,
        _ => {
            eprintln!("Unknown command: {command}");
            print_usage();
            return ExitCode::from(2);
        }
    };

    let rest: Vec<String> = args.collect();
    let flags = match parse_flags(&rest, &["--locked"]) {
        Ok(flags) => flags,
        Err(code) => return code,
    };

    match runner(flags.contains("--locked")) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{error}");
            ExitCode::from(1)
        }
    }
}
