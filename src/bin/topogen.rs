use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Result};
use topogen::generate::{generate, GenerateOptions, GenerateReport};

fn usage() -> &'static str {
    "Usage:\n  topogen generate <document-or-fragment-dir> <output-dir> [--dry-run] [--clean]\n\nOptions:\n  --dry-run   compute and print the plan without writing anything\n  --clean     delete orphaned generated files instead of listing them"
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let (source, out_dir, options) = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(message) => {
            eprintln!("{message}\n\n{}", usage());
            return ExitCode::FAILURE;
        }
    };

    match generate(&source, &out_dir, options) {
        Ok(report) => {
            print_report(&report);
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("[gen] {err}");
            for detail in err.details() {
                eprintln!("  {detail}");
            }
            ExitCode::FAILURE
        }
    }
}

fn parse_args(args: &[String]) -> Result<(PathBuf, PathBuf, GenerateOptions)> {
    let mut positional = Vec::new();
    let mut options = GenerateOptions::default();

    for arg in args {
        match arg.as_str() {
            "--dry-run" => options.dry_run = true,
            "--clean" => options.clean_orphans = true,
            flag if flag.starts_with("--") => bail!("unknown flag '{flag}'"),
            _ => positional.push(arg),
        }
    }

    match positional.as_slice() {
        [command, source, out_dir] if *command == "generate" => Ok((
            PathBuf::from(source),
            PathBuf::from(out_dir),
            options,
        )),
        [command, ..] if *command != "generate" => bail!("unknown command '{command}'"),
        _ => bail!("expected: generate <document-or-fragment-dir> <output-dir>"),
    }
}

fn print_report(report: &GenerateReport) {
    let tag = if report.dry_run { "[gen:dry-run]" } else { "[gen]" };

    for path in &report.created {
        println!("{tag} create {}", path.display());
    }
    for path in &report.merged {
        println!("{tag} merge  {}", path.display());
    }
    for warning in &report.warnings {
        eprintln!("{tag} warning: {warning}");
    }
    for path in &report.orphans {
        if report.removed_orphans.contains(path) {
            println!("{tag} removed orphan {}", path.display());
        } else {
            println!("{tag} orphan {}", path.display());
        }
    }
    println!(
        "{tag} {} created, {} merged, {} unchanged, {} orphan(s)",
        report.created.len(),
        report.merged.len(),
        report.unchanged.len(),
        report.orphans.len()
    );
}
