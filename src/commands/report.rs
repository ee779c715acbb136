//! Coverage report command
//!
//! Reads captured stdout of traced runs and compares the emitted points
//! against the configured filter.

use colored::*;
use eyre::{Context, Result};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use covtrace::config::Config;
use covtrace::{CoverageReport, Filter, FilterMode, TraceLog};

use crate::cli::OutputFormat;

/// Run the report command
pub fn run(files: &[PathBuf], format: OutputFormat, fail_under: Option<f64>, config: &Config) -> Result<()> {
    let log = read_traces(files)?;
    let filter = Filter::load(config.resolved_filter_path());
    let report = CoverageReport::new(&log, &filter);

    log::info!(
        "Report over {} trace lines: {} hit, {} missed",
        log.lines_read(),
        report.hit.len(),
        report.missed.len()
    );

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Yaml => println!("{}", serde_yaml::to_string(&report)?),
        OutputFormat::Text => print_text_report(&report),
    }

    if let Some(threshold) = fail_under
        && !report.meets(threshold)
    {
        eyre::bail!(
            "Coverage {:.1}% is below the required {:.1}%",
            report.coverage_percent.unwrap_or_default(),
            threshold
        );
    }

    Ok(())
}

fn read_traces(files: &[PathBuf]) -> Result<TraceLog> {
    let mut log = TraceLog::new();

    if files.is_empty() {
        log.extend_from(io::stdin().lock()).context("Failed to read trace from stdin")?;
        return Ok(log);
    }

    for path in files {
        if path == Path::new("-") {
            log.extend_from(io::stdin().lock()).context("Failed to read trace from stdin")?;
            continue;
        }
        let file = File::open(path).with_context(|| format!("Failed to open trace {}", path.display()))?;
        log.extend_from(BufReader::new(file))
            .with_context(|| format!("Failed to read trace {}", path.display()))?;
    }

    Ok(log)
}

fn print_text_report(report: &CoverageReport) {
    println!("{} {}", "Coverage Report".bold(), report.generated.dimmed());
    println!();

    match (report.mode, report.coverage_percent) {
        (FilterMode::Restricted, Some(pct)) => {
            println!(
                "  {}: {}/{} points ({:.1}%)",
                "coverage".cyan(),
                report.hit.len(),
                report.filter_size,
                pct
            );
        }
        _ => {
            println!("  {}: permissive, {} distinct points", "filter".cyan(), report.hit.len());
        }
    }
    println!();

    for hit in &report.hit {
        println!("  {} {} {}", "✓".green(), hit.id, format!("x{}", hit.emissions).dimmed());
    }
    for id in &report.missed {
        println!("  {} {}", "✗".red(), id);
    }

    if !report.unexpected.is_empty() {
        println!();
        println!("  {} (not in filter):", "unexpected".yellow());
        for hit in &report.unexpected {
            println!("    {} {}", hit.id, format!("x{}", hit.emissions).dimmed());
        }
    }
}
