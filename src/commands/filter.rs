//! Show the filter the emitter would load

use colored::*;
use eyre::Result;
use serde::Serialize;

use covtrace::config::Config;
use covtrace::{Filter, FilterMode};

use crate::cli::OutputFormat;

#[derive(Serialize)]
struct FilterStatus {
    path: String,
    exists: bool,
    mode: FilterMode,
    points: Vec<String>,
}

pub fn run(format: OutputFormat, config: &Config) -> Result<()> {
    let path = config.resolved_filter_path();
    let filter = Filter::load(&path);

    let status = FilterStatus {
        path: path.display().to_string(),
        exists: path.exists(),
        mode: filter.mode(),
        points: filter.iter().map(str::to_string).collect(),
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
        OutputFormat::Yaml => println!("{}", serde_yaml::to_string(&status)?),
        OutputFormat::Text => print_text_status(&status),
    }

    Ok(())
}

fn print_text_status(status: &FilterStatus) {
    println!("{}", "Coverage Filter".bold());
    println!();

    let found = if status.exists { "found".green() } else { "not found".yellow() };
    println!("  {}: {} ({})", "path".cyan(), status.path, found);

    match status.mode {
        FilterMode::Permissive => {
            println!("  {}: {}", "mode".cyan(), "permissive".green());
            println!("  every observed point is emitted once");
        }
        FilterMode::Restricted => {
            println!("  {}: {} ({} points)", "mode".cyan(), "restricted".yellow(), status.points.len());
            for point in &status.points {
                println!("    {}", point);
            }
        }
    }
}
