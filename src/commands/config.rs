use colored::*;
use eyre::Result;

use covtrace::config::Config;

use crate::cli::{ConfigAction, OutputFormat};

pub fn run(action: ConfigAction, config: &Config) -> Result<()> {
    match action {
        ConfigAction::Show { format } => show(OutputFormat::resolve(format), config),
        ConfigAction::Get { key } => get(&key, config),
    }
}

fn show(format: OutputFormat, config: &Config) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        OutputFormat::Yaml => {
            println!("{}", serde_yaml::to_string(config)?);
        }
        OutputFormat::Text => {
            println!("{}", "covtrace Configuration".bold());
            println!();
            println!("  {}: {}", "filter_path".cyan(), config.filter_path.display());
            println!("  {}: {}", "log_level".cyan(), config.log_level.as_filter());
        }
    }

    Ok(())
}

fn get(key: &str, config: &Config) -> Result<()> {
    let value = match key {
        "filter_path" | "filter-path" => config.filter_path.display().to_string(),
        "log_level" | "log-level" => config.log_level.as_filter().to_string(),
        _ => eyre::bail!("Unknown config key: {}", key),
    };

    println!("{}", value);
    Ok(())
}
