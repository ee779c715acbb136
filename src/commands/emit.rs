//! Mark coverage points from the command line
//!
//! Lets shell scripts and test harnesses trace points through the same
//! process-wide emitter a linked program uses.

use eyre::{Context, Result};

use covtrace::config::Config;

/// Run the emit command
pub fn run(ids: &[String], unreachable: Option<&str>, config: &Config) -> Result<()> {
    let filter_path = config.resolved_filter_path();
    covtrace::set_filter_path(&filter_path)
        .with_context(|| format!("Failed to use filter {}", filter_path.display()))?;

    for id in ids {
        covtrace::observe(id, true);
    }
    log::debug!("Observed {} points", ids.len());

    if let Some(id) = unreachable {
        covtrace::observe_assert(id);
    }

    Ok(())
}
