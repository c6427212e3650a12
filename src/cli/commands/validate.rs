//! `validate` command handler
//!
//! Loads every given configuration file through the normal loading pipeline
//! and reports the effective settings.

use std::path::Path;

use serde::Serialize;

use crate::cli::args::{OutputFormat, ValidateArgs};
use crate::config::{DuelConfig, load_config};
use crate::error::QuickdrawError;

#[derive(Debug, Serialize)]
struct ValidationReport<'a> {
    file: &'a Path,
    valid: bool,
    config: &'a DuelConfig,
}

/// Validate configuration files without running any duel.
///
/// Stops at the first invalid file.
///
/// # Errors
///
/// Returns a config error if a file is missing, malformed or fails
/// validation.
pub fn run(args: &ValidateArgs) -> Result<(), QuickdrawError> {
    for path in &args.files {
        tracing::info!(file = %path.display(), "validating configuration");
        let config = load_config(path)?;
        println!("{}", render(path, &config, args.format)?);
        tracing::info!(file = %path.display(), "configuration valid");
    }
    Ok(())
}

fn render(path: &Path, config: &DuelConfig, format: OutputFormat) -> Result<String, QuickdrawError> {
    Ok(match format {
        OutputFormat::Human => format!(
            "{}: ok (unit {}, accept {}, grace {}..={}, shot {})",
            path.display(),
            humantime::format_duration(config.time_unit),
            config.accept_window,
            config.grace.min,
            config.grace.max,
            config.shot_window
        ),
        OutputFormat::Json => serde_json::to_string(&ValidationReport {
            file: path,
            valid: true,
            config,
        })?,
    })
}
