//! Configuration loader
//!
//! Loading pipeline:
//! 1. Read the YAML file (size-limited)
//! 2. Deserialize to [`DuelConfig`]
//! 3. Apply `QUICKDRAW_*` environment overrides
//! 4. Validate

use std::path::Path;
use std::time::Duration;

use crate::config::schema::DuelConfig;
use crate::error::ConfigError;

/// Largest configuration file accepted, in bytes.
pub const MAX_CONFIG_SIZE: u64 = 1024 * 1024;

/// Environment variable overriding [`DuelConfig::nickname`].
pub const ENV_NICKNAME: &str = "QUICKDRAW_NICKNAME";

/// Environment variable overriding [`DuelConfig::time_unit`].
pub const ENV_TIME_UNIT: &str = "QUICKDRAW_TIME_UNIT";

/// Loads, overrides and validates the configuration at `path`.
///
/// # Errors
///
/// Returns `ConfigError::MissingFile` if the file cannot be read,
/// `ConfigError::ParseError` for malformed YAML, and
/// `ConfigError::InvalidValue` when validation fails.
pub fn load_config(path: &Path) -> Result<DuelConfig, ConfigError> {
    let metadata = std::fs::metadata(path).map_err(|_| ConfigError::MissingFile {
        path: path.to_path_buf(),
    })?;
    if metadata.len() > MAX_CONFIG_SIZE {
        return Err(ConfigError::InvalidValue {
            field: "file size".to_string(),
            value: metadata.len().to_string(),
            expected: format!("at most {MAX_CONFIG_SIZE} bytes"),
        });
    }

    let raw = std::fs::read_to_string(path).map_err(|_| ConfigError::MissingFile {
        path: path.to_path_buf(),
    })?;

    let mut config = parse_config(&raw, path)?;
    apply_overrides(&mut config, |name| std::env::var(name).ok())?;
    validate(&config)?;
    Ok(config)
}

/// Builds the configuration used when no file is given: defaults plus
/// environment overrides.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` if an override is malformed.
pub fn default_config() -> Result<DuelConfig, ConfigError> {
    let mut config = DuelConfig::default();
    apply_overrides(&mut config, |name| std::env::var(name).ok())?;
    validate(&config)?;
    Ok(config)
}

/// Parses YAML text into a [`DuelConfig`]. An empty document yields defaults.
///
/// # Errors
///
/// Returns `ConfigError::ParseError` for malformed YAML or unknown fields.
pub fn parse_config(raw: &str, path: &Path) -> Result<DuelConfig, ConfigError> {
    if raw.trim().is_empty() {
        return Ok(DuelConfig::default());
    }
    serde_yaml::from_str(raw).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Applies overrides looked up through `lookup` (normally the process
/// environment).
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` if `QUICKDRAW_TIME_UNIT` is not a
/// valid duration.
pub fn apply_overrides<F>(config: &mut DuelConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(nickname) = lookup(ENV_NICKNAME) {
        config.nickname = nickname;
    }
    if let Some(raw) = lookup(ENV_TIME_UNIT) {
        config.time_unit =
            humantime::parse_duration(raw.trim()).map_err(|e| ConfigError::InvalidValue {
                field: ENV_TIME_UNIT.to_string(),
                value: raw.clone(),
                expected: format!("a duration such as 1s or 250ms ({e})"),
            })?;
    }
    Ok(())
}

/// Checks cross-field constraints serde cannot express.
///
/// # Errors
///
/// Returns the first violated constraint as `ConfigError::InvalidValue`.
pub fn validate(config: &DuelConfig) -> Result<(), ConfigError> {
    if config.time_unit == Duration::ZERO {
        return Err(invalid("time_unit", "0s", "a non-zero duration"));
    }
    if config.accept_window == 0 {
        return Err(invalid("accept_window", "0", "at least 1 unit"));
    }
    if config.shot_window == 0 {
        return Err(invalid("shot_window", "0", "at least 1 unit"));
    }
    if config.grace.min > config.grace.max {
        return Err(ConfigError::InvalidValue {
            field: "grace.min".to_string(),
            value: config.grace.min.to_string(),
            expected: format!("a value <= grace.max ({})", config.grace.max),
        });
    }
    if config.nickname.trim().is_empty() {
        return Err(invalid("nickname", "", "a non-empty display name"));
    }
    Ok(())
}

fn invalid(field: &str, value: &str, expected: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        expected: expected.to_string(),
    }
}
