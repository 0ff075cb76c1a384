//! Configuration parsing and validation for machine-reaper
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - CloudAPI endpoint and credentials
//! - Retirement pass settings (pause, dry-run, notification target)
//! - Command-line overrides applied before validation
//! - Validation with clear error messages

mod schema;
mod settings;
mod validation;

pub use schema::*;
pub use settings::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<ReaperConfig> {
    load_config_with_overrides(path, ConfigOverrides::default())
}

/// Load a TOML file (if it exists), apply overrides, then validate.
///
/// A missing file is not an error: everything may come from the command line.
pub fn load_config_with_overrides(
    path: impl AsRef<Path>,
    overrides: ConfigOverrides,
) -> ConfigResult<ReaperConfig> {
    let path = path.as_ref();
    let raw = if path.exists() {
        debug!(path = %path.display(), "Reading config file");
        parse_raw(&std::fs::read_to_string(path)?)?
    } else {
        debug!(path = %path.display(), "No config file, using command line only");
        RawConfig::default()
    };

    resolve(raw, overrides)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<ReaperConfig> {
    resolve(parse_raw(content)?, ConfigOverrides::default())
}

fn parse_raw(content: &str) -> ConfigResult<RawConfig> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    Ok(raw)
}

fn resolve(mut raw: RawConfig, overrides: ConfigOverrides) -> ConfigResult<ReaperConfig> {
    raw.apply_overrides(overrides);

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Ok(ReaperConfig::from_raw(raw))
}
