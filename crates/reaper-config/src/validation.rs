//! Configuration validation

use crate::schema::RawConfig;
use reqwest::Url;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Missing required setting '{0}'")]
    MissingField(&'static str),

    #[error("Invalid URL for '{field}': '{value}' ({message})")]
    InvalidUrl {
        field: &'static str,
        value: String,
        message: String,
    },

    #[error("Invalid value for '{field}': {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },
}

/// Validate a raw configuration, collecting every problem found
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let cloud = &config.cloud;

    require_text(&mut errors, "sdc_url", cloud.sdc_url.as_deref());
    require_text(&mut errors, "account", cloud.account.as_deref());
    require_text(&mut errors, "key_id", cloud.key_id.as_deref());

    match &cloud.key_path {
        Some(path) if !path.as_os_str().is_empty() => {}
        _ => errors.push(ValidationError::MissingField("key_path")),
    }

    if let Some(url) = cloud.sdc_url.as_deref()
        && !url.trim().is_empty()
        && let Err(message) = check_http_url(url)
    {
        errors.push(ValidationError::InvalidUrl {
            field: "sdc_url",
            value: url.to_string(),
            message,
        });
    }

    if let Some(url) = config.reaper.notify_url.as_deref()
        && let Err(message) = check_http_url(url)
    {
        errors.push(ValidationError::InvalidUrl {
            field: "notify_url",
            value: url.to_string(),
            message,
        });
    }

    if config.reaper.stop_timeout == Some(0) {
        errors.push(ValidationError::InvalidValue {
            field: "stop_timeout",
            message: "must be at least 1 second".into(),
        });
    }

    if let Some(address) = config.reaper.notify_address.as_deref()
        && address.trim().is_empty()
    {
        errors.push(ValidationError::InvalidValue {
            field: "notify_address",
            message: "cannot be empty".into(),
        });
    }

    errors
}

fn require_text(errors: &mut Vec<ValidationError>, field: &'static str, value: Option<&str>) {
    match value {
        Some(v) if !v.trim().is_empty() => {}
        _ => errors.push(ValidationError::MissingField(field)),
    }
}

/// Check that a URL parses, uses http(s) and names a host
pub fn check_http_url(url: &str) -> Result<(), String> {
    let parsed = Url::parse(url.trim()).map_err(|e| e.to_string())?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(format!("expected http or https, got '{}'", other)),
    }

    if parsed.host_str().is_none_or(str::is_empty) {
        return Err("missing host".into());
    }

    Ok(())
}
