//! Time utilities for machine-reaper
//!
//! All machine ages are computed in UTC. The CloudAPI reports `created` as
//! text in a fixed ISO-8601 form with a literal `Z` and no explicit offset;
//! parsing and formatting of that form live together here so the gateway and
//! the engine cannot drift apart.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `REAPER_MOCK_TIME` environment variable overrides the
//! current time for age computations. Useful for dry-running a pass "as of"
//! some other moment.
//!
//! Format: `YYYY-MM-DD HH:MM:SS`, interpreted as UTC (e.g. `2025-12-25 14:30:00`)

use chrono::{DateTime, NaiveDateTime, Utc};
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "REAPER_MOCK_TIME";

/// Format of the `created` field on CloudAPI machines, e.g. `2015-03-02T12:34:56.789Z`
pub const CREATED_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

/// Offset between mock time and real time at process start
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

/// A `created` value that does not match [`CREATED_FORMAT`]
#[derive(Debug, Clone, Error)]
#[error("Timestamp '{value}' does not match {format}: {message}", format = CREATED_FORMAT)]
pub struct TimestampError {
    pub value: String,
    pub message: String,
}

#[allow(clippy::disallowed_methods)] // Wraps Utc::now()
fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            if let Ok(mock_time_str) = std::env::var(MOCK_TIME_ENV_VAR) {
                match NaiveDateTime::parse_from_str(&mock_time_str, "%Y-%m-%d %H:%M:%S") {
                    Ok(naive_dt) => {
                        let offset = naive_dt.and_utc().signed_duration_since(Utc::now());
                        tracing::info!(
                            mock_time = %mock_time_str,
                            offset_secs = offset.num_seconds(),
                            "Mock time enabled"
                        );
                        return Some(offset);
                    }
                    Err(_) => {
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            expected_format = "%Y-%m-%d %H:%M:%S",
                            "Invalid mock time format"
                        );
                    }
                }
            }
            None
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Current UTC time, respecting mock time in debug builds.
#[allow(clippy::disallowed_methods)] // This is the wrapper that provides mock time support
pub fn now_utc() -> DateTime<Utc> {
    let real_now = Utc::now();

    match get_mock_time_offset() {
        Some(offset) => real_now + offset,
        None => real_now,
    }
}

/// Parse a CloudAPI `created` timestamp
pub fn parse_created(value: &str) -> Result<DateTime<Utc>, TimestampError> {
    NaiveDateTime::parse_from_str(value, CREATED_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| TimestampError {
            value: value.to_string(),
            message: e.to_string(),
        })
}

/// Format a UTC time the way CloudAPI reports `created` (millisecond precision)
pub fn format_created(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Age of something created at `created`, as seen at `now`.
///
/// Creation times in the future (clock skew) count as zero age.
pub fn age_at(created: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    now.signed_duration_since(created)
        .to_std()
        .unwrap_or(Duration::ZERO)
}

/// Helper to format durations in human-readable form
pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let days = total_secs / 86400;
    let hours = (total_secs % 86400) / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
