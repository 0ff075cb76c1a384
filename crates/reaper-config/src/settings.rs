//! Validated settings

use crate::schema::{RawCloudConfig, RawConfig, RawReaperConfig};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default pause after each direct deletion
pub const DEFAULT_PAUSE: Duration = Duration::from_secs(3);

/// Default time allowed for a machine to reach `stopped`
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(120);

/// Validated configuration for one reaper run
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    pub cloud: CloudConfig,

    /// Delay after each direct deletion; zero disables it
    pub pause: Duration,

    pub dry_run: bool,
    pub verbose: bool,

    pub stop_timeout: Duration,

    pub notify_address: Option<String>,
    pub notify_url: Option<String>,
}

/// CloudAPI endpoint and credentials
#[derive(Debug, Clone)]
pub struct CloudConfig {
    pub sdc_url: String,
    pub account: String,
    pub key_id: String,
    pub key_path: PathBuf,
    pub user_agent: String,
}

impl ReaperConfig {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        let RawReaperConfig {
            pause,
            dry_run,
            verbose,
            stop_timeout,
            notify_address,
            notify_url,
        } = raw.reaper;

        Self {
            cloud: CloudConfig::from_raw(raw.cloud),
            pause: pause.map(Duration::from_secs).unwrap_or(DEFAULT_PAUSE),
            dry_run,
            verbose,
            stop_timeout: stop_timeout
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_STOP_TIMEOUT),
            notify_address,
            notify_url,
        }
    }
}

impl CloudConfig {
    fn from_raw(raw: RawCloudConfig) -> Self {
        Self {
            sdc_url: raw
                .sdc_url
                .unwrap_or_default()
                .trim()
                .trim_end_matches('/')
                .to_string(),
            account: raw.account.unwrap_or_default().trim().to_string(),
            key_id: raw.key_id.unwrap_or_default().trim().to_string(),
            key_path: expand_home(&raw.key_path.unwrap_or_default()),
            user_agent: raw.user_agent.unwrap_or_else(default_user_agent),
        }
    }
}

fn default_user_agent() -> String {
    format!("machine-reaper/{}", env!("CARGO_PKG_VERSION"))
}

/// Expand a leading `~/` against $HOME
fn expand_home(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~")
        && let Ok(home) = std::env::var("HOME")
    {
        return PathBuf::from(home).join(rest);
    }
    path.to_path_buf()
}
