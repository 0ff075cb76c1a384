//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// CloudAPI endpoint and credentials
    #[serde(default)]
    pub cloud: RawCloudConfig,

    /// Retirement pass settings
    #[serde(default)]
    pub reaper: RawReaperConfig,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            config_version: crate::CURRENT_CONFIG_VERSION,
            cloud: RawCloudConfig::default(),
            reaper: RawReaperConfig::default(),
        }
    }
}

/// CloudAPI settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawCloudConfig {
    /// API endpoint, e.g. https://us-east-1.api.joyentcloud.com
    pub sdc_url: Option<String>,

    /// Account login
    pub account: Option<String>,

    /// Key fingerprint or name registered with the account
    pub key_id: Option<String>,

    /// Path to the signing key (hex-encoded ed25519 seed)
    pub key_path: Option<PathBuf>,

    /// User-Agent header override
    pub user_agent: Option<String>,
}

/// Retirement pass settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawReaperConfig {
    /// Seconds to wait after each direct deletion (default: 3)
    pub pause: Option<u64>,

    /// Log mutating actions instead of performing them
    #[serde(default)]
    pub dry_run: bool,

    /// Detailed logging
    #[serde(default)]
    pub verbose: bool,

    /// Seconds to wait for a stopping machine to reach `stopped` (default: 120)
    pub stop_timeout: Option<u64>,

    /// Where deferred-deletion requests are addressed
    pub notify_address: Option<String>,

    /// Webhook that receives deferred-deletion requests
    pub notify_url: Option<String>,
}

/// Values supplied on the command line or via environment.
///
/// Anything set here wins over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub sdc_url: Option<String>,
    pub account: Option<String>,
    pub key_id: Option<String>,
    pub key_path: Option<PathBuf>,
    pub pause: Option<u64>,
    pub dry_run: bool,
    pub verbose: bool,
}

impl RawConfig {
    /// Merge command-line overrides into the parsed file
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(sdc_url) = overrides.sdc_url {
            self.cloud.sdc_url = Some(sdc_url);
        }
        if let Some(account) = overrides.account {
            self.cloud.account = Some(account);
        }
        if let Some(key_id) = overrides.key_id {
            self.cloud.key_id = Some(key_id);
        }
        if let Some(key_path) = overrides.key_path {
            self.cloud.key_path = Some(key_path);
        }
        if let Some(pause) = overrides.pause {
            self.reaper.pause = Some(pause);
        }
        // Flags can only switch these on
        self.reaper.dry_run |= overrides.dry_run;
        self.reaper.verbose |= overrides.verbose;
    }
}
