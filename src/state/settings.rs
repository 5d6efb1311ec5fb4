//! Application settings with persistence.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AppSettings {
    #[serde(default)]
    pub updates: UpdateSettings,
}

/// Update checking settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdateSettings {
    #[serde(default = "default_true")]
    pub auto_check: bool,
    #[serde(default = "default_feed_url")]
    pub feed_url: String,
    #[serde(default = "default_check_interval_hours")]
    pub check_interval_hours: u64,
    #[serde(default = "default_probe_host")]
    pub probe_host: String,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    #[serde(default)]
    pub allow_prerelease: bool,
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            auto_check: true,
            feed_url: default_feed_url(),
            check_interval_hours: default_check_interval_hours(),
            probe_host: default_probe_host(),
            probe_timeout_secs: default_probe_timeout_secs(),
            allow_prerelease: false,
        }
    }
}

impl UpdateSettings {
    /// Period between scheduled checks; never shorter than one hour.
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_hours.max(1) * 60 * 60)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.max(1))
    }
}

fn default_true() -> bool {
    true
}

fn default_feed_url() -> String {
    DEFAULT_FEED_URL.to_string()
}

fn default_check_interval_hours() -> u64 {
    6
}

fn default_probe_host() -> String {
    "github.com".to_string()
}

fn default_probe_timeout_secs() -> u64 {
    5
}

/// Default release feed
pub const DEFAULT_FEED_URL: &str = "https://github.com/vidshelf/vidshelf/releases/latest/download";
