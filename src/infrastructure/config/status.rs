//! Status file configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// `[status]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusConfig {
    /// Write the status file while running.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Location of the JSON status file.
    #[serde(default = "default_path")]
    pub path: PathBuf,
    /// Seconds between writes.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

const fn default_enabled() -> bool {
    true
}

fn default_path() -> PathBuf {
    PathBuf::from("overseer-status.json")
}

const fn default_interval_secs() -> u64 {
    5
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            path: default_path(),
            interval_secs: default_interval_secs(),
        }
    }
}

impl StatusConfig {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}
