use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Pool configuration. All fields are optional in the file; the defaults are
/// the long-standing constants of this pool design.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Number of worker threads created at pool startup.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Maximum number of idle connections kept for reuse across all hosts.
    #[serde(default = "default_max_idle_connections")]
    pub max_idle_connections: usize,
    /// Seconds an unused pooled connection survives before it is closed.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_io_timeout_secs")]
    pub io_timeout_secs: u64,
}

fn default_workers() -> usize {
    4
}

fn default_max_idle_connections() -> usize {
    8
}

fn default_idle_timeout_secs() -> u64 {
    6
}

fn default_connect_timeout_secs() -> u64 {
    20
}

fn default_io_timeout_secs() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_idle_connections: default_max_idle_connections(),
            idle_timeout_secs: default_idle_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            io_timeout_secs: default_io_timeout_secs(),
        }
    }
}

impl Config {
    pub fn read(path: &Path) -> Result<Config> {
        tracing::info!(
            path = %path.display(),
            "Reading config file",
        );
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file at {}", path.display()))
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs)
    }
}
