//! Configuration loading and management.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "SPRINT_SCHEDULER_CONFIG_PATH";

/// Scheduler configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub sprint: SprintConfig,
}

/// Store and shard identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the SQLite database file shared by every shard.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Identifier of this process, used in log fields.
    #[serde(default)]
    pub shard_id: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            shard_id: 0,
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("sprint-scheduler/sprints.db")
}

/// Polling and recovery intervals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,

    /// Claims on tasks due longer ago than this are considered abandoned.
    #[serde(default = "default_stale_after")]
    pub stale_after_seconds: i64,

    /// Clear every claim at boot.
    #[serde(default = "default_true")]
    pub release_claims_on_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval(),
            sweep_interval_seconds: default_sweep_interval(),
            stale_after_seconds: default_stale_after(),
            release_claims_on_start: true,
        }
    }
}

fn default_poll_interval() -> u64 {
    30
}

fn default_sweep_interval() -> u64 {
    3600
}

fn default_stale_after() -> i64 {
    3600
}

fn default_true() -> bool {
    true
}

/// Sprint defaults and limits. Lengths and delays are in minutes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SprintConfig {
    #[serde(default = "default_length")]
    pub default_length: i64,

    #[serde(default = "default_delay")]
    pub default_delay: i64,

    #[serde(default = "default_max_length")]
    pub max_length: i64,

    #[serde(default = "default_max_delay")]
    pub max_delay: i64,

    /// Grace window for final word counts, unless the guild overrides it.
    #[serde(default = "default_end_delay")]
    pub end_delay_minutes: i64,

    /// WPM above which a declaration asks for confirmation, unless the user overrides it.
    #[serde(default = "default_wpm_check")]
    pub wpm_check: i64,
}

impl Default for SprintConfig {
    fn default() -> Self {
        Self {
            default_length: default_length(),
            default_delay: default_delay(),
            max_length: default_max_length(),
            max_delay: default_max_delay(),
            end_delay_minutes: default_end_delay(),
            wpm_check: default_wpm_check(),
        }
    }
}

fn default_length() -> i64 {
    20
}

fn default_delay() -> i64 {
    2
}

fn default_max_length() -> i64 {
    60
}

fn default_max_delay() -> i64 {
    1440
}

fn default_end_delay() -> i64 {
    2
}

fn default_wpm_check() -> i64 {
    150
}

impl Config {
    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Candidate config files, highest priority first.
    pub fn search_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(path) = explicit {
            paths.push(path.to_path_buf());
        }
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            paths.push(PathBuf::from(path));
        }
        paths.push(PathBuf::from("sprint-scheduler/config.yaml"));
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".sprint-scheduler").join("config.yaml"));
        }
        paths
    }

    /// Load the first config file found, or defaults, then apply environment
    /// overrides. An explicit path that does not exist is an error.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                anyhow::bail!("config file not found: {}", path.display());
            }
        }

        let mut config = Self::default();
        for path in Self::search_paths(explicit) {
            if path.is_file() {
                debug!(path = %path.display(), "loading config");
                config = Self::load(&path)?;
                break;
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `SPRINT_SCHEDULER_*` overrides. Unparseable values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db_path) = lookup("SPRINT_SCHEDULER_DB_PATH") {
            self.server.db_path = PathBuf::from(db_path);
        }

        if let Some(shard) = lookup("SPRINT_SCHEDULER_SHARD_ID") {
            if let Ok(shard) = shard.parse() {
                self.server.shard_id = shard;
            }
        }

        if let Some(poll) = lookup("SPRINT_SCHEDULER_POLL_SECONDS") {
            if let Ok(poll) = poll.parse() {
                self.scheduler.poll_interval_seconds = poll;
            }
        }
    }

    /// Ensure the database directory exists.
    pub fn ensure_db_dir(&self) -> Result<()> {
        if let Some(parent) = self.server.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}
