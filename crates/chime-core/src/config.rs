use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 10 * 60;
pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 6 * 60 * 60;
pub const DEFAULT_RESYNC_NEAR_DUE_SECS: u64 = 5 * 60;
pub const DEFAULT_MISSED_PER_SERVER: usize = 10;
pub const DEFAULT_MISSED_GLOBAL: usize = 30;
pub const DEFAULT_DIGEST_WINDOW_HOURS: u32 = 24;
pub const DEFAULT_TIME_SOURCE_URL: &str = "https://www.google.com";
pub const DEFAULT_TIME_SOURCE_TIMEOUT_MS: u64 = 5_000;

/// Top-level config (chime.toml + CHIME_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChimeConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub time_source: TimeSourceConfig,
    #[serde(default)]
    pub discord: DiscordConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Tunables for the due-reminder processing loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum lateness before a due notification is recorded as missed instead of sent.
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    /// Start the first tick on the next wall-clock minute boundary.
    #[serde(default = "bool_true")]
    pub align_to_minute: bool,
    /// Resync the clock offset when the last successful sync is older than this.
    #[serde(default = "default_resync_interval_secs")]
    pub resync_interval_secs: u64,
    /// Resync the clock offset when the next due reminder is closer than this.
    #[serde(default = "default_resync_near_due_secs")]
    pub resync_near_due_secs: u64,
    /// Missed-notification records kept per server; older ones are deleted.
    #[serde(default = "default_missed_per_server")]
    pub missed_per_server: usize,
    /// Missed-notification records kept across all servers.
    #[serde(default = "default_missed_global")]
    pub missed_global: usize,
    /// Reminders stuck in `processing` longer than this are handed back to `active`.
    /// Unset disables the reaper.
    #[serde(default)]
    pub stale_claim_secs: Option<u64>,
    /// How far ahead the `{{all}}` digest looks.
    #[serde(default = "default_digest_window_hours")]
    pub digest_window_hours: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: DEFAULT_GRACE_PERIOD_SECS,
            tick_interval_secs: DEFAULT_TICK_INTERVAL_SECS,
            align_to_minute: true,
            resync_interval_secs: DEFAULT_RESYNC_INTERVAL_SECS,
            resync_near_due_secs: DEFAULT_RESYNC_NEAR_DUE_SECS,
            missed_per_server: DEFAULT_MISSED_PER_SERVER,
            missed_global: DEFAULT_MISSED_GLOBAL,
            stale_claim_secs: None,
            digest_window_hours: DEFAULT_DIGEST_WINDOW_HOURS,
        }
    }
}

impl SchedulerConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    pub fn resync_near_due(&self) -> Duration {
        Duration::from_secs(self.resync_near_due_secs)
    }

    pub fn stale_claim(&self) -> Option<Duration> {
        self.stale_claim_secs.map(Duration::from_secs)
    }

    pub fn digest_window(&self) -> Duration {
        Duration::from_secs(u64::from(self.digest_window_hours) * 3600)
    }
}

/// Trusted external clock used to correct host drift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSourceConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    /// Endpoint whose HTTP `Date` response header is trusted.
    #[serde(default = "default_time_source_url")]
    pub url: String,
    #[serde(default = "default_time_source_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for TimeSourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_time_source_url(),
            timeout_ms: DEFAULT_TIME_SOURCE_TIMEOUT_MS,
        }
    }
}

impl TimeSourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub bot_token: Option<String>,
}

fn bool_true() -> bool {
    true
}
fn default_grace_period_secs() -> u64 {
    DEFAULT_GRACE_PERIOD_SECS
}
fn default_tick_interval_secs() -> u64 {
    DEFAULT_TICK_INTERVAL_SECS
}
fn default_resync_interval_secs() -> u64 {
    DEFAULT_RESYNC_INTERVAL_SECS
}
fn default_resync_near_due_secs() -> u64 {
    DEFAULT_RESYNC_NEAR_DUE_SECS
}
fn default_missed_per_server() -> usize {
    DEFAULT_MISSED_PER_SERVER
}
fn default_missed_global() -> usize {
    DEFAULT_MISSED_GLOBAL
}
fn default_digest_window_hours() -> u32 {
    DEFAULT_DIGEST_WINDOW_HOURS
}
fn default_time_source_url() -> String {
    DEFAULT_TIME_SOURCE_URL.to_string()
}
fn default_time_source_timeout_ms() -> u64 {
    DEFAULT_TIME_SOURCE_TIMEOUT_MS
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.chime/chime.db", home)
}

impl ChimeConfig {
    /// Load config from a TOML file with CHIME_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `CHIME_SCHEDULER__GRACE_PERIOD_SECS=300`.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: ChimeConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("CHIME_").split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.scheduler.tick_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "scheduler.tick_interval_secs".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.scheduler.missed_per_server == 0 {
            return Err(ConfigError::Invalid {
                key: "scheduler.missed_per_server".to_string(),
                reason: "must keep at least one record".to_string(),
            });
        }
        if self.scheduler.missed_global == 0 {
            return Err(ConfigError::Invalid {
                key: "scheduler.missed_global".to_string(),
                reason: "must keep at least one record".to_string(),
            });
        }
        Ok(())
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.chime/chime.toml", home)
}
