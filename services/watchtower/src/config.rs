//! Configuration types for the watchtower service

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Endpoints seeded into the registry at startup
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub uptime: UptimeConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
}

impl Config {
    /// Check the service-level settings. Endpoint entries are validated by the registry.
    pub fn validate(&self) -> crate::Result<()> {
        if self.probe.timeout.is_zero() {
            return Err(config_error("probe.timeout must be greater than zero"));
        }
        if let Some(range) = self.probe.accepted_status.iter().find(|r| r.min > r.max) {
            return Err(config_error(format!(
                "probe.accepted_status range {}-{} is empty",
                range.min, range.max
            )));
        }
        if self.scheduler.poll_resolution.is_zero() {
            return Err(config_error(
                "scheduler.poll_resolution must be greater than zero",
            ));
        }
        if self.scheduler.max_concurrent_probes == Some(0) {
            return Err(config_error(
                "scheduler.max_concurrent_probes must be at least 1",
            ));
        }
        if self.scheduler.confirmations == 0 {
            return Err(config_error("scheduler.confirmations must be at least 1"));
        }
        if self.notifications.max_attempts == 0 {
            return Err(config_error("notifications.max_attempts must be at least 1"));
        }
        if self.uptime.retention_days == 0 {
            return Err(config_error("uptime.retention_days must be at least 1"));
        }
        Ok(())
    }
}

fn config_error(msg: impl Into<String>) -> crate::WatchtowerError {
    crate::WatchtowerError::Config(msg.into())
}

/// Configuration of one monitored endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default = "default_check_interval")]
    pub check_interval_minutes: u32,
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
    #[serde(default)]
    pub recipients: Vec<String>,
}

impl EndpointConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.check_interval_minutes) * 60)
    }
}

/// Inclusive range of HTTP status codes counted as healthy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRange {
    pub min: u16,
    pub max: u16,
}

impl StatusRange {
    pub fn contains(&self, code: u16) -> bool {
        (self.min..=self.max).contains(&code)
    }
}

/// Probe runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_probe_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default = "default_accepted_status")]
    pub accepted_status: Vec<StatusRange>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: default_probe_timeout(),
            accepted_status: default_accepted_status(),
        }
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How often due endpoints are re-evaluated
    #[serde(default = "default_poll_resolution", with = "humantime_serde")]
    pub poll_resolution: Duration,
    /// Global cap on simultaneous probes; defaults to the available parallelism
    #[serde(default)]
    pub max_concurrent_probes: Option<usize>,
    /// Consecutive identical classifications required before a status change is accepted
    #[serde(default = "default_confirmations")]
    pub confirmations: u32,
}

impl SchedulerConfig {
    pub fn max_concurrent_probes(&self) -> usize {
        self.max_concurrent_probes.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_resolution: default_poll_resolution(),
            max_concurrent_probes: None,
            confirmations: default_confirmations(),
        }
    }
}

/// Notification delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff", with = "humantime_serde")]
    pub initial_backoff: Duration,
    #[serde(default = "default_max_backoff", with = "humantime_serde")]
    pub max_backoff: Duration,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
        }
    }
}

/// Uptime history configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UptimeConfig {
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl Default for UptimeConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
        }
    }
}

/// Registry persistence configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// JSON file the registry is loaded from and written back to after each change
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
}

fn default_check_interval() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_accepted_status() -> Vec<StatusRange> {
    vec![StatusRange { min: 200, max: 399 }]
}

fn default_poll_resolution() -> Duration {
    Duration::from_secs(1)
}

fn default_confirmations() -> u32 {
    1
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> Duration {
    Duration::from_millis(500)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(30)
}

fn default_retention_days() -> u32 {
    30
}

/// Load configuration from a JSON file
pub fn load_config(path: &Path) -> crate::Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        crate::WatchtowerError::Config(format!("Failed to read config file {:?}: {}", path, e))
    })?;
    let config: Config = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}
