//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! Every section and key is optional; missing values take the defaults
//! below.

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_CONFIG_PATH: &str = "config/dev.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Site identifier, used as the Prometheus label and in alarm payloads
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "geofence".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Seconds between evaluation passes
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    /// Alarms kept in the recent-alarm buffer
    #[serde(default = "default_recent_alarm_capacity")]
    pub recent_alarm_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            recent_alarm_capacity: default_recent_alarm_capacity(),
        }
    }
}

fn default_tick_interval_secs() -> u64 {
    60
}

fn default_recent_alarm_capacity() -> usize {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Fence/region catalog JSON
    #[serde(default = "default_catalog_file")]
    pub catalog_file: String,
    /// Device snapshot JSON
    #[serde(default = "default_devices_file")]
    pub devices_file: String,
    /// Seconds between catalog reloads
    #[serde(default = "default_catalog_poll_secs")]
    pub catalog_poll_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            catalog_file: default_catalog_file(),
            devices_file: default_devices_file(),
            catalog_poll_secs: default_catalog_poll_secs(),
        }
    }
}

fn default_catalog_file() -> String {
    "data/catalog.json".to_string()
}

fn default_devices_file() -> String {
    "data/devices.json".to_string()
}

fn default_catalog_poll_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
    /// Prometheus metrics HTTP port (0 to disable)
    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_metrics_interval_secs(),
            prometheus_port: default_prometheus_port(),
        }
    }
}

fn default_metrics_interval_secs() -> u64 {
    30
}

fn default_prometheus_port() -> u16 {
    9090
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    /// Alarm channel buffer; 0 disables the channel notifier
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Log every alarm as a warning
    #[serde(default = "default_log_alarms")]
    pub log_alarms: bool,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self { channel_capacity: default_channel_capacity(), log_alarms: default_log_alarms() }
    }
}

fn default_channel_capacity() -> usize {
    256
}

fn default_log_alarms() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    tick_interval_secs: u64,
    recent_alarm_capacity: usize,
    catalog_file: String,
    devices_file: String,
    catalog_poll_secs: u64,
    metrics_interval_secs: u64,
    prometheus_port: u16,
    channel_capacity: usize,
    log_alarms: bool,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            site_id: toml_config.site.id,
            tick_interval_secs: toml_config.engine.tick_interval_secs.max(1),
            recent_alarm_capacity: toml_config.engine.recent_alarm_capacity.max(1),
            catalog_file: toml_config.feed.catalog_file,
            devices_file: toml_config.feed.devices_file,
            catalog_poll_secs: toml_config.feed.catalog_poll_secs.max(1),
            metrics_interval_secs: toml_config.metrics.interval_secs.max(1),
            prometheus_port: toml_config.metrics.prometheus_port,
            channel_capacity: toml_config.notify.channel_capacity,
            log_alarms: toml_config.notify.log_alarms,
            config_file,
        }
    }

    /// Resolve config path from CLI args, CONFIG_FILE, or the default
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        DEFAULT_CONFIG_PATH.to_string()
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load from a path, falling back to defaults if it is missing or invalid
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    /// Load configuration from process args (see module docs)
    pub fn load(args: &[String]) -> Self {
        Self::load_from_path(Self::resolve_config_path(args))
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn tick_interval_secs(&self) -> u64 {
        self.tick_interval_secs
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn recent_alarm_capacity(&self) -> usize {
        self.recent_alarm_capacity
    }

    pub fn catalog_file(&self) -> &str {
        &self.catalog_file
    }

    pub fn devices_file(&self) -> &str {
        &self.devices_file
    }

    pub fn catalog_poll_secs(&self) -> u64 {
        self.catalog_poll_secs
    }

    pub fn catalog_poll(&self) -> Duration {
        Duration::from_secs(self.catalog_poll_secs)
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn prometheus_port(&self) -> u16 {
        self.prometheus_port
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }

    pub fn log_alarms(&self) -> bool {
        self.log_alarms
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests
    #[cfg(test)]
    pub fn with_tick_interval_secs(mut self, secs: u64) -> Self {
        self.tick_interval_secs = secs.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.site_id(), "geofence");
        assert_eq!(config.tick_interval_secs(), 60);
        assert_eq!(config.recent_alarm_capacity(), 5);
        assert_eq!(config.catalog_poll_secs(), 60);
        assert_eq!(config.prometheus_port(), 9090);
        assert!(config.log_alarms());
        assert_eq!(config.config_file(), "default");
    }

    #[test]
    fn test_partial_toml_takes_defaults() {
        let toml_config: TomlConfig = toml::from_str("[engine]\ntick_interval_secs = 5\n").unwrap();
        let config = Config::from_toml(toml_config, "inline".to_string());
        assert_eq!(config.tick_interval_secs(), 5);
        assert_eq!(config.recent_alarm_capacity(), 5);
        assert_eq!(config.devices_file(), "data/devices.json");
    }

    #[test]
    fn test_zero_intervals_clamped() {
        let toml_config: TomlConfig =
            toml::from_str("[engine]\ntick_interval_secs = 0\nrecent_alarm_capacity = 0\n").unwrap();
        let config = Config::from_toml(toml_config, "inline".to_string());
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
        assert_eq!(config.recent_alarm_capacity(), 1);
    }

    #[test]
    fn test_builder() {
        let config = Config::default().with_tick_interval_secs(0);
        assert_eq!(config.tick_interval_secs(), 1);
    }

    #[test]
    fn test_resolve_config_path_from_arg() {
        let args: Vec<String> = vec![
            "geofence-engine".to_string(),
            "--config".to_string(),
            "config/site-a.toml".to_string(),
        ];
        assert_eq!(Config::resolve_config_path(&args), "config/site-a.toml");
    }

    #[test]
    fn test_resolve_config_path_from_arg_equals() {
        let args: Vec<String> =
            vec!["geofence-engine".to_string(), "--config=config/site-b.toml".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "config/site-b.toml");
    }
}
