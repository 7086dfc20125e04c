//! Integration tests for configuration loading

use geofence_engine::infra::Config;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[site]
id = "tunnel-3"

[engine]
tick_interval_secs = 15
recent_alarm_capacity = 20

[feed]
catalog_file = "/srv/fences/catalog.json"
devices_file = "/srv/fences/devices.json"
catalog_poll_secs = 300

[metrics]
interval_secs = 10
prometheus_port = 9191

[notify]
channel_capacity = 64
log_alarms = false
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.site_id(), "tunnel-3");
    assert_eq!(config.tick_interval(), Duration::from_secs(15));
    assert_eq!(config.recent_alarm_capacity(), 20);
    assert_eq!(config.catalog_file(), "/srv/fences/catalog.json");
    assert_eq!(config.devices_file(), "/srv/fences/devices.json");
    assert_eq!(config.catalog_poll(), Duration::from_secs(300));
    assert_eq!(config.metrics_interval_secs(), 10);
    assert_eq!(config.prometheus_port(), 9191);
    assert_eq!(config.channel_capacity(), 64);
    assert!(!config.log_alarms());
    assert_eq!(config.config_file(), temp_file.path().display().to_string());
}

#[test]
fn test_invalid_toml_is_error() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[engine\ntick_interval_secs = ").unwrap();
    temp_file.flush().unwrap();

    let err = Config::from_file(temp_file.path()).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to parse config file"));
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.site_id(), "geofence");
    assert_eq!(config.tick_interval_secs(), 60);
    assert_eq!(config.recent_alarm_capacity(), 5);
    assert_eq!(config.config_file(), "default");
}
