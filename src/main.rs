//! Geofence engine service
//!
//! Polls the fence catalog and device snapshot, evaluates every
//! (device, fence) pair once per tick, and publishes alarms and the live
//! violation classification.
//!
//! Module structure:
//! - `domain/` - Devices, fences, regions, alarms
//! - `io/` - Snapshot files, alarm channel, Prometheus endpoint, replay
//! - `services/` - Geometry, activation windows, Tracker, AlarmSink
//! - `infra/` - Config, Metrics

use clap::Parser;
use geofence_engine::infra::{Config, Metrics};
use geofence_engine::io::{create_alarm_channel, FileSnapshotSource};
use geofence_engine::services::{AlarmSink, LogNotifier, RunSettings, Tracker};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Geofence violation detection engine
#[derive(Parser, Debug)]
#[command(name = "geofence-engine", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default: INFO, use RUST_LOG=debug for per-pair visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(git_hash = %env!("GIT_HASH"), "geofence-engine starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        tick_interval_secs = %config.tick_interval_secs(),
        catalog_file = %config.catalog_file(),
        devices_file = %config.devices_file(),
        catalog_poll_secs = %config.catalog_poll_secs(),
        recent_alarm_capacity = %config.recent_alarm_capacity(),
        prometheus_port = %config.prometheus_port(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    // Alarm sink with its notifiers
    let mut sink = AlarmSink::new(config.recent_alarm_capacity());
    if config.log_alarms() {
        sink = sink.with_notifier(LogNotifier);
    }
    if config.channel_capacity() > 0 {
        let (alarm_sender, mut alarm_rx) =
            create_alarm_channel(config.channel_capacity(), config.site_id().to_string(), metrics.clone());
        sink = sink.with_notifier(alarm_sender);

        tokio::spawn(async move {
            while let Some(payload) = alarm_rx.recv().await {
                match serde_json::to_string(&payload) {
                    Ok(json) => info!(payload = %json, "alarm_dispatched"),
                    Err(e) => error!(error = %e, "alarm_payload_serialize_failed"),
                }
            }
        });
    }
    let sink = Arc::new(sink);

    // Start Prometheus metrics HTTP server (if port > 0)
    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let prom_metrics = metrics.clone();
        let prom_sink = sink.clone();
        let site_id = config.site_id().to_string();
        let prom_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = geofence_engine::io::prometheus::start_metrics_server(
                prometheus_port,
                prom_metrics,
                prom_sink,
                site_id,
                prom_shutdown,
            )
            .await
            {
                error!(error = %e, "prometheus_server_error");
            }
        });
    }

    // Periodic metrics log line
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    let mut source = FileSnapshotSource::new(config.catalog_file(), config.devices_file());
    let settings =
        RunSettings { tick_interval: config.tick_interval(), catalog_poll: config.catalog_poll() };
    let mut tracker = Tracker::new(metrics);
    info!("tracker_started");

    tracker.run(&mut source, sink, settings, shutdown_rx).await;

    info!("geofence-engine shutdown complete");
    Ok(())
}
