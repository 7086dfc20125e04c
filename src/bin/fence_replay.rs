//! Fence Replay - offline scenario runner for the geofence engine
//!
//! Feeds a JSON-lines scenario through a fresh Tracker and prints every
//! alarm as one JSON line on stdout. Logs go to stderr.
//!
//! Usage:
//!   fence-replay scenarios/night_shift.jsonl
//!   fence-replay scenarios/night_shift.jsonl --summary --recent 10

use anyhow::Context;
use clap::Parser;
use geofence_engine::infra::Metrics;
use geofence_engine::io::replay::{read_scenario, replay};
use geofence_engine::services::{AlarmSink, Tracker};
use std::io::Write;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Replay a recorded device/fence scenario and print the alarms it raises
#[derive(Parser, Debug)]
#[command(name = "fence-replay", version, about, long_about = None)]
struct Args {
    /// Scenario file (JSON lines, one tick per line)
    scenario: String,

    /// Recent-alarm buffer size used for the final summary
    #[arg(short, long, default_value_t = 5)]
    recent: usize,

    /// Print the final sink state (recent alarms, classification) as JSON
    #[arg(short, long)]
    summary: bool,
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let ticks = read_scenario(&args.scenario)?;

    let metrics = Arc::new(Metrics::new());
    let mut tracker = Tracker::new(metrics.clone());
    let sink = AlarmSink::new(args.recent);

    let steps = replay(&ticks, &mut tracker, &sink)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for step in &steps {
        for alarm in &step.alarms {
            let json = serde_json::to_string(alarm).context("Failed to serialize alarm")?;
            writeln!(out, "{json}").context("Failed to write alarm")?;
        }
    }

    if args.summary {
        let json = serde_json::to_string_pretty(&sink.snapshot())
            .context("Failed to serialize sink state")?;
        writeln!(out, "{json}").context("Failed to write summary")?;
    }

    info!(
        ticks = %steps.len(),
        alarms = %sink.alarms_total(),
        tracked_pairs = %tracker.pair_count(),
        "replay_complete"
    );
    metrics.report().log();
    Ok(())
}
