//! Offline scenario replay
//!
//! A scenario is a JSON-lines file, one evaluation tick per line:
//!
//! ```text
//! {"time": "08:30", "catalog": {"fences": [...], "regions": [...]}, "devices": [...]}
//! {"time": "08:31", "devices": [...]}
//! ```
//!
//! `catalog` is optional after the first line; the last one seen carries
//! over. Blank lines and lines starting with `#` are ignored.

use crate::domain::catalog::Catalog;
use crate::domain::types::{AlarmEvent, Device};
use crate::services::activation::{parse_minutes, TickTime};
use crate::services::alarm_sink::AlarmSink;
use crate::services::tracker::Tracker;
use anyhow::{Context, Result};
use chrono::NaiveTime;
use serde::Deserialize;
use std::io::BufRead;
use std::path::Path;
use tracing::debug;

/// One scripted tick
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayTick {
    /// Local time of day, "HH:MM"
    pub time: String,
    /// Alarm timestamp; defaults to one minute per tick from 0
    #[serde(default)]
    pub epoch_ms: Option<u64>,
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub catalog: Option<Catalog>,
}

impl ReplayTick {
    pub fn tick_time(&self, seq: u64) -> Result<TickTime> {
        let minutes = parse_minutes(&self.time)
            .with_context(|| format!("Bad replay time '{}'", self.time))?;
        let local = NaiveTime::from_hms_opt(u32::from(minutes / 60), u32::from(minutes % 60), 0)
            .with_context(|| format!("Bad replay time '{}'", self.time))?;
        Ok(TickTime::at(local, self.epoch_ms.unwrap_or(seq * 60_000)))
    }
}

pub fn parse_scenario<R: BufRead>(reader: R) -> Result<Vec<ReplayTick>> {
    let mut ticks = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read scenario line {}", idx + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let tick: ReplayTick = serde_json::from_str(trimmed)
            .with_context(|| format!("Failed to parse scenario line {}", idx + 1))?;
        ticks.push(tick);
    }
    Ok(ticks)
}

pub fn read_scenario<P: AsRef<Path>>(path: P) -> Result<Vec<ReplayTick>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open scenario {}", path.display()))?;
    parse_scenario(std::io::BufReader::new(file))
}

/// Alarms raised by one replayed tick
#[derive(Debug, Clone)]
pub struct ReplayStep {
    pub seq: u64,
    pub time: String,
    pub alarms: Vec<AlarmEvent>,
    pub violating_devices: usize,
}

/// Drive `tracker` through the scenario, publishing every tick to `sink`
pub fn replay(
    ticks: &[ReplayTick],
    tracker: &mut Tracker,
    sink: &AlarmSink,
) -> Result<Vec<ReplayStep>> {
    let mut catalog = Catalog::empty();
    let mut steps = Vec::with_capacity(ticks.len());

    for (seq, tick) in ticks.iter().enumerate() {
        let seq = seq as u64;
        if let Some(next) = &tick.catalog {
            catalog = next.clone();
        }
        let at = tick.tick_time(seq)?;
        let report = tracker.evaluate(&tick.devices, &catalog, at);
        let alarms = report.alarms.clone();
        let violating_devices = report.classification.len();
        sink.publish(report);

        debug!(seq = %seq, time = %tick.time, alarms = %alarms.len(), "replay_tick");
        steps.push(ReplayStep { seq, time: tick.time.clone(), alarms, violating_devices });
    }
    Ok(steps)
}
