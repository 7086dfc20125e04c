//! Violation state tracking and the evaluation loop
//!
//! The Tracker owns one `PairState` per (device, fence) pair and turns
//! successive containment observations into edge-triggered alarms:
//! - NoEntry fences alarm on outside -> inside
//! - NoExit fences alarm on inside -> outside while the device is inside the
//!   fence's bound region
//!
//! The very first pass after construction (cold start) records state without
//! alarming, so devices already mid-violation at startup do not flood the
//! sink. Pairs first seen on later passes alarm immediately.

mod evaluate;

pub use evaluate::{decide, Observation, TickReport};

use crate::domain::catalog::Catalog;
use crate::domain::types::{Device, DeviceId, FenceId};
use crate::infra::metrics::Metrics;
use crate::io::snapshot_source::SnapshotSource;
use crate::services::activation::TickTime;
use crate::services::alarm_sink::AlarmSink;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, interval_at, Duration, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

/// Last observed containment of one (device, fence) pair
///
/// Pairs that were never evaluated have no entry at all (the Unset state).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairState {
    pub last_inside: bool,
    /// Epoch ms of the last pass that evaluated this pair
    pub last_evaluated_ms: u64,
}

/// Cadence of the evaluation loop
#[derive(Debug, Clone, Copy)]
pub struct RunSettings {
    pub tick_interval: Duration,
    pub catalog_poll: Duration,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self { tick_interval: Duration::from_secs(60), catalog_poll: Duration::from_secs(60) }
    }
}

/// Per-pair violation state machine
pub struct Tracker {
    /// Pair states keyed by device, then fence
    pub(crate) pairs: FxHashMap<DeviceId, FxHashMap<FenceId, PairState>>,
    /// True until the first pass over a non-empty snapshot completes
    pub(crate) cold_start: bool,
    pub(crate) metrics: Arc<Metrics>,
}

impl Tracker {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { pairs: FxHashMap::default(), cold_start: true, metrics }
    }

    /// Drop all pair state and re-arm cold start
    pub fn reset(&mut self) {
        let dropped = self.pair_count();
        self.pairs.clear();
        self.cold_start = true;
        self.metrics.set_tracked_pairs(0);
        info!(dropped_pairs = %dropped, "tracker_reset");
    }

    #[inline]
    pub fn is_cold_start(&self) -> bool {
        self.cold_start
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.values().map(|fences| fences.len()).sum()
    }

    /// Last observed containment for a pair; `None` if never evaluated
    pub fn last_inside(&self, device_id: &str, fence_id: &str) -> Option<bool> {
        self.pairs.get(device_id)?.get(fence_id).map(|s| s.last_inside)
    }

    /// Forget every pair of a deleted fence
    pub fn forget_fence(&mut self, fence_id: &str) {
        let mut removed = 0usize;
        self.pairs.retain(|_, fences| {
            if fences.remove(fence_id).is_some() {
                removed += 1;
            }
            !fences.is_empty()
        });
        debug!(fence_id = %fence_id, removed = %removed, "tracker_fence_forgotten");
    }

    /// Forget every pair of a removed device
    pub fn forget_device(&mut self, device_id: &str) {
        if let Some(fences) = self.pairs.remove(device_id) {
            debug!(device_id = %device_id, removed = %fences.len(), "tracker_device_forgotten");
        }
    }

    /// Garbage-collect pairs whose fence or device is gone, or whose fence
    /// allow-list no longer admits the device
    ///
    /// Offline devices are still part of the snapshot and keep their state.
    pub fn prune(&mut self, catalog: &Catalog, devices: &[Device]) -> usize {
        let known_devices: rustc_hash::FxHashSet<&str> =
            devices.iter().map(|d| d.id.as_str()).collect();
        let mut removed = 0usize;

        self.pairs.retain(|device_id, fences| {
            if !known_devices.contains(device_id.as_str()) {
                removed += fences.len();
                return false;
            }
            fences.retain(|fence_id, _| {
                let keep = catalog
                    .fence(fence_id.as_str())
                    .is_some_and(|fence| fence.applies_to(device_id.as_str()));
                if !keep {
                    removed += 1;
                }
                keep
            });
            !fences.is_empty()
        });

        if removed > 0 {
            debug!(removed = %removed, "tracker_pairs_pruned");
        }
        removed
    }

    /// Run the periodic evaluation loop until shutdown
    ///
    /// The catalog is loaded once up front and then polled on its own
    /// cadence. A failed load keeps the last good catalog or device list.
    pub async fn run<S: SnapshotSource>(
        &mut self,
        source: &mut S,
        sink: Arc<AlarmSink>,
        settings: RunSettings,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut catalog = match source.load_catalog() {
            Ok(catalog) => catalog,
            Err(e) => {
                error!(error = %e, "catalog_initial_load_failed");
                self.metrics.record_catalog_load_failed();
                Catalog::empty()
            }
        };
        let mut devices: Vec<Device> = Vec::new();

        let mut tick_interval = interval(settings.tick_interval);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut catalog_interval =
            interval_at(Instant::now() + settings.catalog_poll, settings.catalog_poll);
        catalog_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            tick_interval_secs = %settings.tick_interval.as_secs(),
            catalog_poll_secs = %settings.catalog_poll.as_secs(),
            fences = %catalog.fences().len(),
            regions = %catalog.region_count(),
            "tracker_loop_started"
        );

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    match source.load_devices() {
                        Ok(latest) => devices = latest,
                        Err(e) => {
                            error!(error = %e, "device_feed_load_failed");
                            self.metrics.record_device_feed_failed();
                        }
                    }

                    let abort = shutdown.clone();
                    let report =
                        self.evaluate_until(&devices, &catalog, TickTime::now(), || *abort.borrow());
                    sink.publish(report);
                }
                _ = catalog_interval.tick() => {
                    match source.load_catalog() {
                        Ok(latest) => {
                            debug!(fences = %latest.fences().len(), "catalog_reloaded");
                            catalog = latest;
                        }
                        Err(e) => {
                            error!(error = %e, "catalog_reload_failed");
                            self.metrics.record_catalog_load_failed();
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(pairs = %self.pair_count(), "tracker_loop_stopped");
    }
}
