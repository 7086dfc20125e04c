//! One evaluation pass over the device x fence cross product

use super::{PairState, Tracker};
use crate::domain::catalog::{Catalog, Fence};
use crate::domain::types::{AlarmEvent, AlarmKind, Behavior, Device, DeviceId, FenceId, Violation};
use crate::services::activation::TickTime;
use rustc_hash::FxHashMap;
use std::time::Instant;
use tracing::{debug, info};

/// Containment facts for one pair in one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// Device is inside the fence shape
    pub inside: bool,
    /// Device is inside the area that scopes the fence
    pub in_scope: bool,
}

impl Observation {
    /// Current-tick violation, independent of any transition
    pub fn violation(&self, behavior: Behavior) -> Option<Violation> {
        let violating = match behavior {
            Behavior::NoEntry => self.inside,
            Behavior::NoExit => self.in_scope && !self.inside,
        };
        violating.then(|| Violation::from(behavior))
    }
}

/// Transition rule for one pair
///
/// `prior` is the last observed containment (`None` = never observed).
/// Returns the alarm to raise, if any.
pub fn decide(
    behavior: Behavior,
    prior: Option<bool>,
    obs: Observation,
    cold_start: bool,
) -> Option<AlarmKind> {
    match (behavior, prior) {
        // Baseline calibration: first pass records without alarming
        (_, None) if cold_start => None,
        (Behavior::NoEntry, None) if obs.inside => Some(AlarmKind::IllegalEntry),
        (Behavior::NoExit, None) if obs.in_scope && !obs.inside => Some(AlarmKind::IllegalExit),
        (Behavior::NoEntry, Some(false)) if obs.inside => Some(AlarmKind::IllegalEntry),
        (Behavior::NoExit, Some(true)) if obs.in_scope && !obs.inside => {
            Some(AlarmKind::IllegalExit)
        }
        _ => None,
    }
}

/// Everything one pass produced, published to the sink as a unit
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub alarms: Vec<AlarmEvent>,
    /// Devices currently violating at least one active fence
    pub classification: FxHashMap<DeviceId, Violation>,
    /// Devices currently violating each fence; inactive fences report 0
    pub violator_counts: FxHashMap<FenceId, usize>,
    pub pairs_evaluated: u64,
    pub pairs_skipped_inactive: u64,
    pub online_devices: usize,
    /// Pass ran as the cold-start baseline
    pub cold_start: bool,
    /// Pass stopped early on shutdown; classification is partial
    pub aborted: bool,
    pub evaluated_at_ms: u64,
}

impl Tracker {
    /// Evaluate one tick to completion
    pub fn evaluate(&mut self, devices: &[Device], catalog: &Catalog, at: TickTime) -> TickReport {
        self.evaluate_until(devices, catalog, at, || false)
    }

    /// Evaluate one tick, checking `should_abort` before each pair
    ///
    /// Alarms raised before an abort are kept in the report. A pass with no
    /// devices or no fences evaluates nothing and leaves cold start armed.
    pub fn evaluate_until<F>(
        &mut self,
        devices: &[Device],
        catalog: &Catalog,
        at: TickTime,
        mut should_abort: F,
    ) -> TickReport
    where
        F: FnMut() -> bool,
    {
        let pass_start = Instant::now();
        let mut report = TickReport {
            cold_start: self.cold_start,
            evaluated_at_ms: at.epoch_ms,
            ..TickReport::default()
        };

        if devices.is_empty() || catalog.is_empty() {
            debug!(devices = %devices.len(), fences = %catalog.fences().len(), "tick_nothing_to_evaluate");
            report.cold_start = false;
            self.metrics.set_violating_devices(0);
            return report;
        }

        self.prune(catalog, devices);

        // Activity is a function of wall-clock time; compute once per fence per pass
        let active: Vec<bool> = catalog.fences().iter().map(|f| f.is_active_at(at.local)).collect();
        report.violator_counts = catalog.fences().iter().map(|f| (f.id.clone(), 0)).collect();

        'devices: for device in devices.iter().filter(|d| d.online) {
            report.online_devices += 1;
            for (fence, is_active) in catalog.fences().iter().zip(&active) {
                if should_abort() {
                    report.aborted = true;
                    break 'devices;
                }
                if !fence.applies_to(device.id.as_str()) {
                    continue;
                }
                if !*is_active {
                    report.pairs_skipped_inactive += 1;
                    continue;
                }
                self.evaluate_pair(device, fence, catalog, at, &mut report);
            }
        }

        if !report.aborted {
            self.cold_start = false;
        }
        self.finish_tick(&report, pass_start);
        report
    }

    fn evaluate_pair(
        &mut self,
        device: &Device,
        fence: &Fence,
        catalog: &Catalog,
        at: TickTime,
        report: &mut TickReport,
    ) {
        let position = device.position();
        let obs = Observation {
            inside: fence.contains(position),
            in_scope: catalog.in_scope(fence, position),
        };

        let prior = self.last_inside(device.id.as_str(), fence.id.as_str());
        report.pairs_evaluated += 1;

        if let Some(kind) = decide(fence.behavior, prior, obs, self.cold_start) {
            let alarm = AlarmEvent::new(
                kind,
                device,
                &fence.id,
                &fence.name,
                fence.severity,
                prior.is_none(),
                at.epoch_ms,
            );
            info!(
                alarm_id = %alarm.id,
                device_id = %device.id,
                fence_id = %fence.id,
                kind = %kind.as_str(),
                severity = %fence.severity.as_str(),
                first_observation = %alarm.first_observation,
                location = %alarm.location,
                "alarm_raised"
            );
            self.metrics.record_alarm(kind);
            report.alarms.push(alarm);
        }

        if let Some(violation) = obs.violation(fence.behavior) {
            report
                .classification
                .entry(device.id.clone())
                .and_modify(|v| *v = v.merge(violation))
                .or_insert(violation);
            *report.violator_counts.entry(fence.id.clone()).or_insert(0) += 1;
        }

        self.record(&device.id, &fence.id, obs.inside, at.epoch_ms);
    }

    fn record(&mut self, device_id: &DeviceId, fence_id: &FenceId, inside: bool, at_ms: u64) {
        let state = PairState { last_inside: inside, last_evaluated_ms: at_ms };
        match self.pairs.get_mut(device_id.as_str()) {
            Some(fences) => {
                fences.insert(fence_id.clone(), state);
            }
            None => {
                let mut fences = FxHashMap::default();
                fences.insert(fence_id.clone(), state);
                self.pairs.insert(device_id.clone(), fences);
            }
        }
    }

    fn finish_tick(&self, report: &TickReport, pass_start: Instant) {
        let latency_us = pass_start.elapsed().as_micros() as u64;
        self.metrics.record_tick(latency_us, report.pairs_evaluated, report.pairs_skipped_inactive);
        if report.aborted {
            self.metrics.record_tick_aborted();
        }
        self.metrics.set_tracked_pairs(self.pair_count() as u64);
        self.metrics.set_online_devices(report.online_devices as u64);
        if !report.aborted {
            self.metrics.set_violating_devices(report.classification.len() as u64);
        }

        info!(
            pairs_evaluated = %report.pairs_evaluated,
            pairs_skipped_inactive = %report.pairs_skipped_inactive,
            online_devices = %report.online_devices,
            alarms = %report.alarms.len(),
            violating_devices = %report.classification.len(),
            cold_start = %report.cold_start,
            aborted = %report.aborted,
            latency_us = %latency_us,
            "tick_evaluated"
        );
    }
}
