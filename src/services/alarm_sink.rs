//! Alarm sink: recent-alarm buffer, live classification, notification hook
//!
//! One tick report is applied under a single write lock, so readers see
//! either the previous tick or the new one, never a mix. Notifiers run after
//! the lock is released.

use crate::domain::types::{AlarmEvent, DeviceId, FenceId, Violation};
use crate::services::tracker::TickReport;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{debug, warn};

pub const DEFAULT_RECENT_CAPACITY: usize = 5;

/// Receives every accepted alarm exactly once
pub trait AlarmNotifier: Send + Sync {
    fn notify(&self, alarm: &AlarmEvent);
}

/// Logs each alarm as a structured warning
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl AlarmNotifier for LogNotifier {
    fn notify(&self, alarm: &AlarmEvent) {
        warn!(
            alarm_id = %alarm.id,
            device_id = %alarm.device_id,
            fence_id = %alarm.fence_id,
            kind = %alarm.kind.as_str(),
            severity = %alarm.severity.as_str(),
            message = %alarm.message,
            "geofence_alarm"
        );
    }
}

#[derive(Debug, Default)]
struct SinkState {
    /// Newest first
    recent: VecDeque<AlarmEvent>,
    classification: FxHashMap<DeviceId, Violation>,
    violator_counts: FxHashMap<FenceId, usize>,
    tick_seq: u64,
    last_tick_ms: u64,
    alarms_total: u64,
}

/// Read-side copy of the sink state
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SinkSnapshot {
    pub tick_seq: u64,
    pub last_tick_ms: u64,
    pub alarms_total: u64,
    pub recent: Vec<AlarmEvent>,
    pub classification: FxHashMap<DeviceId, Violation>,
    pub violator_counts: FxHashMap<FenceId, usize>,
}

pub struct AlarmSink {
    state: RwLock<SinkState>,
    capacity: usize,
    notifiers: Vec<Box<dyn AlarmNotifier>>,
}

impl AlarmSink {
    /// A capacity of 0 is raised to 1
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: RwLock::new(SinkState {
                recent: VecDeque::with_capacity(capacity + 1),
                ..SinkState::default()
            }),
            capacity,
            notifiers: Vec::new(),
        }
    }

    pub fn with_notifier(mut self, notifier: impl AlarmNotifier + 'static) -> Self {
        self.notifiers.push(Box::new(notifier));
        self
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Apply one tick report; returns the number of alarms accepted
    ///
    /// An aborted report contributes its alarms but leaves the previous
    /// classification and violator counts in place.
    pub fn publish(&self, report: TickReport) -> usize {
        let TickReport { alarms, classification, violator_counts, aborted, evaluated_at_ms, .. } =
            report;
        let accepted = alarms.len();

        {
            let mut state = self.state.write();
            for alarm in &alarms {
                state.recent.push_front(alarm.clone());
            }
            state.recent.truncate(self.capacity);
            state.alarms_total += accepted as u64;
            state.tick_seq += 1;
            state.last_tick_ms = evaluated_at_ms;
            if !aborted {
                state.classification = classification;
                state.violator_counts = violator_counts;
            }
        }

        for alarm in &alarms {
            for notifier in &self.notifiers {
                notifier.notify(alarm);
            }
        }

        if aborted {
            debug!(alarms = %accepted, "sink_partial_tick_published");
        }
        accepted
    }

    /// Most recent alarms, newest first
    pub fn recent(&self) -> Vec<AlarmEvent> {
        self.state.read().recent.iter().cloned().collect()
    }

    pub fn classification(&self) -> FxHashMap<DeviceId, Violation> {
        self.state.read().classification.clone()
    }

    pub fn violation_of(&self, device_id: &str) -> Option<Violation> {
        self.state.read().classification.get(device_id).copied()
    }

    pub fn violator_count(&self, fence_id: &str) -> usize {
        self.state.read().violator_counts.get(fence_id).copied().unwrap_or(0)
    }

    pub fn alarms_total(&self) -> u64 {
        self.state.read().alarms_total
    }

    pub fn snapshot(&self) -> SinkSnapshot {
        let state = self.state.read();
        SinkSnapshot {
            tick_seq: state.tick_seq,
            last_tick_ms: state.last_tick_ms,
            alarms_total: state.alarms_total,
            recent: state.recent.iter().cloned().collect(),
            classification: state.classification.clone(),
            violator_counts: state.violator_counts.clone(),
        }
    }
}

impl Default for AlarmSink {
    fn default() -> Self {
        Self::new(DEFAULT_RECENT_CAPACITY)
    }
}
