//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! Counter updates are lock-free; `report()` swaps the periodic counters
//! to zero for the log line, `snapshot()` reads without resetting for the
//! Prometheus endpoint.
//!
//! NOTE: All atomics use Relaxed ordering. These are statistical counters
//! only and must not drive evaluation logic.

use crate::domain::types::AlarmKind;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    std::array::from_fn(|i| buckets[i].swap(0, Ordering::Relaxed))
}

#[inline]
fn load_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    std::array::from_fn(|i| buckets[i].load(Ordering::Relaxed))
}

/// Upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Last bucket uses 2x the previous bound
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
pub struct Metrics {
    /// Evaluation passes completed (monotonic)
    ticks_total: AtomicU64,
    /// Passes cut short by shutdown (monotonic)
    ticks_aborted: AtomicU64,
    /// Passes since last report (reset on report)
    ticks_since_report: AtomicU64,
    pairs_evaluated: AtomicU64,
    /// Pairs skipped because the fence was disabled or outside its window
    pairs_skipped_inactive: AtomicU64,
    entry_alarms: AtomicU64,
    exit_alarms: AtomicU64,
    /// Alarm notifications dropped because a channel was full
    notifications_dropped: AtomicU64,
    catalog_load_failures: AtomicU64,
    device_feed_failures: AtomicU64,
    tracked_pairs: AtomicU64,
    violating_devices: AtomicU64,
    online_devices: AtomicU64,
    /// Tick latency histogram since startup (Prometheus)
    tick_latency_buckets: [AtomicU64; NUM_BUCKETS],
    tick_latency_sum_total_us: AtomicU64,
    /// Tick latency histogram since last report (log line)
    period_latency_buckets: [AtomicU64; NUM_BUCKETS],
    period_latency_sum_us: AtomicU64,
    period_latency_max_us: AtomicU64,
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            ticks_total: AtomicU64::new(0),
            ticks_aborted: AtomicU64::new(0),
            ticks_since_report: AtomicU64::new(0),
            pairs_evaluated: AtomicU64::new(0),
            pairs_skipped_inactive: AtomicU64::new(0),
            entry_alarms: AtomicU64::new(0),
            exit_alarms: AtomicU64::new(0),
            notifications_dropped: AtomicU64::new(0),
            catalog_load_failures: AtomicU64::new(0),
            device_feed_failures: AtomicU64::new(0),
            tracked_pairs: AtomicU64::new(0),
            violating_devices: AtomicU64::new(0),
            online_devices: AtomicU64::new(0),
            tick_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            tick_latency_sum_total_us: AtomicU64::new(0),
            period_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            period_latency_sum_us: AtomicU64::new(0),
            period_latency_max_us: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record a completed (or aborted) evaluation pass
    #[inline]
    pub fn record_tick(&self, latency_us: u64, pairs_evaluated: u64, pairs_skipped: u64) {
        self.ticks_total.fetch_add(1, Ordering::Relaxed);
        self.ticks_since_report.fetch_add(1, Ordering::Relaxed);
        self.pairs_evaluated.fetch_add(pairs_evaluated, Ordering::Relaxed);
        self.pairs_skipped_inactive.fetch_add(pairs_skipped, Ordering::Relaxed);

        let bucket = bucket_index(latency_us);
        self.tick_latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.tick_latency_sum_total_us.fetch_add(latency_us, Ordering::Relaxed);
        self.period_latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.period_latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        update_atomic_max(&self.period_latency_max_us, latency_us);
    }

    #[inline]
    pub fn record_tick_aborted(&self) {
        self.ticks_aborted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_alarm(&self, kind: AlarmKind) {
        match kind {
            AlarmKind::IllegalEntry => self.entry_alarms.fetch_add(1, Ordering::Relaxed),
            AlarmKind::IllegalExit => self.exit_alarms.fetch_add(1, Ordering::Relaxed),
        };
    }

    #[inline]
    pub fn record_notification_dropped(&self) {
        self.notifications_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_catalog_load_failed(&self) {
        self.catalog_load_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_device_feed_failed(&self) {
        self.device_feed_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_tracked_pairs(&self, pairs: u64) {
        self.tracked_pairs.store(pairs, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_violating_devices(&self, devices: u64) {
        self.violating_devices.store(devices, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_online_devices(&self, devices: u64) {
        self.online_devices.store(devices, Ordering::Relaxed);
    }

    #[inline]
    pub fn ticks_total(&self) -> u64 {
        self.ticks_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn alarms_total(&self) -> u64 {
        self.entry_alarms.load(Ordering::Relaxed) + self.exit_alarms.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn notifications_dropped(&self) -> u64 {
        self.notifications_dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn tracked_pairs(&self) -> u64 {
        self.tracked_pairs.load(Ordering::Relaxed)
    }

    /// Read every counter without resetting anything
    pub fn snapshot(&self) -> MetricsSnapshot {
        let tick_latency_buckets = load_buckets(&self.tick_latency_buckets);
        MetricsSnapshot {
            ticks_total: self.ticks_total.load(Ordering::Relaxed),
            ticks_aborted: self.ticks_aborted.load(Ordering::Relaxed),
            pairs_evaluated: self.pairs_evaluated.load(Ordering::Relaxed),
            pairs_skipped_inactive: self.pairs_skipped_inactive.load(Ordering::Relaxed),
            entry_alarms: self.entry_alarms.load(Ordering::Relaxed),
            exit_alarms: self.exit_alarms.load(Ordering::Relaxed),
            notifications_dropped: self.notifications_dropped.load(Ordering::Relaxed),
            catalog_load_failures: self.catalog_load_failures.load(Ordering::Relaxed),
            device_feed_failures: self.device_feed_failures.load(Ordering::Relaxed),
            tracked_pairs: self.tracked_pairs.load(Ordering::Relaxed),
            violating_devices: self.violating_devices.load(Ordering::Relaxed),
            online_devices: self.online_devices.load(Ordering::Relaxed),
            tick_latency_sum_us: self.tick_latency_sum_total_us.load(Ordering::Relaxed),
            tick_latency_p50_us: percentile_from_buckets(&tick_latency_buckets, 0.50),
            tick_latency_p95_us: percentile_from_buckets(&tick_latency_buckets, 0.95),
            tick_latency_p99_us: percentile_from_buckets(&tick_latency_buckets, 0.99),
            tick_latency_buckets,
        }
    }

    /// Summarize the period since the last report, then reset periodic counters
    pub fn report(&self) -> MetricsSummary {
        let ticks = self.ticks_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.period_latency_sum_us.swap(0, Ordering::Relaxed);
        let max_latency = self.period_latency_max_us.swap(0, Ordering::Relaxed);
        let buckets = swap_buckets(&self.period_latency_buckets);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };
        let ticks_per_min = if elapsed.as_secs_f64() > 0.0 {
            ticks as f64 * 60.0 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        MetricsSummary {
            ticks_total: self.ticks_total.load(Ordering::Relaxed),
            ticks_in_period: ticks,
            ticks_per_min,
            avg_tick_latency_us: if ticks > 0 { latency_sum / ticks } else { 0 },
            max_tick_latency_us: max_latency,
            tick_p50_us: percentile_from_buckets(&buckets, 0.50),
            tick_p95_us: percentile_from_buckets(&buckets, 0.95),
            tick_p99_us: percentile_from_buckets(&buckets, 0.99),
            alarms_total: self.alarms_total(),
            tracked_pairs: self.tracked_pairs(),
            violating_devices: self.violating_devices.load(Ordering::Relaxed),
            online_devices: self.online_devices.load(Ordering::Relaxed),
            notifications_dropped: self.notifications_dropped(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of histogram buckets (exported for Prometheus formatting)
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;
pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;

/// Point-in-time view of every counter
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub ticks_total: u64,
    pub ticks_aborted: u64,
    pub pairs_evaluated: u64,
    pub pairs_skipped_inactive: u64,
    pub entry_alarms: u64,
    pub exit_alarms: u64,
    pub notifications_dropped: u64,
    pub catalog_load_failures: u64,
    pub device_feed_failures: u64,
    pub tracked_pairs: u64,
    pub violating_devices: u64,
    pub online_devices: u64,
    /// Cumulative tick latency histogram
    /// Bounds: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200 µs
    pub tick_latency_buckets: [u64; NUM_BUCKETS],
    pub tick_latency_sum_us: u64,
    pub tick_latency_p50_us: u64,
    pub tick_latency_p95_us: u64,
    pub tick_latency_p99_us: u64,
}

#[derive(Debug)]
pub struct MetricsSummary {
    pub ticks_total: u64,
    pub ticks_in_period: u64,
    pub ticks_per_min: f64,
    pub avg_tick_latency_us: u64,
    pub max_tick_latency_us: u64,
    pub tick_p50_us: u64,
    pub tick_p95_us: u64,
    pub tick_p99_us: u64,
    pub alarms_total: u64,
    pub tracked_pairs: u64,
    pub violating_devices: u64,
    pub online_devices: u64,
    pub notifications_dropped: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            ticks_total = %self.ticks_total,
            ticks_per_min = format!("{:.2}", self.ticks_per_min),
            avg_tick_us = %self.avg_tick_latency_us,
            max_tick_us = %self.max_tick_latency_us,
            p50_us = %self.tick_p50_us,
            p95_us = %self.tick_p95_us,
            p99_us = %self.tick_p99_us,
            alarms_total = %self.alarms_total,
            tracked_pairs = %self.tracked_pairs,
            violating_devices = %self.violating_devices,
            online_devices = %self.online_devices,
            notifications_dropped = %self.notifications_dropped,
            "metrics"
        );
    }
}
