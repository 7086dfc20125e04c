//! Typed channel for alarm notifications
//!
//! Non-blocking: if the channel is full the alarm is dropped and counted.
//! The sink keeps its own copy, so a dropped notification loses nothing but
//! the push to the downstream consumer.

use crate::domain::types::AlarmEvent;
use crate::infra::metrics::Metrics;
use crate::services::alarm_sink::AlarmNotifier;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Alarm as delivered to downstream consumers
#[derive(Debug, Clone, Serialize)]
pub struct AlarmPayload {
    pub site: String,
    #[serde(flatten)]
    pub alarm: AlarmEvent,
}

/// Sender handle for alarm notifications
#[derive(Clone)]
pub struct AlarmSender {
    tx: mpsc::Sender<AlarmPayload>,
    site_id: String,
    metrics: Arc<Metrics>,
}

impl AlarmSender {
    pub fn new(tx: mpsc::Sender<AlarmPayload>, site_id: String, metrics: Arc<Metrics>) -> Self {
        Self { tx, site_id, metrics }
    }
}

impl AlarmNotifier for AlarmSender {
    fn notify(&self, alarm: &AlarmEvent) {
        let payload = AlarmPayload { site: self.site_id.clone(), alarm: alarm.clone() };
        if self.tx.try_send(payload).is_err() {
            self.metrics.record_notification_dropped();
            debug!(alarm_id = %alarm.id, "alarm_notification_dropped");
        }
    }
}

/// Create a new alarm channel pair
pub fn create_alarm_channel(
    buffer_size: usize,
    site_id: String,
    metrics: Arc<Metrics>,
) -> (AlarmSender, mpsc::Receiver<AlarmPayload>) {
    let (tx, rx) = mpsc::channel(buffer_size.max(1));
    (AlarmSender::new(tx, site_id, metrics), rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{AlarmKind, Device, FenceId, Severity};

    fn alarm() -> AlarmEvent {
        AlarmEvent::new(
            AlarmKind::IllegalExit,
            &Device::new("D1", "Wang", 1.0, 2.0),
            &FenceId::new("F1"),
            "Yard",
            Severity::Medium,
            false,
            42,
        )
    }

    #[tokio::test]
    async fn test_payload_carries_site_and_flattened_alarm() {
        let metrics = Arc::new(Metrics::new());
        let (sender, mut rx) = create_alarm_channel(4, "site-a".to_string(), metrics);
        sender.notify(&alarm());

        let payload = rx.recv().await.unwrap();
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["site"], "site-a");
        assert_eq!(json["deviceId"], "D1");
        assert_eq!(json["kind"], "illegal_exit");
        assert_eq!(json["location"], "1.000000, 2.000000");
    }

    #[tokio::test]
    async fn test_full_channel_drops_and_counts() {
        let metrics = Arc::new(Metrics::new());
        let (sender, _rx) = create_alarm_channel(1, "s".to_string(), metrics.clone());
        sender.notify(&alarm());
        sender.notify(&alarm());
        sender.notify(&alarm());
        assert_eq!(metrics.notifications_dropped(), 2);
    }
}
