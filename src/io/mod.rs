//! IO modules - external system interfaces
//!
//! - `snapshot_source` - catalog and device feed (JSON files)
//! - `alarm_channel` - bounded channel notifier for downstream consumers
//! - `prometheus` - metrics and sink state over HTTP
//! - `replay` - offline JSON-lines scenario replay

pub mod alarm_channel;
pub mod prometheus;
pub mod replay;
pub mod snapshot_source;

pub use alarm_channel::{create_alarm_channel, AlarmPayload, AlarmSender};
pub use snapshot_source::{FileSnapshotSource, SnapshotSource};
