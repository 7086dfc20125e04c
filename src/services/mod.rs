//! Services - evaluation logic and state management
//!
//! - `geometry` - circle and polygon containment
//! - `activation` - daily fence windows
//! - `tracker` - per (device, fence) state machine and the tick loop
//! - `alarm_sink` - recent alarms, classification, notifications

pub mod activation;
pub mod alarm_sink;
pub mod geometry;
pub mod tracker;

pub use alarm_sink::{AlarmNotifier, AlarmSink, LogNotifier};
pub use tracker::{RunSettings, TickReport, Tracker};
