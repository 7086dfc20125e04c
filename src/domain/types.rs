//! Shared types for the geofence engine

use serde::{Deserialize, Deserializer, Serialize};
use std::borrow::Borrow;
use uuid::Uuid;

/// Accepts both string and integer ids on the wire (catalog rows use integer keys)
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IdRepr {
        Text(String),
        Number(i64),
    }

    Ok(match IdRepr::deserialize(deserializer)? {
        IdRepr::Text(s) => s,
        IdRepr::Number(n) => n.to_string(),
    })
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(#[serde(deserialize_with = "deserialize_id")] pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Stable device identifier from the position feed
    DeviceId
);
string_id!(
    /// Fence identifier from the catalog
    FenceId
);
string_id!(
    /// Project region identifier from the catalog
    RegionId
);

/// A WGS-84 coordinate in degrees
///
/// Deserializes from either `[lat, lng]` or `{"lat": .., "lng": ..}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "GeoPointRepr")]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GeoPointRepr {
    Pair([f64; 2]),
    Object { lat: f64, lng: f64 },
}

impl From<GeoPointRepr> for GeoPoint {
    fn from(repr: GeoPointRepr) -> Self {
        match repr {
            GeoPointRepr::Pair([lat, lng]) => Self { lat, lng },
            GeoPointRepr::Object { lat, lng } => Self { lat, lng },
        }
    }
}

impl GeoPoint {
    #[inline]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}, {:.6}", self.lat, self.lng)
    }
}

fn default_online() -> bool {
    true
}

/// A tracked worker or piece of equipment, as reported by the position feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    #[serde(default)]
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default = "default_online", alias = "is_online")]
    pub online: bool,
}

impl Device {
    pub fn new(id: &str, name: &str, lat: f64, lng: f64) -> Self {
        Self { id: DeviceId::new(id), name: name.to_string(), lat, lng, online: true }
    }

    #[inline]
    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }

    /// Name used in alarm messages; falls back to the id
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            self.id.as_str()
        } else {
            &self.name
        }
    }
}

/// Fence control policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Behavior {
    /// Being inside the fence is a violation
    #[serde(rename = "No Entry", alias = "NoEntry", alias = "no_entry")]
    NoEntry,
    /// Leaving the fence while inside the bound region is a violation
    #[serde(rename = "No Exit", alias = "NoExit", alias = "no_exit")]
    NoExit,
}

impl Behavior {
    pub fn as_str(&self) -> &'static str {
        match self {
            Behavior::NoEntry => "no_entry",
            Behavior::NoExit => "no_exit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[serde(alias = "High", alias = "HIGH")]
    High,
    #[default]
    #[serde(alias = "Medium", alias = "MEDIUM")]
    Medium,
    #[serde(alias = "Low", alias = "LOW")]
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

/// Live per-device violation class, used for map coloring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Violation {
    NoEntry,
    NoExit,
}

impl Violation {
    /// Combine two simultaneous violations; NoEntry wins
    #[inline]
    pub fn merge(self, other: Violation) -> Violation {
        match (self, other) {
            (Violation::NoExit, Violation::NoExit) => Violation::NoExit,
            _ => Violation::NoEntry,
        }
    }
}

impl From<Behavior> for Violation {
    fn from(behavior: Behavior) -> Self {
        match behavior {
            Behavior::NoEntry => Violation::NoEntry,
            Behavior::NoExit => Violation::NoExit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmKind {
    IllegalEntry,
    IllegalExit,
}

impl AlarmKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmKind::IllegalEntry => "illegal_entry",
            AlarmKind::IllegalExit => "illegal_exit",
        }
    }
}

/// An alarm raised on a qualifying containment transition
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmEvent {
    pub id: String,
    pub device_id: DeviceId,
    pub device_name: String,
    pub fence_id: FenceId,
    pub fence_name: String,
    pub kind: AlarmKind,
    pub message: String,
    /// Epoch milliseconds of the tick that raised the alarm
    pub timestamp: u64,
    pub severity: Severity,
    /// Device position as "lat, lng"
    pub location: String,
    /// Raised by the first observation of a pair rather than by an edge
    pub first_observation: bool,
}

impl AlarmEvent {
    pub fn new(
        kind: AlarmKind,
        device: &Device,
        fence_id: &FenceId,
        fence_name: &str,
        severity: Severity,
        first_observation: bool,
        timestamp: u64,
    ) -> Self {
        let who = device.display_name();
        let message = match (kind, first_observation) {
            (AlarmKind::IllegalEntry, false) => format!("Illegal entry: {who} entered {fence_name}"),
            (AlarmKind::IllegalEntry, true) => {
                format!("Illegal entry (monitoring started): {who} is inside {fence_name}")
            }
            (AlarmKind::IllegalExit, false) => format!("Illegal exit: {who} left {fence_name}"),
            (AlarmKind::IllegalExit, true) => {
                format!("Illegal exit (monitoring started): {who} is outside {fence_name}")
            }
        };

        Self {
            id: Uuid::now_v7().to_string(),
            device_id: device.id.clone(),
            device_name: who.to_string(),
            fence_id: fence_id.clone(),
            fence_name: fence_name.to_string(),
            kind,
            message,
            timestamp,
            severity,
            location: device.position().to_string(),
            first_observation,
        }
    }
}
