//! Domain models - devices, fences, regions, alarms
//!
//! - `types` - identifiers, `Device`, `Behavior`, `AlarmEvent`
//! - `catalog` - fence shapes, regions and the read-only `Catalog`

pub mod catalog;
pub mod types;

pub use catalog::{Catalog, Fence, FenceShape, Region};
pub use types::{AlarmEvent, AlarmKind, Behavior, Device, DeviceId, FenceId, GeoPoint, Severity, Violation};
