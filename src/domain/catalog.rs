//! Fence and region catalog
//!
//! The catalog is owned by the surrounding application and handed to the
//! engine by value. It is read-only from the engine's point of view; a new
//! `Catalog` replaces the old one whenever the source is polled.

use crate::domain::types::{Behavior, DeviceId, FenceId, GeoPoint, RegionId, Severity};
use crate::services::activation::{resolve_window, TimeWindow};
use crate::services::geometry;
use chrono::NaiveTime;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Deserializer};
use tracing::warn;

/// Fence geometry; each variant carries only the data its shape needs
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FenceShape {
    Circle {
        center: GeoPoint,
        /// Metres. A missing radius contains nothing.
        #[serde(default)]
        radius: Option<f64>,
    },
    Polygon {
        #[serde(default)]
        points: Vec<GeoPoint>,
    },
}

impl FenceShape {
    /// Malformed shapes (missing radius, fewer than 3 vertices) contain nothing
    pub fn contains(&self, point: GeoPoint) -> bool {
        match self {
            FenceShape::Circle { center, radius: Some(radius) }
                if radius.is_finite() && *radius >= 0.0 =>
            {
                geometry::in_circle(point, *center, *radius)
            }
            FenceShape::Circle { .. } => false,
            FenceShape::Polygon { points } => geometry::in_polygon(point, points),
        }
    }
}

fn default_enabled() -> bool {
    true
}

/// The fence store keeps `is_active` as an integer column; accept 0/1 too
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum FlagRepr {
        Bool(bool),
        Number(i64),
    }

    Ok(match FlagRepr::deserialize(deserializer)? {
        FlagRepr::Bool(b) => b,
        FlagRepr::Number(n) => n != 0,
    })
}

/// Fence as it appears on the wire
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FenceRecord {
    id: FenceId,
    #[serde(default)]
    name: String,
    shape: FenceShape,
    behavior: Behavior,
    #[serde(default)]
    start_time: Option<String>,
    #[serde(default)]
    end_time: Option<String>,
    /// Combined "START-END" form used by the fence store
    #[serde(default, alias = "effective_time")]
    effective_time: Option<String>,
    #[serde(default, alias = "level", alias = "alarm_type")]
    severity: Severity,
    #[serde(default, alias = "projectRegionId", alias = "project_region_id")]
    region_id: Option<RegionId>,
    #[serde(default, alias = "deviceIds")]
    device_allow_list: Vec<DeviceId>,
    #[serde(default = "default_enabled", alias = "is_active", deserialize_with = "deserialize_flag")]
    enabled: bool,
    #[serde(default, alias = "remark")]
    description: Option<String>,
}

/// An administrator-defined fence
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "FenceRecord")]
pub struct Fence {
    pub id: FenceId,
    pub name: String,
    pub shape: FenceShape,
    pub behavior: Behavior,
    /// Daily activation window; `None` means always active
    pub window: Option<TimeWindow>,
    pub severity: Severity,
    pub region_id: Option<RegionId>,
    /// Devices this fence applies to; empty means every device
    pub allow_list: FxHashSet<DeviceId>,
    pub enabled: bool,
    pub description: Option<String>,
}

impl From<FenceRecord> for Fence {
    fn from(record: FenceRecord) -> Self {
        let window = resolve_window(
            record.start_time.as_deref(),
            record.end_time.as_deref(),
            record.effective_time.as_deref(),
        );
        Self {
            id: record.id,
            name: record.name,
            shape: record.shape,
            behavior: record.behavior,
            window,
            severity: record.severity,
            region_id: record.region_id,
            allow_list: record.device_allow_list.into_iter().collect(),
            enabled: record.enabled,
            description: record.description,
        }
    }
}

impl Fence {
    fn with_shape(id: &str, name: &str, shape: FenceShape, behavior: Behavior) -> Self {
        Self {
            id: FenceId::new(id),
            name: name.to_string(),
            shape,
            behavior,
            window: None,
            severity: Severity::default(),
            region_id: None,
            allow_list: FxHashSet::default(),
            enabled: true,
            description: None,
        }
    }

    pub fn circle(id: &str, name: &str, center: GeoPoint, radius_m: f64, behavior: Behavior) -> Self {
        Self::with_shape(id, name, FenceShape::Circle { center, radius: Some(radius_m) }, behavior)
    }

    pub fn polygon(id: &str, name: &str, points: Vec<GeoPoint>, behavior: Behavior) -> Self {
        Self::with_shape(id, name, FenceShape::Polygon { points }, behavior)
    }

    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = Some(window);
        self
    }

    pub fn with_region(mut self, region_id: &str) -> Self {
        self.region_id = Some(RegionId::new(region_id));
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_allowed_devices<'a>(mut self, ids: impl IntoIterator<Item = &'a str>) -> Self {
        self.allow_list = ids.into_iter().map(DeviceId::new).collect();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Enabled and inside its daily window
    #[inline]
    pub fn is_active_at(&self, now: NaiveTime) -> bool {
        self.enabled && self.window.map_or(true, |w| w.contains(now))
    }

    /// Empty allow-list applies to every device
    #[inline]
    pub fn applies_to(&self, device_id: &str) -> bool {
        self.allow_list.is_empty() || self.allow_list.contains(device_id)
    }

    #[inline]
    pub fn contains(&self, point: GeoPoint) -> bool {
        self.shape.contains(point)
    }
}

/// A project region; scopes NoExit fences
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Region {
    pub id: RegionId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub points: Vec<GeoPoint>,
    #[serde(default)]
    pub remark: Option<String>,
}

impl Region {
    pub fn new(id: &str, name: &str, points: Vec<GeoPoint>) -> Self {
        Self { id: RegionId::new(id), name: name.to_string(), points, remark: None }
    }

    #[inline]
    pub fn contains(&self, point: GeoPoint) -> bool {
        geometry::in_polygon(point, &self.points)
    }
}

/// Entries are kept raw so one malformed record only drops itself
#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    fences: Vec<serde_json::Value>,
    #[serde(default)]
    regions: Vec<serde_json::Value>,
}

fn parse_entries<T: serde::de::DeserializeOwned>(entries: Vec<serde_json::Value>, kind: &str) -> Vec<T> {
    entries
        .into_iter()
        .enumerate()
        .filter_map(|(idx, raw)| {
            let id = raw.get("id").map(|v| v.to_string()).unwrap_or_default();
            match serde_json::from_value(raw) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(kind = %kind, index = %idx, id = %id, error = %e, "catalog_entry_skipped");
                    None
                }
            }
        })
        .collect()
}

/// Read-only view over the current fence and region set
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "CatalogFile")]
pub struct Catalog {
    fences: Vec<Fence>,
    regions: FxHashMap<RegionId, Region>,
}

impl From<CatalogFile> for Catalog {
    fn from(file: CatalogFile) -> Self {
        Self::new(parse_entries(file.fences, "fence"), parse_entries(file.regions, "region"))
    }
}

impl Catalog {
    /// Duplicate fence ids would share tracker state; the first one wins
    pub fn new(fences: Vec<Fence>, regions: Vec<Region>) -> Self {
        let mut seen = FxHashSet::default();
        let fences = fences
            .into_iter()
            .filter(|f| {
                let first = seen.insert(f.id.clone());
                if !first {
                    warn!(fence_id = %f.id, name = %f.name, "duplicate_fence_dropped");
                }
                first
            })
            .collect();
        let regions = regions.into_iter().map(|r| (r.id.clone(), r)).collect();
        Self { fences, regions }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    #[inline]
    pub fn fences(&self) -> &[Fence] {
        &self.fences
    }

    pub fn fence(&self, id: &str) -> Option<&Fence> {
        self.fences.iter().find(|f| f.id.as_str() == id)
    }

    pub fn region(&self, id: &str) -> Option<&Region> {
        self.regions.get(id)
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fences.is_empty()
    }

    /// Whether `point` is inside the controlled area that scopes `fence`
    ///
    /// Bound fences use their region polygon; a binding to a region missing
    /// from the catalog scopes nothing. Unbound NoEntry fences are always in
    /// scope; unbound NoExit fences never are.
    pub fn in_scope(&self, fence: &Fence, point: GeoPoint) -> bool {
        match (&fence.region_id, fence.behavior) {
            (Some(region_id), _) => self.region(region_id.as_str()).is_some_and(|r| r.contains(point)),
            (None, Behavior::NoEntry) => true,
            (None, Behavior::NoExit) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(lat: f64, lng: f64) -> GeoPoint {
        GeoPoint::new(lat, lng)
    }

    const CATALOG_JSON: &str = r#"{
        "fences": [
            {
                "id": 1,
                "name": "Crane Zone",
                "shape": {"type": "circle", "center": [31.2304, 121.4737], "radius": 50},
                "behavior": "No Entry",
                "effectiveTime": "08:00-18:00",
                "level": "High",
                "deviceIds": ["D1", "D2"]
            },
            {
                "id": "F2",
                "name": "Site Boundary",
                "shape": {"type": "polygon", "points": [[0,0],[0,10],[10,10],[10,0]]},
                "behavior": "No Exit",
                "startTime": "22:00",
                "endTime": "06:00",
                "projectRegionId": 9,
                "is_active": false,
                "remark": "night shift"
            }
        ],
        "regions": [
            {"id": 9, "name": "Project A", "points": [{"lat": -5, "lng": -5}, {"lat": -5, "lng": 15}, {"lat": 15, "lng": 15}, {"lat": 15, "lng": -5}]}
        ]
    }"#;

    #[test]
    fn test_deserialize_catalog() {
        let catalog: Catalog = serde_json::from_str(CATALOG_JSON).unwrap();
        assert_eq!(catalog.fences().len(), 2);
        assert_eq!(catalog.region_count(), 1);

        let crane = catalog.fence("1").unwrap();
        assert_eq!(crane.behavior, Behavior::NoEntry);
        assert_eq!(crane.severity, Severity::High);
        assert_eq!(crane.window.unwrap().to_string(), "08:00-18:00");
        assert!(crane.applies_to("D1"));
        assert!(!crane.applies_to("D3"));
        assert!(crane.enabled);

        let boundary = catalog.fence("F2").unwrap();
        assert_eq!(boundary.region_id, Some(RegionId::new("9")));
        assert!(boundary.window.unwrap().wraps_midnight());
        assert!(!boundary.enabled);
        assert_eq!(boundary.description.as_deref(), Some("night shift"));
        assert!(boundary.applies_to("anyone"));
    }

    #[test]
    fn test_bad_window_is_always_active() {
        let json = r#"{
            "id": "F", "shape": {"type": "circle", "center": [0, 0], "radius": 5},
            "behavior": "No Entry", "effectiveTime": "sometime"
        }"#;
        let fence: Fence = serde_json::from_str(json).unwrap();
        assert_eq!(fence.window, None);
        assert!(fence.is_active_at(NaiveTime::from_hms_opt(3, 0, 0).unwrap()));
    }

    #[test]
    fn test_disabled_fence_never_active() {
        let fence = Fence::circle("F", "F", p(0.0, 0.0), 10.0, Behavior::NoEntry).disabled();
        assert!(!fence.is_active_at(NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
    }

    #[test]
    fn test_malformed_shapes_contain_nothing() {
        let no_radius = FenceShape::Circle { center: p(0.0, 0.0), radius: None };
        assert!(!no_radius.contains(p(0.0, 0.0)));

        let negative = FenceShape::Circle { center: p(0.0, 0.0), radius: Some(-1.0) };
        assert!(!negative.contains(p(0.0, 0.0)));

        let nan = FenceShape::Circle { center: p(0.0, 0.0), radius: Some(f64::NAN) };
        assert!(!nan.contains(p(0.0, 0.0)));

        let line = FenceShape::Polygon { points: vec![p(0.0, 0.0), p(1.0, 1.0)] };
        assert!(!line.contains(p(0.5, 0.5)));
    }

    #[test]
    fn test_circle_without_radius_deserializes() {
        let json = r#"{"id": "C", "shape": {"type": "circle", "center": [1, 2]}, "behavior": "No Entry"}"#;
        let fence: Fence = serde_json::from_str(json).unwrap();
        assert!(!fence.contains(p(1.0, 2.0)));
    }

    #[test]
    fn test_scope_rules() {
        let region = Region::new("R", "Project", vec![p(0.0, 0.0), p(0.0, 10.0), p(10.0, 10.0), p(10.0, 0.0)]);
        let catalog = Catalog::new(vec![], vec![region]);

        let entry = Fence::circle("A", "A", p(0.0, 0.0), 1.0, Behavior::NoEntry);
        assert!(catalog.in_scope(&entry, p(50.0, 50.0)));

        let exit_unbound = Fence::circle("B", "B", p(0.0, 0.0), 1.0, Behavior::NoExit);
        assert!(!catalog.in_scope(&exit_unbound, p(5.0, 5.0)));

        let exit_bound = exit_unbound.clone().with_region("R");
        assert!(catalog.in_scope(&exit_bound, p(5.0, 5.0)));
        assert!(!catalog.in_scope(&exit_bound, p(50.0, 50.0)));

        let exit_dangling = exit_unbound.with_region("missing");
        assert!(!catalog.in_scope(&exit_dangling, p(5.0, 5.0)));
    }

    #[test]
    fn test_empty_catalog() {
        let catalog: Catalog = serde_json::from_str("{}").unwrap();
        assert!(catalog.is_empty());
        assert_eq!(catalog.region_count(), 0);
    }

    #[test]
    fn test_malformed_fence_only_drops_itself() {
        let json = r#"{
            "fences": [
                {"id": "GOOD", "shape": {"type": "circle", "center": [0, 0], "radius": 50}, "behavior": "No Entry"},
                {"id": "NO_CENTER", "shape": {"type": "circle", "radius": 50}, "behavior": "No Entry"},
                {"id": "BAD_POINT", "shape": {"type": "polygon", "points": [[0, 0], ["x", 1], [1, 1]]}, "behavior": "No Exit"},
                {"id": "BAD_RADIUS", "shape": {"type": "circle", "center": [0, 0], "radius": "big"}, "behavior": "No Entry"}
            ],
            "regions": [
                {"id": 1, "points": [[0, 0], [0, 1], [1, 1]]},
                {"id": 2, "points": "nowhere"}
            ]
        }"#;
        let catalog: Catalog = serde_json::from_str(json).unwrap();
        assert_eq!(catalog.fences().len(), 1);
        assert!(catalog.fence("GOOD").unwrap().contains(p(0.0, 0.0)));
        assert!(catalog.fence("NO_CENTER").is_none());
        assert_eq!(catalog.region_count(), 1);
        assert!(catalog.region("1").is_some());
    }

    #[test]
    fn test_is_active_integer_column() {
        let fence = |flag: &str| -> Fence {
            let json = format!(
                r#"{{"id": "F", "shape": {{"type": "circle", "center": [0, 0], "radius": 5}}, "behavior": "No Entry", "is_active": {flag}}}"#
            );
            serde_json::from_str(&json).unwrap()
        };
        assert!(!fence("0").enabled);
        assert!(fence("1").enabled);
        assert!(fence("true").enabled);
        assert!(!fence("false").enabled);
    }

    #[test]
    fn test_duplicate_fence_ids_keep_first() {
        let first = Fence::circle("F", "First", p(0.0, 0.0), 10.0, Behavior::NoEntry);
        let second = Fence::circle("F", "Second", p(5.0, 5.0), 10.0, Behavior::NoExit);
        let other = Fence::circle("G", "Other", p(1.0, 1.0), 10.0, Behavior::NoEntry);
        let catalog = Catalog::new(vec![first, second, other], vec![]);

        assert_eq!(catalog.fences().len(), 2);
        assert_eq!(catalog.fence("F").unwrap().name, "First");
        assert_eq!(catalog.fences()[1].id.as_str(), "G");
    }
}
