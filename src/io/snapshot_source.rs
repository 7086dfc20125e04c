//! Catalog and device snapshot sources
//!
//! The engine does not own its inputs. In the service binary they are read
//! from JSON files that the surrounding application keeps up to date.

use crate::domain::catalog::Catalog;
use crate::domain::types::Device;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Supplies the fence catalog and the current device snapshot
pub trait SnapshotSource {
    fn load_catalog(&mut self) -> Result<Catalog>;
    fn load_devices(&mut self) -> Result<Vec<Device>>;
}

/// Reads `{ "fences": [...], "regions": [...] }` and `[{device}, ...]` files
pub struct FileSnapshotSource {
    catalog_path: PathBuf,
    devices_path: PathBuf,
}

impl FileSnapshotSource {
    pub fn new(catalog_path: impl Into<PathBuf>, devices_path: impl Into<PathBuf>) -> Self {
        Self { catalog_path: catalog_path.into(), devices_path: devices_path.into() }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {what} file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {what} file: {}", path.display()))
}

impl SnapshotSource for FileSnapshotSource {
    fn load_catalog(&mut self) -> Result<Catalog> {
        let catalog: Catalog = read_json(&self.catalog_path, "catalog")?;
        debug!(
            path = %self.catalog_path.display(),
            fences = %catalog.fences().len(),
            regions = %catalog.region_count(),
            "catalog_loaded"
        );
        Ok(catalog)
    }

    fn load_devices(&mut self) -> Result<Vec<Device>> {
        read_json(&self.devices_path, "devices")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_loads_catalog_and_devices() {
        let catalog = write_temp(
            r#"{"fences": [{"id": "F1", "name": "Pit",
                "shape": {"type": "circle", "center": {"lat": 0, "lng": 0}, "radius": 10},
                "behavior": "No Entry"}]}"#,
        );
        let devices = write_temp(
            r#"[{"id": "D1", "name": "Li", "lat": 0.0, "lng": 0.0},
                {"id": "D2", "lat": 1.0, "lng": 1.0, "online": false}]"#,
        );

        let mut source = FileSnapshotSource::new(catalog.path(), devices.path());
        let catalog = source.load_catalog().unwrap();
        assert_eq!(catalog.fences().len(), 1);

        let devices = source.load_devices().unwrap();
        assert_eq!(devices.len(), 2);
        assert!(!devices[1].online);
    }

    #[test]
    fn test_missing_file_is_error_with_path() {
        let mut source = FileSnapshotSource::new("/nonexistent/catalog.json", "/nonexistent/d.json");
        let err = source.load_catalog().unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/catalog.json"));
    }

    #[test]
    fn test_malformed_devices_is_error() {
        let devices = write_temp("[{\"id\": \"D1\"}]");
        let mut source = FileSnapshotSource::new("unused", devices.path());
        assert!(source.load_devices().is_err());
    }
}
