//! Speed-camera dataset loading.
//!
//! The dataset is a JSON document with a top-level `result` array of camera
//! records. Only the coordinates, id, and status fields are required; the
//! rest is descriptive.

use crate::error::Result;
use serde::Deserialize;
use std::path::Path;

/// One camera record from the dataset.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SpeedCamera {
    pub id: i64,
    pub lat: f64,
    pub lng: f64,
    /// Camera category (fixed, average-speed section, ...)
    #[serde(rename = "type", default)]
    pub category: String,
    /// Enforced speed limit, km/h, when known
    #[serde(default)]
    pub vmax: Option<u32>,
    /// 1 = active; anything else is ignored by the engine
    #[serde(default = "default_status")]
    pub status: i64,
    #[serde(default)]
    pub road: Option<String>,
    #[serde(default)]
    pub municipality: Option<String>,
}

fn default_status() -> i64 {
    1
}

impl SpeedCamera {
    pub fn is_active(&self) -> bool {
        self.status == 1
    }

    /// Human-readable location, for log lines.
    pub fn location_label(&self) -> String {
        match (self.road.as_deref(), self.municipality.as_deref()) {
            (Some(road), Some(town)) => format!("{road}, {town}"),
            (Some(road), None) => road.to_string(),
            (None, Some(town)) => town.to_string(),
            (None, None) => format!("camera {}", self.id),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Dataset {
    #[serde(default)]
    result: Vec<SpeedCamera>,
}

/// Load the camera dataset from `path`.
pub fn load_cameras(path: &Path) -> Result<Vec<SpeedCamera>> {
    let raw = std::fs::read_to_string(path)?;
    let dataset: Dataset = serde_json::from_str(&raw)?;
    Ok(dataset.result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "result": [
            {"id": 101, "lat": 45.47, "lng": 9.18, "type": "fixed",
             "vmax": 50, "status": 1, "road": "Via Roma", "municipality": "Milano"},
            {"id": 102, "lat": 45.48, "lng": 9.20, "type": "section",
             "status": 0},
            {"id": 103, "lat": 45.49, "lng": 9.21}
        ]
    }"#;

    #[test]
    fn test_load_dataset() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let cameras = load_cameras(file.path()).unwrap();
        assert_eq!(cameras.len(), 3);

        assert_eq!(cameras[0].id, 101);
        assert_eq!(cameras[0].vmax, Some(50));
        assert!(cameras[0].is_active());
        assert_eq!(cameras[0].location_label(), "Via Roma, Milano");

        assert!(!cameras[1].is_active());
        assert_eq!(cameras[1].vmax, None);

        // Status defaults to active, category to empty.
        assert!(cameras[2].is_active());
        assert_eq!(cameras[2].category, "");
        assert_eq!(cameras[2].location_label(), "camera 103");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(load_cameras(Path::new("/nonexistent/cameras.json")).is_err());
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{\"result\": [{]").unwrap();
        assert!(load_cameras(file.path()).is_err());
    }

    #[test]
    fn test_empty_result_is_ok() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{\"result\": []}").unwrap();
        assert!(load_cameras(file.path()).unwrap().is_empty());
    }
}
