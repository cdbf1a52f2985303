//! Configuration for the marga-nav daemon
//!
//! Loads configuration from a TOML file, one section per component. Every
//! section has shippable defaults so the daemon can start without a file
//! during development.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub gps: GpsConfig,
    pub route: RouteConfig,
    pub directions: DirectionsConfig,
    pub speedcams: SpeedcamConfig,
    pub logging: LoggingConfig,
}

/// GPS receiver configuration (serial port + parser strictness)
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GpsConfig {
    /// Serial port of the NMEA receiver
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Serial read timeout in seconds
    pub read_timeout_secs: f64,
    /// Verify NMEA checksums and drop sentences that fail.
    ///
    /// Off by default: some receivers emit sentences with stale checksums
    /// after a firmware update, and the parser is fail-open anyway.
    pub verify_checksum: bool,
}

/// Route tracking thresholds
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RouteConfig {
    /// Minimum interval between step re-matches, in seconds
    pub step_update_interval_secs: f64,
    /// Deviation distance that flags the route as deviated (meters)
    pub deviation_warning_m: f64,
    /// Deviation distance that requests a recalculation (meters)
    pub deviation_recalculate_m: f64,
    /// Minimum interval between recalculation attempts, in seconds
    pub recalculate_cooldown_secs: f64,
}

/// Directions provider (outbound HTTP) configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DirectionsConfig {
    /// Master switch for automatic recalculation
    pub enabled: bool,
    /// Provider access token; empty disables recalculation
    pub access_token: String,
    /// Directions API base URL
    pub api_base_url: String,
    /// Routing profile (driving, walking, cycling)
    pub profile: String,
    /// Instruction language
    pub language: String,
    /// Request timeout in seconds
    pub timeout_secs: f64,
}

/// Speed camera alert configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SpeedcamConfig {
    /// Path to the camera dataset JSON file
    pub dataset_path: String,
    /// Alert radius in meters
    pub radius_m: f64,
    /// Minimum interval between scans, in seconds
    pub scan_interval_secs: f64,
    /// Closing distance that re-raises a full alert for the same camera (meters)
    pub realert_closing_m: f64,
    /// Distance change below which updates are treated as noise (meters)
    pub noise_floor_m: f64,
    /// Maximum age of an injected fallback position, in seconds
    pub fallback_max_age_secs: f64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for GpsConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyS0".to_string(),
            baud_rate: 9600,
            read_timeout_secs: 2.0,
            verify_checksum: false,
        }
    }
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            step_update_interval_secs: 5.0,
            deviation_warning_m: 50.0,
            deviation_recalculate_m: 100.0,
            recalculate_cooldown_secs: 30.0,
        }
    }
}

impl Default for DirectionsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            access_token: String::new(),
            api_base_url: "https://api.mapbox.com/directions/v5/mapbox".to_string(),
            profile: "driving".to_string(),
            language: "it".to_string(),
            timeout_secs: 10.0,
        }
    }
}

impl Default for SpeedcamConfig {
    fn default() -> Self {
        Self {
            dataset_path: "/etc/marga-nav/speedcams.json".to_string(),
            radius_m: 1000.0,
            scan_interval_secs: 5.0,
            realert_closing_m: 50.0,
            noise_floor_m: 10.0,
            fallback_max_age_secs: 15.0 * 60.0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gps: GpsConfig::default(),
            route: RouteConfig::default(),
            directions: DirectionsConfig::default(),
            speedcams: SpeedcamConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.gps.port, "/dev/ttyS0");
        assert_eq!(config.gps.baud_rate, 9600);
        assert!(!config.gps.verify_checksum);
        assert_eq!(config.route.deviation_warning_m, 50.0);
        assert_eq!(config.route.deviation_recalculate_m, 100.0);
        assert_eq!(config.route.recalculate_cooldown_secs, 30.0);
        assert_eq!(config.speedcams.radius_m, 1000.0);
        assert_eq!(config.speedcams.fallback_max_age_secs, 900.0);
    }

    #[test]
    fn test_toml_serialization() {
        let config = AppConfig::default();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        assert!(toml_string.contains("[gps]"));
        assert!(toml_string.contains("[route]"));
        assert!(toml_string.contains("[directions]"));
        assert!(toml_string.contains("[speedcams]"));
        assert!(toml_string.contains("[logging]"));
        assert!(toml_string.contains("baud_rate = 9600"));
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_content = r#"
[gps]
port = "/dev/ttyUSB0"
baud_rate = 115200
verify_checksum = true

[route]
deviation_warning_m = 75.0

[directions]
access_token = "pk.test"
language = "en"

[speedcams]
dataset_path = "/tmp/cams.json"
radius_m = 500.0
"#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.gps.port, "/dev/ttyUSB0");
        assert_eq!(config.gps.baud_rate, 115200);
        assert!(config.gps.verify_checksum);
        assert_eq!(config.route.deviation_warning_m, 75.0);
        // Unspecified fields keep their defaults
        assert_eq!(config.route.deviation_recalculate_m, 100.0);
        assert_eq!(config.directions.access_token, "pk.test");
        assert_eq!(config.directions.language, "en");
        assert_eq!(config.speedcams.radius_m, 500.0);
        assert_eq!(config.speedcams.scan_interval_secs, 5.0);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("marga-nav.toml");

        let mut config = AppConfig::default();
        config.gps.port = "/dev/ttyAMA0".to_string();
        config.to_file(&path).unwrap();

        let loaded = AppConfig::from_file(&path).unwrap();
        assert_eq!(loaded.gps.port, "/dev/ttyAMA0");
        assert_eq!(loaded.route.step_update_interval_secs, 5.0);
    }
}
