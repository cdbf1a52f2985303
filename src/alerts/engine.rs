//! Proximity alert engine with hysteresis.
//!
//! Every scan resolves one position, finds the nearest active camera within
//! the alert radius, and classifies the result against the previous scan:
//! entering the radius or switching cameras raises a full alert, closing
//! fast re-raises, small changes below the noise floor stay silent, leaving
//! the radius clears.

use crate::alerts::dataset::{self, SpeedCamera};
use crate::config::SpeedcamConfig;
use crate::geo;
use crate::gps::GpsFix;
use std::path::Path;
use std::time::{Duration, Instant};

/// Alert transition produced by a scan.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertEvent {
    /// Entered a camera's radius, switched to a different camera, or closed
    /// on the same camera fast enough to warrant a fresh alert
    Raised { camera: SpeedCamera, distance: f64 },
    /// Same camera, distance moved by more than the noise floor
    DistanceChanged { camera: SpeedCamera, distance: f64 },
    /// Left the camera's radius
    Cleared { camera: SpeedCamera },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlertStats {
    pub scans: u64,
    pub alerts_raised: u64,
    pub alerts_cleared: u64,
}

struct ActiveAlert {
    camera: SpeedCamera,
    distance: f64,
}

/// Scans positions against the camera dataset.
pub struct ProximityAlertEngine {
    config: SpeedcamConfig,
    cameras: Vec<SpeedCamera>,
    enabled: bool,
    active: Option<ActiveAlert>,
    last_scan: Option<Instant>,
    fallback: Option<(f64, f64, Instant)>,
    stats: AlertStats,
}

impl ProximityAlertEngine {
    /// Build the engine, loading the dataset from the configured path.
    ///
    /// A missing or malformed dataset disables the engine instead of
    /// failing startup.
    pub fn new(config: SpeedcamConfig) -> Self {
        let cameras = if config.dataset_path.is_empty() {
            log::warn!("No speed camera dataset configured, alerts disabled");
            Vec::new()
        } else {
            match dataset::load_cameras(Path::new(&config.dataset_path)) {
                Ok(cameras) => {
                    let active = cameras.iter().filter(|c| c.is_active()).count();
                    log::info!(
                        "Loaded {} speed cameras ({} active) from {}",
                        cameras.len(),
                        active,
                        config.dataset_path
                    );
                    cameras
                }
                Err(e) => {
                    log::warn!(
                        "Failed to load speed camera dataset {}: {}, alerts disabled",
                        config.dataset_path,
                        e
                    );
                    Vec::new()
                }
            }
        };

        Self::with_cameras(config, cameras)
    }

    /// Build the engine over an already-loaded camera list.
    pub fn with_cameras(config: SpeedcamConfig, cameras: Vec<SpeedCamera>) -> Self {
        let enabled = !cameras.is_empty();
        Self {
            config,
            cameras,
            enabled,
            active: None,
            last_scan: None,
            fallback: None,
            stats: AlertStats::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn stats(&self) -> AlertStats {
        self.stats
    }

    /// Camera currently being alerted on, if any.
    pub fn active_camera(&self) -> Option<&SpeedCamera> {
        self.active.as_ref().map(|a| &a.camera)
    }

    /// Record an externally-supplied position to scan against when the
    /// receiver has no fix. Expires after the configured maximum age.
    pub fn inject_position(&mut self, lat: f64, lon: f64) {
        self.fallback = Some((lat, lon, Instant::now()));
    }

    /// Run one scan against the given fix (or the injected fallback when
    /// the fix is absent or invalid). Returns at most one transition.
    pub fn scan(&mut self, fix: Option<&GpsFix>) -> Option<AlertEvent> {
        if !self.enabled {
            return None;
        }

        let interval = Duration::from_secs_f64(self.config.scan_interval_secs);
        if let Some(last) = self.last_scan {
            if last.elapsed() < interval {
                return None;
            }
        }

        let (lat, lon) = self.resolve_position(fix)?;
        self.last_scan = Some(Instant::now());
        self.stats.scans += 1;

        let nearest = self.nearest_camera(lat, lon);
        self.classify(nearest)
    }

    fn resolve_position(&self, fix: Option<&GpsFix>) -> Option<(f64, f64)> {
        if let Some(fix) = fix {
            if fix.is_valid {
                return Some((fix.latitude, fix.longitude));
            }
        }
        let (lat, lon, at) = self.fallback?;
        let max_age = Duration::from_secs_f64(self.config.fallback_max_age_secs);
        if at.elapsed() > max_age {
            return None;
        }
        Some((lat, lon))
    }

    /// Nearest active camera within the alert radius.
    fn nearest_camera(&self, lat: f64, lon: f64) -> Option<(SpeedCamera, f64)> {
        let mut nearest: Option<(&SpeedCamera, f64)> = None;
        for camera in self.cameras.iter().filter(|c| c.is_active()) {
            let distance = geo::haversine_distance(lat, lon, camera.lat, camera.lng);
            if distance > self.config.radius_m {
                continue;
            }
            if nearest.map_or(true, |(_, best)| distance < best) {
                nearest = Some((camera, distance));
            }
        }
        nearest.map(|(camera, distance)| (camera.clone(), distance))
    }

    fn classify(&mut self, nearest: Option<(SpeedCamera, f64)>) -> Option<AlertEvent> {
        match (nearest, self.active.take()) {
            (Some((camera, distance)), None) => Some(self.raise(camera, distance)),

            (Some((camera, distance)), Some(previous)) => {
                if camera.id != previous.camera.id {
                    return Some(self.raise(camera, distance));
                }

                let closing = previous.distance - distance;
                let delta = closing.abs();
                self.active = Some(ActiveAlert {
                    camera: camera.clone(),
                    distance,
                });

                if closing >= self.config.realert_closing_m {
                    log::info!(
                        "Closing fast on {} ({:.0}m, was {:.0}m)",
                        camera.location_label(),
                        distance,
                        previous.distance
                    );
                    self.stats.alerts_raised += 1;
                    Some(AlertEvent::Raised { camera, distance })
                } else if delta >= self.config.noise_floor_m {
                    Some(AlertEvent::DistanceChanged { camera, distance })
                } else {
                    None
                }
            }

            (None, Some(previous)) => {
                log::info!("Cleared alert for {}", previous.camera.location_label());
                self.stats.alerts_cleared += 1;
                Some(AlertEvent::Cleared {
                    camera: previous.camera,
                })
            }

            (None, None) => None,
        }
    }

    fn raise(&mut self, camera: SpeedCamera, distance: f64) -> AlertEvent {
        log::info!(
            "Speed camera ahead: {} at {:.0}m{}",
            camera.location_label(),
            distance,
            camera
                .vmax
                .map(|v| format!(" (limit {v} km/h)"))
                .unwrap_or_default()
        );
        self.stats.alerts_raised += 1;
        self.active = Some(ActiveAlert {
            camera: camera.clone(),
            distance,
        });
        AlertEvent::Raised { camera, distance }
    }
}
