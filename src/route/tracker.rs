//! Route tracker: current-step matching, deviation detection, and the
//! guarded re-routing protocol.
//!
//! The tracker holds no threads. `update_position` is called synchronously
//! by the orchestrator with the latest fix; the directions request itself is
//! expected to run off the update path (see `begin_recalculation` /
//! `complete_recalculation`), with the single-flight and cooldown guards
//! living here as the concurrency contract.

use crate::config::RouteConfig;
use crate::geo;
use crate::gps::GpsFix;
use crate::route::directions::{DirectionsClient, DirectionsError};
use crate::route::types::{Deviation, GeoPoint, PositionUpdate, Route, RouteStep};
use std::time::{Duration, Instant};

/// Direction-mismatch penalty applied when the fix course and the step
/// bearing disagree by more than 90 degrees.
const BEARING_PENALTY: f64 = 1.5;
const BEARING_MISMATCH_DEG: f64 = 90.0;

/// Tracker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    /// No active route
    Idle,
    /// Route set, position on path
    Tracking,
    /// Deviation above the warning threshold
    Deviated,
    /// Directions request in flight
    Recalculating,
}

/// Why a recalculation attempt was skipped or failed.
#[derive(Debug, thiserror::Error)]
pub enum RecalcError {
    /// Provider disabled (config switch or missing credentials)
    #[error("recalculation disabled")]
    Disabled,

    /// Another request is already in flight
    #[error("recalculation already in progress")]
    InFlight,

    /// Cooldown since the last attempt has not elapsed
    #[error("recalculation in cooldown ({remaining_secs:.1}s remaining)")]
    Cooldown { remaining_secs: f64 },

    /// No stored destination to route towards
    #[error("no destination available for recalculation")]
    NoDestination,

    /// Current fix is not valid
    #[error("no valid position for recalculation")]
    NoFix,

    /// The provider request itself failed
    #[error(transparent)]
    Provider(#[from] DirectionsError),
}

/// Tracker statistics, for diagnostics only.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackerStats {
    pub step_updates: u64,
    pub deviation_checks: u64,
    pub warnings: u64,
    pub recalculate_requests: u64,
    pub recalculate_success: u64,
    pub recalculate_failed: u64,
}

/// Owns the active route and matches incoming fixes against it.
pub struct RouteTracker {
    config: RouteConfig,
    route: Option<Route>,
    current_step_index: Option<usize>,
    last_step_match: Option<Instant>,
    deviation: Option<Deviation>,
    state: TrackerState,
    recalculating: bool,
    last_recalculate: Option<Instant>,
    stats: TrackerStats,
}

impl RouteTracker {
    pub fn new(config: RouteConfig) -> Self {
        Self {
            config,
            route: None,
            current_step_index: None,
            last_step_match: None,
            deviation: None,
            state: TrackerState::Idle,
            recalculating: false,
            last_recalculate: None,
            stats: TrackerStats::default(),
        }
    }

    /// Replace the active route atomically.
    ///
    /// Resets the current step to "none" and clears deviation state.
    pub fn set_route(&mut self, route: Route) {
        let matchable = route
            .steps
            .iter()
            .filter(|s| s.anchors.matching_anchor().is_some())
            .count();
        log::info!(
            "Route set: {} steps ({} matchable), {} polyline points{}",
            route.steps.len(),
            matchable,
            route.polyline.len(),
            if route.recalculated {
                " [recalculated]"
            } else {
                ""
            }
        );
        if route.destination.is_none() {
            log::warn!("Route has no destination coordinates, recalculation unavailable");
        }

        self.route = Some(route);
        self.current_step_index = None;
        self.last_step_match = None;
        self.deviation = None;
        self.state = TrackerState::Tracking;
    }

    /// Drop the active route.
    pub fn clear_route(&mut self) {
        self.route = None;
        self.current_step_index = None;
        self.last_step_match = None;
        self.deviation = None;
        self.state = TrackerState::Idle;
        log::info!("Route cleared");
    }

    pub fn has_route(&self) -> bool {
        self.route.is_some()
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn current_step(&self) -> Option<&RouteStep> {
        let index = self.current_step_index?;
        self.route.as_ref()?.steps.get(index)
    }

    pub fn deviation(&self) -> Option<Deviation> {
        self.deviation
    }

    pub fn stats(&self) -> TrackerStats {
        self.stats
    }

    /// Process a position fix: match the current step, compute remaining
    /// distance and deviation. All three are computed from this one fix.
    pub fn update_position(&mut self, fix: &GpsFix) -> PositionUpdate {
        let mut result = PositionUpdate::default();

        if self.route.is_none() || !fix.is_valid {
            return result;
        }

        let old_index = self.current_step_index;
        self.match_step(fix);

        if let Some(step) = self.current_step() {
            result.step_changed = old_index != self.current_step_index;
            result.current_step = Some(step.clone());
            result.remaining_distance = self.remaining_distance(fix);
        }

        if let Some(deviation) = self.check_deviation(fix) {
            if deviation.distance > deviation.recalculate_threshold {
                result.recalculation_needed = true;
            }
            result.deviation = Some(deviation);
        }

        result
    }

    /// Nearest-step matching, throttled to the configured interval unless no
    /// step is selected yet.
    fn match_step(&mut self, fix: &GpsFix) {
        let interval = Duration::from_secs_f64(self.config.step_update_interval_secs);
        if self.current_step_index.is_some() {
            if let Some(last) = self.last_step_match {
                if last.elapsed() < interval {
                    return;
                }
            }
        }

        let Some(route) = self.route.as_ref() else {
            return;
        };
        self.last_step_match = Some(Instant::now());

        let mut closest: Option<(usize, f64)> = None;
        for step in &route.steps {
            let Some(anchor) = step.anchors.matching_anchor() else {
                continue;
            };
            if anchor.lat == 0.0 || anchor.lon == 0.0 {
                continue;
            }

            let mut distance =
                geo::haversine_distance(fix.latitude, fix.longitude, anchor.lat, anchor.lon);

            // Prefer steps aligned with the direction of travel. A course of
            // exactly 0.0 means "not moving / unknown" and carries no signal.
            if fix.course != 0.0 {
                if let Some(bearing) = step.maneuver.bearing {
                    let mut diff = (fix.course - bearing).abs();
                    if diff > 180.0 {
                        diff = 360.0 - diff;
                    }
                    if diff > BEARING_MISMATCH_DEG {
                        distance *= BEARING_PENALTY;
                    }
                }
            }

            // Strict < keeps the lowest index on ties.
            if closest.map_or(true, |(_, best)| distance < best) {
                closest = Some((step.index, distance));
            }
        }

        match closest {
            Some((index, distance)) => {
                if Some(index) != self.current_step_index {
                    self.current_step_index = Some(index);
                    self.stats.step_updates += 1;
                    let step = &route.steps[index];
                    log::info!(
                        "Current step: {}/{} - {} ({:.0}m away)",
                        index + 1,
                        route.steps.len(),
                        truncate(&step.instruction, 50),
                        distance
                    );
                }
            }
            None => {
                log::warn!("No matchable step found on active route");
            }
        }
    }

    /// Distance from the fix to the arrival anchor of the current step.
    fn remaining_distance(&self, fix: &GpsFix) -> Option<f64> {
        let anchor = self.current_step()?.anchors.arrival_anchor()?;
        if anchor.lat == 0.0 || anchor.lon == 0.0 {
            return None;
        }
        Some(geo::haversine_distance(
            fix.latitude,
            fix.longitude,
            anchor.lat,
            anchor.lon,
        ))
    }

    /// Minimum distance from the fix to the route polyline, meters.
    ///
    /// Returns 0.0 when the polyline has fewer than two points.
    pub fn route_distance(&mut self, fix: &GpsFix) -> f64 {
        let Some(route) = self.route.as_ref() else {
            return 0.0;
        };
        if route.polyline.len() < 2 || !fix.is_valid {
            return 0.0;
        }

        let point = (fix.latitude, fix.longitude);
        let mut min_distance = f64::INFINITY;
        for pair in route.polyline.windows(2) {
            let d = geo::point_to_segment_distance(
                point,
                (pair[0].lat, pair[0].lon),
                (pair[1].lat, pair[1].lon),
            );
            if d < min_distance {
                min_distance = d;
            }
        }

        self.stats.deviation_checks += 1;
        min_distance
    }

    /// Evaluate deviation against the thresholds in force.
    fn check_deviation(&mut self, fix: &GpsFix) -> Option<Deviation> {
        let distance = self.route_distance(fix);
        if distance == 0.0 {
            return None;
        }

        let deviation = Deviation {
            distance,
            warning_threshold: self.config.deviation_warning_m,
            recalculate_threshold: self.config.deviation_recalculate_m,
            is_deviated: distance > self.config.deviation_warning_m,
        };

        let was_deviated = self.deviation.map(|d| d.is_deviated).unwrap_or(false);
        self.deviation = Some(deviation);

        if deviation.is_deviated {
            if !was_deviated {
                log::warn!("Route deviation detected: {:.0}m off path", distance);
                self.stats.warnings += 1;
            }
            if self.state == TrackerState::Tracking {
                self.state = TrackerState::Deviated;
            }
        } else if was_deviated {
            log::info!("Deviation resolved, back to {:.0}m off path", distance);
            if self.state == TrackerState::Deviated {
                self.state = TrackerState::Tracking;
            }
        }

        Some(deviation)
    }

    /// Check the recalculation guards and, on pass, enter the Recalculating
    /// state. Returns the (origin, destination) pair the caller should hand
    /// to the directions client on a worker thread.
    ///
    /// Every `Err` here means "skipped, no attempt made".
    pub fn begin_recalculation(
        &mut self,
        fix: &GpsFix,
        client: &DirectionsClient,
    ) -> Result<(GeoPoint, GeoPoint), RecalcError> {
        if !client.is_enabled() {
            return Err(RecalcError::Disabled);
        }
        if self.recalculating {
            return Err(RecalcError::InFlight);
        }

        let cooldown = Duration::from_secs_f64(self.config.recalculate_cooldown_secs);
        if let Some(last) = self.last_recalculate {
            let elapsed = last.elapsed();
            if elapsed < cooldown {
                return Err(RecalcError::Cooldown {
                    remaining_secs: (cooldown - elapsed).as_secs_f64(),
                });
            }
        }

        let destination = self
            .route
            .as_ref()
            .and_then(|r| r.destination)
            .ok_or(RecalcError::NoDestination)?;

        if !fix.is_valid {
            return Err(RecalcError::NoFix);
        }

        self.recalculating = true;
        self.last_recalculate = Some(Instant::now());
        self.state = TrackerState::Recalculating;
        self.stats.recalculate_requests += 1;

        let origin = GeoPoint::new(fix.latitude, fix.longitude);
        log::info!(
            "Recalculating route from {:.6},{:.6} to {:.6},{:.6}",
            origin.lat,
            origin.lon,
            destination.lat,
            destination.lon
        );
        Ok((origin, destination))
    }

    /// Deliver the outcome of a recalculation attempt.
    ///
    /// Success installs the new route; failure increments the failure
    /// counter exactly once and leaves the existing route, current step, and
    /// deviation state untouched.
    pub fn complete_recalculation(
        &mut self,
        result: Result<Route, DirectionsError>,
    ) -> Result<Route, RecalcError> {
        self.recalculating = false;

        match result {
            Ok(mut route) => {
                // Carry the label forward, the provider response has none.
                if route.destination_label.is_none() {
                    route.destination_label = self
                        .route
                        .as_ref()
                        .and_then(|r| r.destination_label.clone());
                }
                log::info!(
                    "Route recalculated: {} steps, {:.0}m, {:.0}s",
                    route.steps.len(),
                    route.total_distance,
                    route.total_duration
                );
                self.stats.recalculate_success += 1;
                self.set_route(route.clone());
                Ok(route)
            }
            Err(e) => {
                log::error!("Route recalculation failed: {}", e);
                self.stats.recalculate_failed += 1;
                let deviated = self.deviation.map(|d| d.is_deviated).unwrap_or(false);
                self.state = if deviated {
                    TrackerState::Deviated
                } else {
                    TrackerState::Tracking
                };
                Err(RecalcError::Provider(e))
            }
        }
    }

    /// Blocking recalculation: guards, provider request, route install.
    ///
    /// Stalls the caller for up to the provider timeout; never call this
    /// from the decoder thread.
    pub fn recalculate_route(
        &mut self,
        fix: &GpsFix,
        client: &DirectionsClient,
    ) -> Result<Route, RecalcError> {
        let (origin, destination) = self.begin_recalculation(fix, client)?;
        let result = client.fetch_route(origin, destination);
        self.complete_recalculation(result)
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DirectionsConfig;
    use crate::route::types::{Maneuver, StepAnchors};

    fn fix_at(lat: f64, lon: f64) -> GpsFix {
        GpsFix {
            latitude: lat,
            longitude: lon,
            fix_quality: 1,
            is_valid: true,
            ..GpsFix::default()
        }
    }

    fn step_at(index: usize, lat: f64, lon: f64) -> RouteStep {
        RouteStep {
            index,
            instruction: format!("step {index}"),
            distance: 100.0,
            duration: 30,
            maneuver: Maneuver::default(),
            anchors: StepAnchors {
                start: Some(GeoPoint::new(lat, lon)),
                end: Some(GeoPoint::new(lat + 0.001, lon)),
                geometry: vec![],
            },
        }
    }

    /// Straight north-south route along lon 9.0 with steps every ~1.1 km.
    fn test_route() -> Route {
        Route {
            destination: Some(GeoPoint::new(45.04, 9.0)),
            destination_label: Some("Test".to_string()),
            steps: (0..5).map(|i| step_at(i, 45.0 + 0.01 * i as f64, 9.0)).collect(),
            polyline: (0..=40)
                .map(|i| GeoPoint::new(45.0 + 0.001 * i as f64, 9.0))
                .collect(),
            total_distance: 4400.0,
            total_duration: 300.0,
            recalculated: false,
        }
    }

    fn tracker() -> RouteTracker {
        let mut t = RouteTracker::new(RouteConfig::default());
        t.set_route(test_route());
        t
    }

    fn enabled_client() -> DirectionsClient {
        let config = DirectionsConfig {
            access_token: "pk.test".to_string(),
            ..DirectionsConfig::default()
        };
        DirectionsClient::new(config).unwrap()
    }

    #[test]
    fn test_selects_nearest_step() {
        let mut t = tracker();
        // Right next to step index 2 (45.02).
        let result = t.update_position(&fix_at(45.0201, 9.0001));
        assert!(result.step_changed);
        assert_eq!(result.current_step.unwrap().index, 2);
    }

    #[test]
    fn test_selection_idempotent_within_throttle_window() {
        let mut t = tracker();
        let fix = fix_at(45.0201, 9.0001);
        for i in 0..5 {
            let result = t.update_position(&fix);
            assert_eq!(result.current_step.as_ref().unwrap().index, 2, "call {i}");
            assert_eq!(result.step_changed, i == 0);
        }
    }

    #[test]
    fn test_invalid_fix_is_ignored() {
        let mut t = tracker();
        let mut fix = fix_at(45.02, 9.0);
        fix.is_valid = false;
        let result = t.update_position(&fix);
        assert!(result.current_step.is_none());
        assert!(result.deviation.is_none());
    }

    #[test]
    fn test_steps_without_anchors_are_skipped() {
        let mut t = RouteTracker::new(RouteConfig::default());
        let mut route = test_route();
        route.steps[0].anchors = StepAnchors::default();
        t.set_route(route);

        // Closest to step 0's old position, but step 0 is unmatchable now.
        let result = t.update_position(&fix_at(45.0001, 9.0));
        assert_eq!(result.current_step.unwrap().index, 1);
    }

    #[test]
    fn test_bearing_penalty_prefers_aligned_step() {
        let mut t = RouteTracker::new(RouteConfig::default());
        let mut route = test_route();
        // Two steps nearly equidistant; the closer one points the wrong way.
        route.steps = vec![
            RouteStep {
                maneuver: Maneuver {
                    bearing: Some(180.0),
                    ..Maneuver::default()
                },
                ..step_at(0, 45.0100, 9.0)
            },
            RouteStep {
                maneuver: Maneuver {
                    bearing: Some(10.0),
                    ..Maneuver::default()
                },
                ..step_at(1, 45.0112, 9.0)
            },
        ];
        t.set_route(route);

        let mut fix = fix_at(45.0105, 9.0);
        fix.course = 5.0; // heading north
        let result = t.update_position(&fix);
        // Without the penalty step 0 wins (~55m vs ~78m); with the x1.5
        // penalty on the southbound step, step 1 wins.
        assert_eq!(result.current_step.unwrap().index, 1);
    }

    #[test]
    fn test_remaining_distance_uses_end_anchor() {
        let mut t = tracker();
        let result = t.update_position(&fix_at(45.0201, 9.0));
        let remaining = result.remaining_distance.unwrap();
        // End anchor of step 2 is at 45.021; fix at 45.0201 -> ~100m.
        assert!((remaining - 100.0).abs() < 20.0, "got {remaining}");
    }

    #[test]
    fn test_no_deviation_on_path() {
        let mut t = tracker();
        let result = t.update_position(&fix_at(45.0201, 9.0001));
        let deviation = result.deviation.unwrap();
        assert!(deviation.distance < 50.0);
        assert!(!deviation.is_deviated);
        assert!(!result.recalculation_needed);
        assert_eq!(t.state(), TrackerState::Tracking);
    }

    #[test]
    fn test_warning_deviation() {
        let mut t = tracker();
        // ~75m east of the polyline at lat 45.02.
        let result = t.update_position(&fix_at(45.0201, 9.00095));
        let deviation = result.deviation.unwrap();
        assert!(
            deviation.distance > 50.0 && deviation.distance < 100.0,
            "distance {}",
            deviation.distance
        );
        assert!(deviation.is_deviated);
        assert!(!result.recalculation_needed);
        assert_eq!(t.state(), TrackerState::Deviated);
    }

    #[test]
    fn test_recalculation_needed_above_threshold() {
        let mut t = tracker();
        // ~160m east of the polyline.
        let result = t.update_position(&fix_at(45.0201, 9.002));
        let deviation = result.deviation.unwrap();
        assert!(deviation.distance > 100.0, "distance {}", deviation.distance);
        assert!(result.recalculation_needed);
    }

    #[test]
    fn test_deviation_resolves() {
        let mut t = tracker();
        t.update_position(&fix_at(45.0201, 9.00095));
        assert_eq!(t.state(), TrackerState::Deviated);
        t.update_position(&fix_at(45.0202, 9.0001));
        assert_eq!(t.state(), TrackerState::Tracking);
    }

    #[test]
    fn test_recalculation_cooldown_skips_second_attempt() {
        let mut t = tracker();
        let client = enabled_client();
        let fix = fix_at(45.0201, 9.002);

        let first = t.begin_recalculation(&fix, &client);
        assert!(first.is_ok());
        assert_eq!(t.state(), TrackerState::Recalculating);

        // Simulate the in-flight request failing, then retry immediately.
        let _ = t.complete_recalculation(Err(DirectionsError::EmptyResponse));
        let second = t.begin_recalculation(&fix, &client);
        assert!(matches!(second, Err(RecalcError::Cooldown { .. })));
        assert_eq!(t.stats().recalculate_requests, 1);
    }

    #[test]
    fn test_single_flight_guard() {
        let mut t = tracker();
        let client = enabled_client();
        let fix = fix_at(45.0201, 9.002);

        t.begin_recalculation(&fix, &client).unwrap();
        assert!(matches!(
            t.begin_recalculation(&fix, &client),
            Err(RecalcError::InFlight)
        ));
    }

    #[test]
    fn test_failed_recalculation_keeps_route_and_counts_once() {
        let mut t = tracker();
        let client = enabled_client();
        let fix = fix_at(45.0201, 9.002);

        t.update_position(&fix);
        let step_before = t.current_step().cloned();
        let deviation_before = t.deviation();

        t.begin_recalculation(&fix, &client).unwrap();
        let outcome = t.complete_recalculation(Err(DirectionsError::EmptyResponse));
        assert!(matches!(outcome, Err(RecalcError::Provider(_))));

        assert!(t.has_route());
        assert_eq!(t.current_step().cloned(), step_before);
        assert_eq!(t.deviation(), deviation_before);
        assert_eq!(t.stats().recalculate_failed, 1);
        assert_eq!(t.state(), TrackerState::Deviated);
    }

    #[test]
    fn test_successful_recalculation_replaces_route() {
        let mut t = tracker();
        let client = enabled_client();
        let fix = fix_at(45.0201, 9.002);
        t.update_position(&fix);

        t.begin_recalculation(&fix, &client).unwrap();
        let mut new_route = test_route();
        new_route.recalculated = true;
        new_route.destination_label = None;
        let installed = t.complete_recalculation(Ok(new_route)).unwrap();

        assert!(installed.recalculated);
        // Label carried over from the old route.
        assert_eq!(installed.destination_label.as_deref(), Some("Test"));
        assert_eq!(t.state(), TrackerState::Tracking);
        assert!(t.current_step().is_none(), "step index reset on new route");
        assert_eq!(t.stats().recalculate_success, 1);
    }

    #[test]
    fn test_recalculation_without_destination_skipped() {
        let mut t = RouteTracker::new(RouteConfig::default());
        let mut route = test_route();
        route.destination = None;
        t.set_route(route);

        let client = enabled_client();
        assert!(matches!(
            t.begin_recalculation(&fix_at(45.0, 9.0), &client),
            Err(RecalcError::NoDestination)
        ));
    }

    #[test]
    fn test_recalculation_disabled_without_token() {
        let mut t = tracker();
        let client = DirectionsClient::new(DirectionsConfig::default()).unwrap();
        assert!(matches!(
            t.begin_recalculation(&fix_at(45.0, 9.0), &client),
            Err(RecalcError::Disabled)
        ));
    }

    #[test]
    fn test_clear_route() {
        let mut t = tracker();
        t.update_position(&fix_at(45.0201, 9.0001));
        t.clear_route();
        assert!(!t.has_route());
        assert_eq!(t.state(), TrackerState::Idle);
        let result = t.update_position(&fix_at(45.0201, 9.0001));
        assert!(result.current_step.is_none());
    }
}
