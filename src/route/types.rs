//! Route, step, and deviation types, plus the wire-format route message
//! received from the upstream navigation-data channel.

use crate::geo;
use serde::Deserialize;

/// A geographic point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle distance to another point, meters.
    pub fn distance_to(&self, other: GeoPoint) -> f64 {
        geo::haversine_distance(self.lat, self.lon, other.lat, other.lon)
    }
}

/// Maneuver descriptor attached to a step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Maneuver {
    /// Maneuver type (turn, merge, arrive, ...)
    pub kind: String,
    /// Modifier (left, right, slight left, ...)
    pub modifier: String,
    /// Heading after the maneuver, degrees
    pub bearing: Option<f64>,
}

/// Coordinate anchors of a step.
///
/// A step is matchable when at least one anchor resolves. Resolution order
/// is fixed: matching prefers the start, arrival prefers the end.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepAnchors {
    pub start: Option<GeoPoint>,
    pub end: Option<GeoPoint>,
    /// Short geometry sample approximating the step
    pub geometry: Vec<GeoPoint>,
}

impl StepAnchors {
    /// Anchor used for nearest-step matching: start, then end, then the
    /// first geometry point.
    pub fn matching_anchor(&self) -> Option<GeoPoint> {
        self.start
            .or(self.end)
            .or_else(|| self.geometry.first().copied())
    }

    /// Anchor used for remaining-distance: end, then the last geometry
    /// point, then start.
    pub fn arrival_anchor(&self) -> Option<GeoPoint> {
        self.end
            .or_else(|| self.geometry.last().copied())
            .or(self.start)
    }
}

/// One navigation step of a route.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteStep {
    pub index: usize,
    pub instruction: String,
    /// Step length, meters
    pub distance: f64,
    /// Step duration, seconds
    pub duration: u32,
    pub maneuver: Maneuver,
    pub anchors: StepAnchors,
}

/// An active route: ordered steps plus the dense polyline they approximate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Route {
    pub destination: Option<GeoPoint>,
    pub destination_label: Option<String>,
    pub steps: Vec<RouteStep>,
    /// Dense polyline of the driven path, traversal order
    pub polyline: Vec<GeoPoint>,
    /// Total route length, meters
    pub total_distance: f64,
    /// Total route duration, seconds
    pub total_duration: f64,
    /// True when this route came from an automatic recalculation
    pub recalculated: bool,
}

/// Deviation-from-route measurement, recomputed on every position update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Deviation {
    /// Minimum distance from the fix to the route polyline, meters
    pub distance: f64,
    pub warning_threshold: f64,
    pub recalculate_threshold: f64,
    pub is_deviated: bool,
}

/// Outcome of a single `update_position` call.
#[derive(Debug, Clone, Default)]
pub struct PositionUpdate {
    /// True when the current step index changed in this call
    pub step_changed: bool,
    pub current_step: Option<RouteStep>,
    /// Distance from the fix to the current step's arrival anchor, meters
    pub remaining_distance: Option<f64>,
    pub deviation: Option<Deviation>,
    /// Advisory: deviation exceeded the recalculation threshold
    pub recalculation_needed: bool,
}

// ---------------------------------------------------------------------------
// Wire format: route messages from the upstream navigation-data channel.
// Coordinates on the wire are [lat, lng] pairs; step anchors are lat/lng
// objects that may be null.
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RouteMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub destination: Option<String>,
    #[serde(rename = "destCoords")]
    pub dest_coords: Option<WireLatLng>,
    #[serde(rename = "routeGeometry", default)]
    pub route_geometry: Vec<[f64; 2]>,
    #[serde(default)]
    pub steps: Vec<WireStep>,
    #[serde(rename = "totalDistance", default)]
    pub total_distance: f64,
    #[serde(rename = "totalDuration", default)]
    pub total_duration: f64,
}

#[derive(Debug, Deserialize)]
pub struct WireLatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Deserialize)]
pub struct WireStep {
    #[serde(default)]
    pub instruction: String,
    #[serde(default)]
    pub distance: f64,
    #[serde(default)]
    pub duration: u32,
    #[serde(default)]
    pub maneuver: WireManeuver,
    #[serde(default)]
    pub coordinates: WireStepCoordinates,
}

#[derive(Debug, Default, Deserialize)]
pub struct WireManeuver {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub modifier: String,
    #[serde(default)]
    pub bearing: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WireStepCoordinates {
    #[serde(default)]
    pub start: Option<WireLatLng>,
    #[serde(default)]
    pub end: Option<WireLatLng>,
    #[serde(default)]
    pub geometry: Vec<[f64; 2]>,
}

impl From<&WireLatLng> for GeoPoint {
    fn from(w: &WireLatLng) -> Self {
        GeoPoint::new(w.lat, w.lng)
    }
}

impl RouteMessage {
    /// Parse a wire-format route message from JSON.
    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// Convert into the internal route model.
    ///
    /// Returns `None` for messages that are not route payloads.
    pub fn into_route(self) -> Option<Route> {
        if self.kind != "route" {
            return None;
        }

        let steps = self
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| RouteStep {
                index,
                instruction: step.instruction.clone(),
                distance: step.distance,
                duration: step.duration,
                maneuver: Maneuver {
                    kind: step.maneuver.kind.clone(),
                    modifier: step.maneuver.modifier.clone(),
                    bearing: step.maneuver.bearing,
                },
                anchors: StepAnchors {
                    start: step.coordinates.start.as_ref().map(GeoPoint::from),
                    end: step.coordinates.end.as_ref().map(GeoPoint::from),
                    geometry: step
                        .coordinates
                        .geometry
                        .iter()
                        .map(|p| GeoPoint::new(p[0], p[1]))
                        .collect(),
                },
            })
            .collect();

        Some(Route {
            destination: self.dest_coords.as_ref().map(GeoPoint::from),
            destination_label: self.destination,
            steps,
            polyline: self
                .route_geometry
                .iter()
                .map(|p| GeoPoint::new(p[0], p[1]))
                .collect(),
            total_distance: self.total_distance,
            total_duration: self.total_duration,
            recalculated: false,
        })
    }
}
