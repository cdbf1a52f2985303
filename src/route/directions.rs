//! Directions provider client (Mapbox Directions v5 wire contract).
//!
//! Used only by route recalculation. All failures are non-fatal to the
//! caller: the tracker counts them and keeps the existing route.

use crate::config::DirectionsConfig;
use crate::error::Result;
use crate::route::types::{GeoPoint, Maneuver, Route, RouteStep, StepAnchors};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;

/// Errors from a directions request. None of these are fatal.
#[derive(Debug, thiserror::Error)]
pub enum DirectionsError {
    /// Recalculation disabled (config switch off or no access token)
    #[error("directions provider disabled")]
    Disabled,

    /// Transport failure, including timeouts and body decode errors
    #[error("directions request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response
    #[error("directions provider returned HTTP {0}")]
    Status(u16),

    /// Response decoded but contained no usable route
    #[error("directions response contained no route")]
    EmptyResponse,
}

/// HTTP client for the external directions provider.
pub struct DirectionsClient {
    client: Client,
    config: DirectionsConfig,
    enabled: bool,
}

impl DirectionsClient {
    pub fn new(config: DirectionsConfig) -> Result<Self> {
        let enabled = config.enabled && !config.access_token.trim().is_empty();
        if config.enabled && !enabled {
            log::warn!(
                "Directions provider enabled but no access token configured, \
                 automatic recalculation unavailable"
            );
        }

        let client = Client::builder()
            .timeout(Duration::from_secs_f64(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            config,
            enabled,
        })
    }

    /// True when requests can actually be issued.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Request a driving route from `origin` to `destination`.
    ///
    /// Blocks for up to the configured timeout.
    pub fn fetch_route(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> std::result::Result<Route, DirectionsError> {
        if !self.enabled {
            return Err(DirectionsError::Disabled);
        }

        // Provider coordinate order is lon,lat.
        let url = format!(
            "{}/{}/{},{};{},{}",
            self.config.api_base_url,
            self.config.profile,
            origin.lon,
            origin.lat,
            destination.lon,
            destination.lat
        );

        log::info!(
            "Requesting route: {:.6},{:.6} -> {:.6},{:.6}",
            origin.lat,
            origin.lon,
            destination.lat,
            destination.lon
        );

        let response = self
            .client
            .get(&url)
            .query(&[
                ("access_token", self.config.access_token.as_str()),
                ("geometries", "geojson"),
                ("overview", "full"),
                ("steps", "true"),
                ("language", self.config.language.as_str()),
                ("annotations", "duration,distance"),
            ])
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(DirectionsError::Status(status.as_u16()));
        }

        let body: DirectionsResponse = response.json()?;
        build_route(body, destination)
    }
}

// ---------------------------------------------------------------------------
// Provider response model. Coordinates are [lon, lat] pairs throughout.
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct DirectionsResponse {
    #[serde(default)]
    pub routes: Vec<ProviderRoute>,
}

#[derive(Debug, Deserialize)]
pub struct ProviderRoute {
    #[serde(default)]
    pub distance: f64,
    #[serde(default)]
    pub duration: f64,
    pub geometry: Option<ProviderGeometry>,
    #[serde(default)]
    pub legs: Vec<ProviderLeg>,
}

#[derive(Debug, Deserialize)]
pub struct ProviderGeometry {
    #[serde(default)]
    pub coordinates: Vec<[f64; 2]>,
}

#[derive(Debug, Deserialize)]
pub struct ProviderLeg {
    #[serde(default)]
    pub steps: Vec<ProviderStep>,
}

#[derive(Debug, Deserialize)]
pub struct ProviderStep {
    #[serde(default)]
    pub distance: f64,
    #[serde(default)]
    pub duration: f64,
    pub geometry: Option<ProviderGeometry>,
    #[serde(default)]
    pub maneuver: ProviderManeuver,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProviderManeuver {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub modifier: Option<String>,
    #[serde(default)]
    pub instruction: Option<String>,
    #[serde(default)]
    pub bearing_after: Option<f64>,
    #[serde(default)]
    pub location: Option<[f64; 2]>,
}

fn lonlat(pair: [f64; 2]) -> GeoPoint {
    GeoPoint::new(pair[1], pair[0])
}

/// Rebuild the internal route model from a provider response.
///
/// Step anchors come from the per-step geometry; a step with no geometry of
/// its own borrows the maneuver location, and its end point borrows the
/// *next* step's maneuver location when available.
pub fn build_route(
    response: DirectionsResponse,
    destination: GeoPoint,
) -> std::result::Result<Route, DirectionsError> {
    let route = response
        .routes
        .into_iter()
        .next()
        .ok_or(DirectionsError::EmptyResponse)?;
    let leg = route
        .legs
        .into_iter()
        .next()
        .ok_or(DirectionsError::EmptyResponse)?;

    let maneuver_locations: Vec<Option<[f64; 2]>> =
        leg.steps.iter().map(|s| s.maneuver.location).collect();

    let steps = leg
        .steps
        .into_iter()
        .enumerate()
        .map(|(index, step)| {
            let geometry: Vec<GeoPoint> = step
                .geometry
                .as_ref()
                .map(|g| g.coordinates.iter().map(|&p| lonlat(p)).collect())
                .unwrap_or_default();

            let start = geometry
                .first()
                .copied()
                .or_else(|| step.maneuver.location.map(lonlat));
            let end = geometry
                .last()
                .copied()
                .or_else(|| {
                    maneuver_locations
                        .get(index + 1)
                        .copied()
                        .flatten()
                        .map(lonlat)
                })
                .or_else(|| step.maneuver.location.map(lonlat));

            RouteStep {
                index,
                instruction: step.maneuver.instruction.clone().unwrap_or_default(),
                distance: step.distance,
                duration: step.duration.round() as u32,
                maneuver: Maneuver {
                    kind: step.maneuver.kind.clone(),
                    modifier: step.maneuver.modifier.clone().unwrap_or_default(),
                    bearing: step.maneuver.bearing_after,
                },
                anchors: StepAnchors {
                    start,
                    end,
                    geometry,
                },
            }
        })
        .collect();

    let polyline = route
        .geometry
        .map(|g| g.coordinates.iter().map(|&p| lonlat(p)).collect())
        .unwrap_or_default();

    Ok(Route {
        destination: Some(destination),
        destination_label: None,
        steps,
        polyline,
        total_distance: route.distance,
        total_duration: route.duration,
        recalculated: true,
    })
}
