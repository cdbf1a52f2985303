//! Route tracking: step matching, deviation detection, re-routing.

pub mod directions;
pub mod tracker;
pub mod types;

pub use directions::{DirectionsClient, DirectionsError};
pub use tracker::{RecalcError, RouteTracker, TrackerState};
pub use types::{Deviation, GeoPoint, PositionUpdate, Route, RouteStep};
