//! Speed-camera proximity alerts.

pub mod dataset;
pub mod engine;

pub use dataset::{load_cameras, SpeedCamera};
pub use engine::{AlertEvent, ProximityAlertEngine};
