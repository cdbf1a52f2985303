//! MargaNav - satellite navigation core
//!
//! This library provides the core components of an embedded turn-by-turn
//! navigation daemon:
//!
//! - NMEA position decoding from a serial GPS receiver
//! - Route tracking with step matching and deviation detection
//! - Guarded automatic re-routing through a directions provider
//! - Speed-camera proximity alerts with hysteresis

pub mod alerts;
pub mod config;
pub mod error;
pub mod events;
pub mod geo;
pub mod gps;
pub mod route;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{Error, Result};
pub use events::NavEvent;
