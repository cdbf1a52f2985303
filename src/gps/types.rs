//! GPS fix and status types

use std::time::SystemTime;

/// Connection / fix status of the GPS receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpsStatus {
    Disconnected,
    Connecting,
    Connected,
    /// Receiving sentences but no position fix yet
    Fixing,
    /// Valid position fix available
    Fixed,
    /// Transport failure
    Error,
}

/// A single resolved position reading with accuracy metadata.
///
/// Mutated only by the decoder thread; everything else receives copies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsFix {
    /// Latitude in decimal degrees (negative = south)
    pub latitude: f64,
    /// Longitude in decimal degrees (negative = west)
    pub longitude: f64,
    /// Altitude above mean sea level, meters
    pub altitude: f64,
    /// Ground speed, m/s
    pub speed: f64,
    /// Course over ground, degrees
    pub course: f64,
    /// Satellites in use
    pub satellites: u32,
    /// Horizontal dilution of precision (lower is better)
    pub hdop: f64,
    /// Fix quality code (0 = no fix)
    pub fix_quality: u32,
    /// Capture timestamp
    pub timestamp: SystemTime,
    /// True when the receiver reports a usable position
    pub is_valid: bool,
}

impl Default for GpsFix {
    fn default() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            altitude: 0.0,
            speed: 0.0,
            course: 0.0,
            satellites: 0,
            hdop: 0.0,
            fix_quality: 0,
            timestamp: SystemTime::now(),
            is_valid: false,
        }
    }
}

impl GpsFix {
    /// Field-level equality ignoring the capture timestamp.
    ///
    /// Used to suppress redundant subscriber notifications when a sentence
    /// decodes to the values we already hold.
    pub fn same_reading(&self, other: &GpsFix) -> bool {
        self.latitude == other.latitude
            && self.longitude == other.longitude
            && self.altitude == other.altitude
            && self.speed == other.speed
            && self.course == other.course
            && self.satellites == other.satellites
            && self.hdop == other.hdop
            && self.fix_quality == other.fix_quality
            && self.is_valid == other.is_valid
    }
}
