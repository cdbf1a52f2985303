//! GPS position decoding: NMEA grammar, serial read loop, fix state machine.

pub mod nmea;
pub mod receiver;
pub mod types;

pub use receiver::{GpsReceiver, PositionSubscriber};
pub use types::{GpsFix, GpsStatus};
