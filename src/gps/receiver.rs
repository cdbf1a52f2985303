//! Serial GPS receiver: read loop, fix state, status machine, subscribers.
//!
//! One dedicated reader thread per receiver. The current fix is shared
//! behind a mutex and always handed out as a copy. Subscriber callbacks run
//! on the reader thread **after** the fix lock has been released, so a
//! callback may call back into the receiver without deadlocking.

use crate::config::GpsConfig;
use crate::error::{Error, Result};
use crate::gps::nmea::{self, Sentence};
use crate::gps::types::{GpsFix, GpsStatus};
use parking_lot::Mutex;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

/// Receives position and status updates from the decoder thread.
///
/// Callbacks fire at most once per actual change: position updates are
/// deduplicated at the field-decode boundary, status updates fire only on
/// transitions.
pub trait PositionSubscriber: Send {
    fn on_position(&self, fix: &GpsFix);
    fn on_status(&self, status: GpsStatus);
}

/// Decoder statistics, for diagnostics only.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecoderStats {
    /// Lines that looked like NMEA sentences
    pub sentences_received: u64,
    /// Sentences that decoded and were applied to the fix
    pub sentences_accepted: u64,
}

/// State shared between the reader thread and the receiver handle.
struct Shared {
    fix: Mutex<GpsFix>,
    status: Mutex<GpsStatus>,
    subscribers: Mutex<Vec<Box<dyn PositionSubscriber>>>,
    stats: Mutex<DecoderStats>,
}

impl Shared {
    fn new() -> Self {
        Self {
            fix: Mutex::new(GpsFix::default()),
            status: Mutex::new(GpsStatus::Disconnected),
            subscribers: Mutex::new(Vec::new()),
            stats: Mutex::new(DecoderStats::default()),
        }
    }

    /// Swap in a new status and notify subscribers if it changed.
    fn transition(&self, new_status: GpsStatus) {
        let changed = {
            let mut status = self.status.lock();
            if *status == new_status {
                false
            } else {
                *status = new_status;
                true
            }
        };
        if changed {
            log::info!("GPS status: {:?}", new_status);
            for sub in self.subscribers.lock().iter() {
                sub.on_status(new_status);
            }
        }
    }

    fn notify_position(&self, fix: &GpsFix) {
        for sub in self.subscribers.lock().iter() {
            sub.on_position(fix);
        }
    }

    fn status(&self) -> GpsStatus {
        *self.status.lock()
    }
}

/// Controller for a serial NMEA receiver.
pub struct GpsReceiver {
    config: GpsConfig,
    shared: Arc<Shared>,
    running: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl GpsReceiver {
    pub fn new(config: GpsConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared::new()),
            running: Arc::new(AtomicBool::new(false)),
            reader: None,
        }
    }

    /// Register a subscriber for position and status updates.
    pub fn subscribe(&self, subscriber: Box<dyn PositionSubscriber>) {
        self.shared.subscribers.lock().push(subscriber);
    }

    /// Open the serial port and start the reader thread.
    pub fn connect(&mut self) -> Result<()> {
        if self.reader.is_some() {
            return Err(Error::AlreadyConnected);
        }

        self.shared.transition(GpsStatus::Connecting);

        let timeout = Duration::from_secs_f64(self.config.read_timeout_secs);
        let port = serialport::new(&self.config.port, self.config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(timeout)
            .open()
            .map_err(|e| {
                self.shared.transition(GpsStatus::Error);
                Error::Serial(e)
            })?;

        log::info!(
            "Opened GPS port {} at {} baud",
            self.config.port,
            self.config.baud_rate
        );
        self.shared.transition(GpsStatus::Connected);

        self.running.store(true, Ordering::Relaxed);
        let shared = Arc::clone(&self.shared);
        let running = Arc::clone(&self.running);
        let strict_checksum = self.config.verify_checksum;

        let handle = thread::Builder::new()
            .name("gps-reader".to_string())
            .spawn(move || reader_loop(port, shared, running, strict_checksum))?;
        self.reader = Some(handle);

        Ok(())
    }

    /// Stop the reader thread and release the port.
    ///
    /// The read loop observes the stop flag within one read-timeout interval.
    pub fn disconnect(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.reader.take() {
            if handle.join().is_err() {
                log::error!("GPS reader thread panicked");
            }
        }
        self.shared.transition(GpsStatus::Disconnected);
        log::info!("GPS disconnected");
    }

    /// Snapshot of the current fix (a copy, never a live reference).
    pub fn position(&self) -> GpsFix {
        *self.shared.fix.lock()
    }

    pub fn status(&self) -> GpsStatus {
        *self.shared.status.lock()
    }

    /// True when the receiver holds a usable fix.
    pub fn has_fix(&self) -> bool {
        let status = self.status();
        let fix = self.position();
        status == GpsStatus::Fixed && fix.is_valid && fix.fix_quality > 0
    }

    pub fn stats(&self) -> DecoderStats {
        *self.shared.stats.lock()
    }

    /// Block until a fix is available or the timeout elapses.
    pub fn wait_for_fix(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if self.has_fix() {
                return true;
            }
            thread::sleep(Duration::from_millis(250));
        }
        false
    }
}

impl Drop for GpsReceiver {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

/// Reader loop: accumulate bytes, split on newlines, decode, apply.
///
/// Transport errors are transient: they log, flag Error status, and the loop
/// keeps going until `disconnect()` clears the running flag.
fn reader_loop(
    mut port: Box<dyn SerialPort>,
    shared: Arc<Shared>,
    running: Arc<AtomicBool>,
    strict_checksum: bool,
) {
    log::debug!("GPS reader thread started");
    let mut buffer: Vec<u8> = Vec::with_capacity(1024);
    let mut chunk = [0u8; 512];

    while running.load(Ordering::Relaxed) {
        match port.read(&mut chunk) {
            Ok(0) => continue,
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
            Err(e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                continue;
            }
            Err(e) => {
                log::error!("GPS read error: {}", e);
                shared.transition(GpsStatus::Error);
                thread::sleep(Duration::from_millis(100));
                continue;
            }
        }

        while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line_bytes);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            process_line(line, &shared, strict_checksum);
        }

        // Garbage guard: a receiver stuck at the wrong baud rate never
        // produces a newline.
        if buffer.len() > 4096 {
            buffer.clear();
        }
    }

    log::debug!("GPS reader thread exiting");
}

fn process_line(line: &str, shared: &Shared, strict_checksum: bool) {
    if line.starts_with('$') {
        shared.stats.lock().sentences_received += 1;
    }

    let Some(sentence) = nmea::parse_sentence(line, strict_checksum) else {
        log::trace!("Dropped line: {}", line);
        return;
    };

    // Update state under the lock, copy the snapshot, release, then notify.
    let (snapshot, changed, status_change) = {
        let mut fix = shared.fix.lock();
        let (changed, status_change) = apply_sentence(&mut fix, shared.status(), &sentence);
        (*fix, changed, status_change)
    };

    shared.stats.lock().sentences_accepted += 1;

    if let Some(new_status) = status_change {
        if new_status == GpsStatus::Fixed {
            log::info!(
                "GPS fix acquired: {:.6}, {:.6} ({} satellites, HDOP {:.1})",
                snapshot.latitude,
                snapshot.longitude,
                snapshot.satellites,
                snapshot.hdop
            );
        }
        shared.transition(new_status);
    }
    if changed {
        shared.notify_position(&snapshot);
    }
}

/// Apply a decoded sentence to the fix and derive the status transition.
///
/// Returns (fields changed, new status if a transition is due). Pure so the
/// state machine is testable without a serial port.
fn apply_sentence(
    fix: &mut GpsFix,
    status: GpsStatus,
    sentence: &Sentence,
) -> (bool, Option<GpsStatus>) {
    let before = *fix;
    let mut status_change = None;

    match *sentence {
        Sentence::Gga {
            latitude,
            longitude,
            fix_quality,
            satellites,
            hdop,
            altitude,
        } => {
            fix.latitude = latitude;
            fix.longitude = longitude;
            fix.fix_quality = fix_quality;
            fix.satellites = satellites;
            fix.hdop = hdop;
            fix.altitude = altitude;
            fix.is_valid = fix_quality > 0;

            if fix_quality > 0 {
                if status != GpsStatus::Fixed {
                    status_change = Some(GpsStatus::Fixed);
                }
            } else if status == GpsStatus::Connected || status == GpsStatus::Fixed {
                status_change = Some(GpsStatus::Fixing);
            }
        }
        Sentence::Rmc {
            latitude,
            longitude,
            speed,
            course,
        } => {
            if let Some(lat) = latitude {
                fix.latitude = lat;
            }
            if let Some(lon) = longitude {
                fix.longitude = lon;
            }
            fix.speed = speed;
            fix.course = course;
            fix.is_valid = true;
        }
        Sentence::Gll {
            latitude,
            longitude,
        } => {
            if let Some(lat) = latitude {
                fix.latitude = lat;
            }
            if let Some(lon) = longitude {
                fix.longitude = lon;
            }
            fix.is_valid = true;
        }
        Sentence::Vtg { speed } => {
            fix.speed = speed;
        }
    }

    let changed = !fix.same_reading(&before);
    if changed {
        fix.timestamp = SystemTime::now();
    }
    (changed, status_change)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gga(quality: u32) -> Sentence {
        Sentence::Gga {
            latitude: 48.1173,
            longitude: 11.5167,
            fix_quality: quality,
            satellites: 8,
            hdop: 0.9,
            altitude: 545.4,
        }
    }

    #[test]
    fn test_connected_to_fixing_on_no_fix() {
        let mut fix = GpsFix::default();
        let (_, status) = apply_sentence(&mut fix, GpsStatus::Connected, &gga(0));
        assert_eq!(status, Some(GpsStatus::Fixing));
        assert!(!fix.is_valid);
    }

    #[test]
    fn test_fixing_to_fixed_on_quality() {
        let mut fix = GpsFix::default();
        let (changed, status) = apply_sentence(&mut fix, GpsStatus::Fixing, &gga(1));
        assert!(changed);
        assert_eq!(status, Some(GpsStatus::Fixed));
        assert!(fix.is_valid);
        assert_eq!(fix.fix_quality, 1);
    }

    #[test]
    fn test_fixed_reverts_to_fixing_on_lost_quality() {
        let mut fix = GpsFix::default();
        apply_sentence(&mut fix, GpsStatus::Fixing, &gga(1));
        let (_, status) = apply_sentence(&mut fix, GpsStatus::Fixed, &gga(0));
        assert_eq!(status, Some(GpsStatus::Fixing));
        assert!(!fix.is_valid);
    }

    #[test]
    fn test_no_redundant_transition_while_fixed() {
        let mut fix = GpsFix::default();
        apply_sentence(&mut fix, GpsStatus::Fixing, &gga(1));
        let (changed, status) = apply_sentence(&mut fix, GpsStatus::Fixed, &gga(1));
        assert!(!changed, "identical reading must not notify");
        assert_eq!(status, None);
    }

    #[test]
    fn test_rmc_updates_speed_and_course() {
        let mut fix = GpsFix::default();
        let sentence = Sentence::Rmc {
            latitude: Some(45.0),
            longitude: Some(9.0),
            speed: 11.5,
            course: 84.4,
        };
        let (changed, _) = apply_sentence(&mut fix, GpsStatus::Fixed, &sentence);
        assert!(changed);
        assert_eq!(fix.latitude, 45.0);
        assert_eq!(fix.speed, 11.5);
        assert_eq!(fix.course, 84.4);
        assert!(fix.is_valid);
    }

    #[test]
    fn test_rmc_keeps_position_when_fields_absent() {
        let mut fix = GpsFix {
            latitude: 45.0,
            longitude: 9.0,
            ..GpsFix::default()
        };
        let sentence = Sentence::Rmc {
            latitude: None,
            longitude: None,
            speed: 2.0,
            course: 10.0,
        };
        apply_sentence(&mut fix, GpsStatus::Fixed, &sentence);
        assert_eq!(fix.latitude, 45.0);
        assert_eq!(fix.longitude, 9.0);
    }

    #[test]
    fn test_vtg_only_touches_speed() {
        let mut fix = GpsFix {
            latitude: 45.0,
            longitude: 9.0,
            is_valid: true,
            ..GpsFix::default()
        };
        let (changed, status) =
            apply_sentence(&mut fix, GpsStatus::Fixed, &Sentence::Vtg { speed: 5.0 });
        assert!(changed);
        assert_eq!(status, None);
        assert_eq!(fix.speed, 5.0);
        assert_eq!(fix.latitude, 45.0);
    }
}
