//! MargaNav - satellite navigation daemon
//!
//! Thin orchestrator around the library components: decodes positions from
//! the serial GPS receiver, tracks the active route, raises speed-camera
//! alerts, and dispatches route recalculations to a worker thread.
//!
//! Route messages (the upstream wire format, one JSON document per line) are
//! accepted on stdin; emitted navigation events go to the log. Display and
//! transport layers live in separate processes.

mod alerts;
mod config;
mod error;
mod events;
mod geo;
mod gps;
mod route;

use crate::alerts::ProximityAlertEngine;
use crate::config::AppConfig;
use crate::error::Result;
use crate::events::NavEvent;
use crate::gps::{GpsFix, GpsReceiver, GpsStatus, PositionSubscriber};
use crate::route::directions::DirectionsError;
use crate::route::types::RouteMessage;
use crate::route::{DirectionsClient, GeoPoint, RecalcError, Route, RouteTracker};
use crossbeam_channel::{select, tick, unbounded, Sender};
use std::env;
use std::io::BufRead;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Parse config path from command line arguments.
///
/// Supports:
/// - `marga-nav <path>` (positional)
/// - `marga-nav --config <path>` (flag-based)
/// - `marga-nav -c <path>` (short flag)
///
/// Defaults to `/etc/marga-nav.toml` if not specified.
fn parse_config_path() -> String {
    let args: Vec<String> = env::args().collect();

    // Look for --config or -c flag
    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }

    // Fall back to first positional argument (if it doesn't start with -)
    if args.len() > 1 && !args[1].starts_with('-') {
        return args[1].clone();
    }

    // Default path
    "/etc/marga-nav.toml".to_string()
}

/// Updates forwarded from the GPS reader thread to the main loop.
enum GpsUpdate {
    Fix(GpsFix),
    Status(GpsStatus),
}

/// Bridges receiver callbacks onto a channel so the main loop owns all
/// navigation state without sharing it with the reader thread.
struct ChannelSubscriber {
    tx: Sender<GpsUpdate>,
}

impl PositionSubscriber for ChannelSubscriber {
    fn on_position(&self, fix: &GpsFix) {
        let _ = self.tx.send(GpsUpdate::Fix(*fix));
    }

    fn on_status(&self, status: GpsStatus) {
        let _ = self.tx.send(GpsUpdate::Status(status));
    }
}

fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("MargaNav v0.2.0 starting...");

    let config_path = parse_config_path();
    let config = if Path::new(&config_path).exists() {
        log::info!("Using config: {}", config_path);
        AppConfig::from_file(&config_path)?
    } else {
        log::warn!("Config {} not found, using defaults", config_path);
        AppConfig::default()
    };

    // Component construction. Everything is owned here; the only shared
    // state is the receiver's internal fix snapshot.
    let mut receiver = GpsReceiver::new(config.gps.clone());
    let mut tracker = RouteTracker::new(config.route.clone());
    let mut engine = ProximityAlertEngine::new(config.speedcams.clone());
    let directions = Arc::new(DirectionsClient::new(config.directions.clone())?);

    let (gps_tx, gps_rx) = unbounded::<GpsUpdate>();
    receiver.subscribe(Box::new(ChannelSubscriber { tx: gps_tx }));

    // Set up shutdown signal handler
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| error::Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    // Recalculation worker: takes origin/destination pairs, performs the
    // blocking provider request, reports the outcome back.
    let (recalc_tx, recalc_job_rx) = unbounded::<(GeoPoint, GeoPoint)>();
    let (recalc_result_tx, recalc_result_rx) =
        unbounded::<std::result::Result<Route, DirectionsError>>();
    let worker_client = Arc::clone(&directions);
    let _recalc_handle = thread::Builder::new()
        .name("recalc-worker".to_string())
        .spawn(move || {
            while let Ok((origin, destination)) = recalc_job_rx.recv() {
                let result = worker_client.fetch_route(origin, destination);
                if recalc_result_tx.send(result).is_err() {
                    break;
                }
            }
        })?;

    // Route input: one wire-format JSON route message per stdin line.
    let (route_tx, route_rx) = unbounded::<Route>();
    let _route_handle = thread::Builder::new()
        .name("route-input".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match RouteMessage::from_json(line) {
                    Ok(message) => match message.into_route() {
                        Some(route) => {
                            if route_tx.send(route).is_err() {
                                break;
                            }
                        }
                        None => log::debug!("Ignoring non-route message"),
                    },
                    Err(e) => log::warn!("Bad route message: {}", e),
                }
            }
        })?;

    if let Err(e) = receiver.connect() {
        log::error!("Failed to open GPS port: {}", e);
        return Err(e);
    }

    log::info!("MargaNav running. Press Ctrl-C to stop.");

    let ticker = tick(Duration::from_millis(200));
    let mut was_deviated = false;

    while running.load(Ordering::Relaxed) {
        select! {
            recv(gps_rx) -> msg => match msg {
                Ok(GpsUpdate::Fix(fix)) => {
                    handle_fix(
                        &fix,
                        &mut tracker,
                        &mut engine,
                        &directions,
                        &recalc_tx,
                        &mut was_deviated,
                    );
                }
                Ok(GpsUpdate::Status(status)) => {
                    log::debug!("GPS status update: {:?}", status);
                }
                Err(_) => break,
            },
            recv(route_rx) -> msg => {
                if let Ok(route) = msg {
                    tracker.set_route(route);
                    was_deviated = false;
                }
            },
            recv(recalc_result_rx) -> msg => {
                if let Ok(result) = msg {
                    match tracker.complete_recalculation(result) {
                        Ok(route) => emit(NavEvent::RouteRecalculated {
                            steps: route.steps.len(),
                            total_distance: route.total_distance,
                        }),
                        Err(e) => log::debug!("Recalculation outcome: {}", e),
                    }
                }
            },
            recv(ticker) -> _ => {}
        }
    }

    // Shutdown
    log::info!("Shutting down...");
    receiver.disconnect();

    let decoder = receiver.stats();
    let tracking = tracker.stats();
    let alerting = engine.stats();
    log::info!(
        "Session: {}/{} sentences decoded, {} step updates, {} recalculations \
         ({} failed), {} camera scans, {} alerts",
        decoder.sentences_accepted,
        decoder.sentences_received,
        tracking.step_updates,
        tracking.recalculate_success,
        tracking.recalculate_failed,
        alerting.scans,
        alerting.alerts_raised
    );

    log::info!("MargaNav stopped");
    Ok(())
}

/// Per-fix pipeline: route tracking, recalculation dispatch, camera scan.
fn handle_fix(
    fix: &GpsFix,
    tracker: &mut RouteTracker,
    engine: &mut ProximityAlertEngine,
    directions: &DirectionsClient,
    recalc_tx: &Sender<(GeoPoint, GeoPoint)>,
    was_deviated: &mut bool,
) {
    let update = tracker.update_position(fix);

    if update.step_changed {
        if let Some(step) = update.current_step.clone() {
            emit(NavEvent::StepChanged {
                step,
                remaining_distance: update.remaining_distance,
            });
        }
    }

    if let Some(deviation) = update.deviation {
        if deviation.is_deviated && !*was_deviated {
            emit(NavEvent::DeviationDetected(deviation));
        }
        *was_deviated = deviation.is_deviated;

        if update.recalculation_needed {
            match tracker.begin_recalculation(fix, directions) {
                Ok(job) => {
                    emit(NavEvent::RecalculationNeeded(deviation));
                    let _ = recalc_tx.send(job);
                }
                Err(RecalcError::InFlight) | Err(RecalcError::Cooldown { .. }) => {
                    log::debug!("Recalculation skipped");
                }
                Err(e) => log::debug!("Recalculation unavailable: {}", e),
            }
        }
    }

    if let Some(event) = engine.scan(Some(fix)) {
        emit(NavEvent::from(event));
    }
}

fn emit(event: NavEvent) {
    log::info!("[event] {}", event);
}
