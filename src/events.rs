//! Navigation events emitted by the core components.
//!
//! Presentation collaborators (display, voice, remote UI) consume these; the
//! daemon binary just logs them.

use crate::alerts::{AlertEvent, SpeedCamera};
use crate::route::{Deviation, RouteStep};

#[derive(Debug, Clone)]
pub enum NavEvent {
    /// The current navigation step changed
    StepChanged {
        step: RouteStep,
        remaining_distance: Option<f64>,
    },
    /// Position moved past the deviation warning threshold
    DeviationDetected(Deviation),
    /// Deviation passed the recalculation threshold
    RecalculationNeeded(Deviation),
    /// A recalculated route was installed
    RouteRecalculated {
        steps: usize,
        total_distance: f64,
    },
    /// Speed camera alert raised (new camera or fast approach)
    AlertRaised { camera: SpeedCamera, distance: f64 },
    /// Distance to the alerted camera changed
    AlertDistanceChanged { camera: SpeedCamera, distance: f64 },
    /// Left the alerted camera's radius
    AlertCleared { camera: SpeedCamera },
}

impl From<AlertEvent> for NavEvent {
    fn from(event: AlertEvent) -> Self {
        match event {
            AlertEvent::Raised { camera, distance } => NavEvent::AlertRaised { camera, distance },
            AlertEvent::DistanceChanged { camera, distance } => {
                NavEvent::AlertDistanceChanged { camera, distance }
            }
            AlertEvent::Cleared { camera } => NavEvent::AlertCleared { camera },
        }
    }
}

impl std::fmt::Display for NavEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NavEvent::StepChanged {
                step,
                remaining_distance,
            } => match remaining_distance {
                Some(d) => write!(f, "step {}: {} ({:.0}m)", step.index + 1, step.instruction, d),
                None => write!(f, "step {}: {}", step.index + 1, step.instruction),
            },
            NavEvent::DeviationDetected(d) => {
                write!(f, "off route by {:.0}m", d.distance)
            }
            NavEvent::RecalculationNeeded(d) => {
                write!(f, "off route by {:.0}m, recalculation needed", d.distance)
            }
            NavEvent::RouteRecalculated {
                steps,
                total_distance,
            } => write!(f, "new route: {} steps, {:.0}m", steps, total_distance),
            NavEvent::AlertRaised { camera, distance } => {
                write!(f, "camera {} at {:.0}m", camera.location_label(), distance)
            }
            NavEvent::AlertDistanceChanged { camera, distance } => {
                write!(f, "camera {} now {:.0}m", camera.location_label(), distance)
            }
            NavEvent::AlertCleared { camera } => {
                write!(f, "camera {} cleared", camera.location_label())
            }
        }
    }
}
