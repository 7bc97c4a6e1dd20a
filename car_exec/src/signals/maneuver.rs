//! Maneuver plans
//!
//! A maneuver is a fixed sequence of steps worked through in order by the
//! [`ManeuverRunner`](super::runner::ManeuverRunner). Plans hold no reference to the vehicle, so
//! they can be built and inspected without any hardware or timing.

use std::time::Duration;

use serde::Serialize;

use super::indicators::TurnSide;

/// A planned maneuver.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Maneuver {
    /// Name of the signal which triggered the maneuver.
    pub name: &'static str,

    /// If true lane following is suspended for the whole maneuver.
    pub takes_control: bool,

    pub steps: Vec<Step>,
}

/// One step of a maneuver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Set the drive speed.
    SetSpeed(u32),

    /// Return to the speed the car had when the maneuver started.
    RestoreSpeed,

    /// Turn the front wheels, bypassing stabilisation.
    Steer(i32),

    /// Allow lane following to steer again.
    EnableFollowing,

    /// Toggle the head lights, lighting the whole strip white when they come on.
    ToggleLights,

    /// Keep the current demands for a while.
    Hold(Duration),

    /// Animate the indicators for a while, then switch them off.
    Blink {
        side: TurnSide,
        duration: Duration
    },
}

impl Maneuver {
    pub fn new(name: &'static str, takes_control: bool, steps: Vec<Step>) -> Self {
        Self {
            name,
            takes_control,
            steps
        }
    }

    /// Total time spent holding or blinking.
    pub fn duration(&self) -> Duration {
        self.steps
            .iter()
            .map(|s| match s {
                Step::Hold(d) => *d,
                Step::Blink { duration, .. } => *duration,
                _ => Duration::from_secs(0)
            })
            .sum()
    }
}
