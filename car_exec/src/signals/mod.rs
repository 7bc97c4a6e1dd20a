//! # Signals
//!
//! The signs and lights the car reacts to, and the maneuver each one triggers. Every signal is
//! mapped onto a [`Maneuver`] plan given the current vehicle state, which is then executed by the
//! [`ManeuverRunner`].
//!
//! | Signal      | Applies when  | Maneuver                                             | Control |
//! |-------------|---------------|------------------------------------------------------|---------|
//! | Stop        | moving        | stop, hold, restore the entry speed                  | yes     |
//! | Speed limit | always        | set the posted speed                                 | no      |
//! | Yield       | moving        | slow down, hold, set the exit speed                  | no      |
//! | Lights      | always        | toggle the lights                                    | no      |
//! | Roadwork    | moving        | slow down, hold, set the exit speed                  | no      |
//! | Straight    | moving        | centre the wheels for the travel time                | yes     |
//! | Turn        | moving        | sweep the wheels, blink for the travel time, centre  | yes     |
//! | Turn        | stationary    | blink                                                | no      |
//! | Red light   | always        | stop, hold                                           | yes     |
//! | Green light | always        | set the green speed if stationary, enable following  | no      |

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod indicators;
pub mod maneuver;
pub mod runner;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Serialize;
use util::time::secs_to_duration;

use crate::params::{CarParams, MnvrParams};
use crate::vehicle::VehicleState;

pub use indicators::TurnSide;
pub use maneuver::{Maneuver, Step};
pub use runner::{ManeuverRecord, ManeuverRunner};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A signal the car can react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Stop,
    SpeedLimit {
        speed: u32
    },
    Yield,
    Lights,
    Roadwork,
    Straight,
    Turn(TurnSide),
    GreenLight,
    RedLight,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Signal {
    /// Map a detector class id onto a signal, `None` for ids the car has no reaction to.
    pub fn from_class_id(class_id: usize, params: &MnvrParams) -> Option<Self> {
        let signal = match class_id {
            0 => Signal::Stop,
            1 => Signal::SpeedLimit { speed: params.speed_limit_low },
            2 => Signal::SpeedLimit { speed: params.speed_limit_high },
            3 => Signal::Yield,
            4 => Signal::Lights,
            5 => Signal::Roadwork,
            6 => Signal::Straight,
            7 => Signal::Turn(TurnSide::Left),
            8 => Signal::Turn(TurnSide::Right),
            9 => Signal::GreenLight,
            10 => Signal::RedLight,
            _ => return None
        };

        Some(signal)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Signal::Stop => "stop",
            Signal::SpeedLimit { .. } => "speed_limit",
            Signal::Yield => "yield",
            Signal::Lights => "lights",
            Signal::Roadwork => "roadwork",
            Signal::Straight => "straight",
            Signal::Turn(TurnSide::Left) => "turn_left",
            Signal::Turn(TurnSide::Right) => "turn_right",
            Signal::GreenLight => "green_light",
            Signal::RedLight => "red_light",
        }
    }

    /// Plan the maneuver for this signal given the current state of the car.
    ///
    /// Returns `None` if the signal does not apply in this state, for instance a stop sign
    /// while the car is already stationary.
    pub fn plan(&self, state: &VehicleState, params: &CarParams) -> Option<Maneuver> {
        let p = &params.mnvr;
        let speed = state.speed;
        let moving = speed > 0;
        let straight = params.lane.straight_angle_deg;
        let name = self.name();

        let mnvr = match *self {
            Signal::Stop if moving => Maneuver::new(name, true, vec![
                Step::SetSpeed(0),
                Step::Hold(secs_to_duration(p.stop_hold_s)),
                Step::RestoreSpeed,
            ]),
            Signal::SpeedLimit { speed } => Maneuver::new(name, false, vec![
                Step::SetSpeed(speed)
            ]),
            Signal::Yield if moving => Maneuver::new(name, false, vec![
                Step::SetSpeed(p.yield_speed),
                Step::Hold(secs_to_duration(p.yield_hold_s)),
                Step::SetSpeed(p.yield_exit_speed),
            ]),
            Signal::Lights => Maneuver::new(name, false, vec![
                Step::ToggleLights
            ]),
            Signal::Roadwork if moving => Maneuver::new(name, false, vec![
                Step::SetSpeed(p.roadwork_speed),
                Step::Hold(secs_to_duration(p.roadwork_hold_s)),
                Step::SetSpeed(p.roadwork_exit_speed),
            ]),
            Signal::Straight if moving => Maneuver::new(name, true, vec![
                Step::Steer(straight),
                Step::Hold(secs_to_duration(travel_time_s(p.ref_time_s, p.ref_speed, speed)?)),
            ]),
            Signal::Turn(side) if moving => {
                let sweep = match side {
                    TurnSide::Left => &p.left_sweep_deg,
                    TurnSide::Right => &p.right_sweep_deg,
                };
                let duration = secs_to_duration(travel_time_s(p.ref_time_s, p.ref_speed, speed)?);

                let mut steps: Vec<Step> = sweep
                    .iter()
                    .map(|a| Step::Steer(params.lane.clamp_angle(*a)))
                    .collect();
                steps.push(Step::Blink { side, duration });
                steps.push(Step::Steer(straight));

                Maneuver::new(name, true, steps)
            },
            Signal::Turn(side) => Maneuver::new(name, false, vec![
                Step::Blink { side, duration: secs_to_duration(p.stationary_blink_s) }
            ]),
            Signal::RedLight => Maneuver::new(name, true, vec![
                Step::SetSpeed(0),
                Step::Hold(secs_to_duration(p.red_hold_s)),
            ]),
            Signal::GreenLight if !moving => Maneuver::new(name, false, vec![
                Step::SetSpeed(p.green_speed),
                Step::EnableFollowing,
            ]),
            Signal::GreenLight => Maneuver::new(name, false, vec![
                Step::EnableFollowing
            ]),
            Signal::Stop | Signal::Yield | Signal::Roadwork | Signal::Straight => return None,
        };

        Some(mnvr)
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Time needed to cover the reference distance at `speed`.
///
/// The reference distance is the one covered in `ref_time_s` at `ref_speed`. Returns `None` for
/// a stationary car, which would never cover it.
pub fn travel_time_s(ref_time_s: f64, ref_speed: u32, speed: u32) -> Option<f64> {
    if speed == 0 {
        return None
    }

    Some((ref_time_s * ref_speed as f64) / speed as f64)
}
