//! # Maneuver runner
//!
//! Executes a [`Maneuver`] against the vehicle while holding exclusive control of it. The
//! calling task is blocked until the maneuver is complete.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::sync::Arc;
use std::time::Duration;

use car_if::eqpt::act::IndicatorColor;
use log::{debug, info, warn};
use serde::Serialize;
use util::session::{self, SaveData};

use crate::clock::Clock;
use crate::vehicle::{ManeuverGuard, Vehicle, VehicleError};
use super::indicators::{uniform, StripColors, TurnSide};
use super::maneuver::{Maneuver, Step};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

pub struct ManeuverRunner {
    vehicle: Arc<Vehicle>,
    clock: Arc<dyn Clock>,
}

/// Record of an executed maneuver, saved into the session.
#[derive(Debug, Clone, Serialize)]
pub struct ManeuverRecord {
    pub name: &'static str,

    /// Clock time at which the maneuver started.
    ///
    /// Units: seconds
    pub start_s: f64,

    /// Clock time at which the maneuver ended.
    ///
    /// Units: seconds
    pub end_s: f64,

    /// Speed of the car when the maneuver started.
    pub entry_speed: u32,

    /// Number of motion demands suppressed by a pause.
    pub num_suppressed: usize,

    /// True if the indicators could not be lit.
    pub lighting_degraded: bool,

    /// True if the vehicle was shut down before the last step.
    pub aborted: bool,

    pub steps: Vec<Step>,
}

/// Per-run book-keeping.
struct RunState {
    num_suppressed: usize,
    lighting_degraded: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ManeuverRunner {
    pub fn new(vehicle: Arc<Vehicle>, clock: Arc<dyn Clock>) -> Self {
        Self {
            vehicle,
            clock
        }
    }

    /// Run the maneuver to completion.
    ///
    /// Fails without touching the vehicle if another maneuver is in progress, the car is paused
    /// or it has been shut down. Indicator failures never fail the maneuver, the lighting is
    /// skipped and every other step still runs.
    pub fn run(&self, mnvr: &Maneuver) -> Result<ManeuverRecord, VehicleError> {
        let guard = self.vehicle.begin_maneuver(mnvr.name, mnvr.takes_control)?;
        let entry_speed = guard.entry_speed()?;
        let start = self.clock.now();

        let mut run = RunState {
            num_suppressed: 0,
            lighting_degraded: false,
        };
        let mut aborted = false;

        for step in mnvr.steps.iter() {
            if !self.vehicle.is_running()? {
                warn!("Vehicle shut down during maneuver {}, abandoning it", mnvr.name);
                aborted = true;
                break;
            }

            debug!("Maneuver {}: {:?}", mnvr.name, step);

            let applied = match *step {
                Step::SetSpeed(s) => guard.set_speed(s)?,
                Step::RestoreSpeed => guard.restore_speed()?,
                Step::Steer(a) => guard.steer(a)?,
                Step::EnableFollowing => guard.enable_following()?,
                Step::ToggleLights => {
                    let on = guard.toggle_lights()?;
                    info!("Lights {}", if on { "on" } else { "off" });

                    let color = if on { IndicatorColor::WHITE } else { IndicatorColor::OFF };
                    self.light(&guard, &uniform(color), &mut run)?;
                    true
                },
                Step::Hold(d) => {
                    self.clock.sleep(d);
                    true
                },
                Step::Blink { side, duration } => {
                    self.blink(&guard, side, duration, &mut run)?;
                    true
                },
            };

            if !applied {
                run.num_suppressed += 1;
            }
        }

        // Release control before recording
        drop(guard);

        let record = ManeuverRecord {
            name: mnvr.name,
            start_s: start.as_secs_f64(),
            end_s: self.clock.now().as_secs_f64(),
            entry_speed,
            num_suppressed: run.num_suppressed,
            lighting_degraded: run.lighting_degraded,
            aborted,
            steps: mnvr.steps.clone(),
        };

        match SaveData::json(&record) {
            Ok(d) => session::save_with_timestamp(format!("maneuvers/{}.json", mnvr.name), d),
            Err(e) => warn!("Could not serialise the {} maneuver record: {}", mnvr.name, e)
        }

        Ok(record)
    }

    /// Animate the indicators for the turn side until `duration` has elapsed, then switch them
    /// off.
    ///
    /// The last frame is cut short at the deadline.
    fn blink(
        &self, 
        guard: &ManeuverGuard, 
        side: TurnSide, 
        duration: Duration,
        run: &mut RunState
    ) -> Result<(), VehicleError> {
        let deadline = self.clock.now() + duration;

        'cycles: loop {
            for frame in side.blink_cycle() {
                let now = self.clock.now();
                if now >= deadline || !self.vehicle.is_running()? {
                    break 'cycles;
                }

                self.light(guard, &frame.colors, run)?;
                self.clock.sleep(frame.duration.min(deadline - now));
            }
        }

        self.light(guard, &uniform(IndicatorColor::OFF), run)
    }

    /// Light the strip, unless it has already been found to be missing.
    fn light(
        &self,
        guard: &ManeuverGuard,
        colors: &StripColors,
        run: &mut RunState
    ) -> Result<(), VehicleError> {
        if run.lighting_degraded {
            return Ok(())
        }

        if let Err(e) = guard.set_indicators(colors)? {
            warn!("Indicators unavailable, continuing {} without them: {}", guard.name(), e);
            run.lighting_degraded = true;
        }

        Ok(())
    }
}
