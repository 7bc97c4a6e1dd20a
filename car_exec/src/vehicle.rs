//! # Vehicle state
//!
//! The single source of truth for the car's commanded state, shared between the lane following
//! task, the sign detection task, maneuvers and the operator.
//!
//! The state and the actuator live behind one mutex, so a demand is only written to the actuator
//! while holding the lock under which the task checked it was allowed to write it. In particular
//! once a maneuver takes control no lane following steering demand can reach the wheels until
//! the maneuver has released control.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use car_if::eqpt::act::{Actuator, ActuatorError, IndicatorColor, NUM_INDICATOR_CELLS};
use log::{debug, error, info, warn};
use serde::Serialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Commanded state of the car.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleState {
    /// Current front wheel angle demand.
    ///
    /// Units: degrees, 90 is straight ahead
    pub steering_angle_deg: i32,

    /// Current drive motor speed demand.
    pub speed: u32,

    /// If false the lane following task must not write any actuator demand.
    pub following_enabled: bool,

    /// If false the sign detection task idles.
    pub detecting_enabled: bool,

    /// State of the head lights.
    pub lights_on: bool,

    /// True while an operator pause is in effect.
    pub paused: bool,

    /// False once the vehicle has been shut down.
    pub running: bool,

    /// The maneuver currently in progress, if any.
    pub maneuver: Option<ActiveManeuver>,
}

/// Book-keeping for the maneuver in progress.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveManeuver {
    pub id: u64,

    pub name: &'static str,

    /// Speed of the car when the maneuver began.
    pub entry_speed: u32,

    /// True if the maneuver suspended lane following.
    pub has_control: bool,
}

/// Outcome of a lane following steering request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneSteer {
    /// Steering angle before the request.
    pub previous_deg: i32,

    /// The angle computed for this request.
    pub stabilised_deg: i32,

    /// True if the angle was written to the vehicle and the actuator.
    pub actuated: bool,
}

/// Shared handle to the vehicle.
pub struct Vehicle {
    inner: Mutex<Inner>,

    /// Notified on every change of the mode flags.
    changed: Condvar,

    straight_angle_deg: i32,
}

struct Inner {
    state: VehicleState,

    act: Box<dyn Actuator + Send>,

    /// Speed restored by a resume.
    resume_speed: u32,

    next_mnvr_id: u64,
}

/// Exclusive access to the vehicle for the duration of a maneuver.
///
/// Dropping the guard ends the maneuver, re-enabling lane following if the maneuver had
/// suspended it and no pause has been issued since.
pub struct ManeuverGuard<'a> {
    vehicle: &'a Vehicle,
    id: u64,
    name: &'static str,
}

/// Shuts the vehicle down when dropped, including when a task unwinds from a panic.
///
/// Held by every task the car cannot drive without.
pub struct ShutdownOnExit {
    vehicle: Arc<Vehicle>,
    task: &'static str,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum VehicleError {
    #[error("The vehicle state lock was poisoned by a panicking task")]
    LockPoisoned,

    #[error("Cannot start a maneuver while {0} is in progress")]
    ManeuverActive(&'static str),

    #[error("Cannot start a maneuver while paused")]
    Paused,

    #[error("The vehicle has been shut down")]
    ShutDown,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Vehicle {
    /// Create the vehicle, neutralising the actuators.
    ///
    /// The car starts stationary with the wheels straight, and both tasks enabled.
    pub fn new(mut act: Box<dyn Actuator + Send>, straight_angle_deg: i32) -> Self {
        act.turn_front_wheels(straight_angle_deg);
        act.set_speed(0);

        Self {
            inner: Mutex::new(Inner {
                state: VehicleState {
                    steering_angle_deg: straight_angle_deg,
                    speed: 0,
                    following_enabled: true,
                    detecting_enabled: true,
                    lights_on: false,
                    paused: false,
                    running: true,
                    maneuver: None,
                },
                act,
                resume_speed: 0,
                next_mnvr_id: 0,
            }),
            changed: Condvar::new(),
            straight_angle_deg,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, VehicleError> {
        self.inner.lock().map_err(|_| VehicleError::LockPoisoned)
    }

    /// Get a copy of the current state.
    pub fn snapshot(&self) -> Result<VehicleState, VehicleError> {
        Ok(self.lock()?.state.clone())
    }

    pub fn is_running(&self) -> Result<bool, VehicleError> {
        Ok(self.lock()?.state.running)
    }

    /// Start driving at the given speed.
    pub fn start(&self, speed: u32) -> Result<(), VehicleError> {
        let mut inner = self.lock()?;
        if !inner.state.running {
            return Err(VehicleError::ShutDown)
        }

        info!("Starting at speed {}", speed);
        inner.set_speed(speed);
        inner.resume_speed = speed;
        Ok(())
    }

    /// Request a lane following steering change.
    ///
    /// `stabilise` maps the current steering angle onto the new one, it is evaluated under the
    /// state lock so it always sees the angle the write would replace. The result is written
    /// only if lane following is enabled.
    pub fn apply_lane_steering<F>(&self, stabilise: F) -> Result<LaneSteer, VehicleError>
    where
        F: FnOnce(i32) -> i32
    {
        let mut inner = self.lock()?;
        let previous_deg = inner.state.steering_angle_deg;
        let stabilised_deg = stabilise(previous_deg);

        let actuated = inner.state.running && inner.state.following_enabled;
        if actuated {
            inner.steer(stabilised_deg);
        }

        Ok(LaneSteer {
            previous_deg,
            stabilised_deg,
            actuated
        })
    }

    /// Begin a maneuver.
    ///
    /// If `take_control` is true lane following is suspended until the returned guard is
    /// dropped. Fails if another maneuver is in progress, the car is paused, or shut down.
    pub fn begin_maneuver(
        &self, 
        name: &'static str, 
        take_control: bool
    ) -> Result<ManeuverGuard<'_>, VehicleError> {
        let mut inner = self.lock()?;

        if !inner.state.running {
            return Err(VehicleError::ShutDown)
        }
        if inner.state.paused {
            return Err(VehicleError::Paused)
        }
        if let Some(ref m) = inner.state.maneuver {
            return Err(VehicleError::ManeuverActive(m.name))
        }

        let id = inner.next_mnvr_id;
        inner.next_mnvr_id += 1;

        let entry_speed = inner.state.speed;
        inner.state.maneuver = Some(ActiveManeuver {
            id,
            name,
            entry_speed,
            has_control: take_control,
        });

        if take_control {
            inner.state.following_enabled = false;
        }

        info!("Maneuver {} started (speed {}, control taken: {})", name, entry_speed, take_control);

        drop(inner);
        self.changed.notify_all();

        Ok(ManeuverGuard {
            vehicle: self,
            id,
            name
        })
    }

    /// Pause the car: stop, and suspend both lane following and detection.
    ///
    /// The pause wins over any maneuver in progress, which will not restore speed or lane
    /// following while the pause is in effect.
    pub fn pause(&self) -> Result<(), VehicleError> {
        let mut inner = self.lock()?;

        if !inner.state.paused {
            inner.resume_speed = inner.state.speed;
        }

        inner.state.paused = true;
        inner.state.following_enabled = false;
        inner.state.detecting_enabled = false;
        inner.set_speed(0);

        info!("Paused, speed {} will be restored on resume", inner.resume_speed);

        drop(inner);
        self.changed.notify_all();
        Ok(())
    }

    /// Undo a pause, restoring the pre-pause speed and re-enabling both tasks.
    ///
    /// Speed demands a maneuver made while paused replace the pre-pause speed, so the car comes
    /// back to the speed it would have had without the pause. If a maneuver which took control is
    /// still in progress lane following stays suspended until it ends.
    pub fn resume(&self) -> Result<(), VehicleError> {
        let mut inner = self.lock()?;

        if !inner.state.running {
            return Err(VehicleError::ShutDown)
        }
        if !inner.state.paused {
            warn!("Resume requested but the car is not paused, ignored");
            return Ok(())
        }

        inner.state.paused = false;
        inner.state.detecting_enabled = true;
        inner.state.following_enabled = match inner.state.maneuver {
            Some(ref m) => !m.has_control,
            None => true
        };
        let speed = inner.resume_speed;
        inner.set_speed(speed);

        info!("Resumed at speed {}", speed);

        drop(inner);
        self.changed.notify_all();
        Ok(())
    }

    /// Neutralise the actuators and stop both tasks.
    ///
    /// Shutting down is idempotent, and succeeds even if a task panicked while holding the lock.
    pub fn shutdown(&self) {
        let mut inner = match self.inner.lock() {
            Ok(i) => i,
            Err(e) => e.into_inner()
        };

        if inner.state.running {
            info!("Shutting down the vehicle, neutralising actuators");
        }

        inner.state.running = false;
        inner.state.following_enabled = false;
        inner.state.detecting_enabled = false;
        inner.set_speed(0);
        let straight = self.straight_angle_deg;
        inner.steer(straight);
        for cell in 0..NUM_INDICATOR_CELLS {
            if inner.act.set_indicator(cell, IndicatorColor::OFF).is_err() {
                break;
            }
        }

        drop(inner);
        self.changed.notify_all();
    }

    /// Block until sign detection is enabled, the vehicle shuts down, or the timeout elapses.
    ///
    /// Returns true if detection is enabled and the vehicle is running.
    pub fn wait_for_detecting(&self, timeout: Duration) -> Result<bool, VehicleError> {
        let inner = self.lock()?;
        let (inner, _) = self.changed
            .wait_timeout_while(inner, timeout, |i| {
                i.state.running && !i.state.detecting_enabled
            })
            .map_err(|_| VehicleError::LockPoisoned)?;

        Ok(inner.state.running && inner.state.detecting_enabled)
    }

    /// End the maneuver with the given id.
    fn end_maneuver(&self, id: u64) {
        // Ending must never fail, otherwise lane following could be suspended forever.
        let mut inner = match self.inner.lock() {
            Ok(i) => i,
            Err(e) => e.into_inner()
        };

        let mnvr = match inner.state.maneuver.take() {
            Some(m) if m.id == id => m,
            other => {
                warn!("Maneuver {} ended but {:?} is registered as active", id, other);
                inner.state.maneuver = other;
                return
            }
        };

        if mnvr.has_control && inner.state.running && !inner.state.paused {
            inner.state.following_enabled = true;
        }

        info!(
            "Maneuver {} complete (speed {}, following {})", 
            mnvr.name,
            inner.state.speed,
            inner.state.following_enabled
        );

        drop(inner);
        self.changed.notify_all();
    }
}

impl Inner {
    fn set_speed(&mut self, speed: u32) {
        self.state.speed = speed;
        self.act.set_speed(speed);
    }

    fn steer(&mut self, angle_deg: i32) {
        self.state.steering_angle_deg = angle_deg;
        self.act.turn_front_wheels(angle_deg);
    }

    /// True if motion demands from the maneuver with this id may be applied.
    fn maneuver_may_move(&self, id: u64) -> bool {
        let own = self.state.maneuver.as_ref().map(|m| m.id) == Some(id);
        own && self.state.running && !self.state.paused
    }
}

impl<'a> ManeuverGuard<'a> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Speed of the car when the maneuver started.
    pub fn entry_speed(&self) -> Result<u32, VehicleError> {
        let inner = self.vehicle.lock()?;
        Ok(inner.state.maneuver
            .as_ref()
            .map(|m| m.entry_speed)
            .unwrap_or(inner.state.speed))
    }

    /// Set the speed. Returns false if the demand was suppressed by a pause.
    ///
    /// A suppressed demand becomes the speed restored on resume.
    pub fn set_speed(&self, speed: u32) -> Result<bool, VehicleError> {
        let mut inner = self.vehicle.lock()?;
        if inner.maneuver_may_move(self.id) {
            inner.set_speed(speed);
            return Ok(true)
        }

        if inner.state.running && inner.state.paused {
            debug!("Maneuver {} speed {} deferred until resume", self.name, speed);
            inner.resume_speed = speed;
        }
        else {
            debug!("Maneuver {} speed {} suppressed (shut down)", self.name, speed);
        }
        Ok(false)
    }

    /// Restore the speed the car had when the maneuver started.
    pub fn restore_speed(&self) -> Result<bool, VehicleError> {
        let speed = self.entry_speed()?;
        self.set_speed(speed)
    }

    /// Turn the front wheels, bypassing stabilisation.
    pub fn steer(&self, angle_deg: i32) -> Result<bool, VehicleError> {
        self.motion(|inner| inner.steer(angle_deg))
    }

    /// Re-enable lane following.
    pub fn enable_following(&self) -> Result<bool, VehicleError> {
        self.motion(|inner| inner.state.following_enabled = true)
    }

    /// Toggle the head lights state, returning the new state.
    pub fn toggle_lights(&self) -> Result<bool, VehicleError> {
        let mut inner = self.vehicle.lock()?;
        inner.state.lights_on = !inner.state.lights_on;
        Ok(inner.state.lights_on)
    }

    /// Set all indicator cells.
    pub fn set_indicators(
        &self, 
        colors: &[IndicatorColor; NUM_INDICATOR_CELLS]
    ) -> Result<Result<(), ActuatorError>, VehicleError> {
        let mut inner = self.vehicle.lock()?;
        for (cell, color) in colors.iter().enumerate() {
            if let Err(e) = inner.act.set_indicator(cell, *color) {
                return Ok(Err(e))
            }
        }
        Ok(Ok(()))
    }

    fn motion<F>(&self, apply: F) -> Result<bool, VehicleError>
    where
        F: FnOnce(&mut Inner)
    {
        let mut inner = self.vehicle.lock()?;
        if inner.maneuver_may_move(self.id) {
            apply(&mut *inner);
            Ok(true)
        }
        else {
            debug!("Maneuver {} demand suppressed (paused or shut down)", self.name);
            Ok(false)
        }
    }
}

impl<'a> Drop for ManeuverGuard<'a> {
    fn drop(&mut self) {
        self.vehicle.end_maneuver(self.id)
    }
}

impl ShutdownOnExit {
    pub fn new(vehicle: Arc<Vehicle>, task: &'static str) -> Self {
        Self {
            vehicle,
            task
        }
    }
}

impl Drop for ShutdownOnExit {
    fn drop(&mut self) {
        if thread::panicking() {
            error!("The {} task panicked", self.task);
        }
        else {
            debug!("The {} task ended", self.task);
        }
        self.vehicle.shutdown()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mock::{ActEvent, RecordingMech};

    fn vehicle() -> (Vehicle, RecordingMech) {
        let mech = RecordingMech::new(true);
        let v = Vehicle::new(Box::new(mech.clone()), 90);
        v.start(30).unwrap();
        mech.clear();
        (v, mech)
    }

    #[test]
    fn test_lane_steering_gated_by_following() {
        let (v, mech) = vehicle();

        let s = v.apply_lane_steering(|prev| prev + 2).unwrap();
        assert_eq!(s, LaneSteer { previous_deg: 90, stabilised_deg: 92, actuated: true });

        let guard = v.begin_maneuver("test", true).unwrap();
        assert_eq!(v.snapshot().unwrap().following_enabled, false);

        let s = v.apply_lane_steering(|prev| prev + 2).unwrap();
        assert_eq!(s.actuated, false);
        assert_eq!(v.snapshot().unwrap().steering_angle_deg, 92);

        drop(guard);
        assert_eq!(v.snapshot().unwrap().following_enabled, true);
        assert_eq!(mech.events(), vec![ActEvent::Turn(92)]);
    }

    #[test]
    fn test_single_maneuver_at_a_time() {
        let (v, _) = vehicle();

        let guard = v.begin_maneuver("stop", true).unwrap();
        assert_eq!(
            v.begin_maneuver("yield", false).err(), 
            Some(VehicleError::ManeuverActive("stop"))
        );
        drop(guard);

        assert!(v.begin_maneuver("yield", false).is_ok());
    }

    #[test]
    fn test_pause_overrides_maneuver_restore() {
        let (v, mech) = vehicle();

        let guard = v.begin_maneuver("stop", true).unwrap();
        assert!(guard.set_speed(0).unwrap());
        v.pause().unwrap();

        // The maneuver's restore is suppressed, and its end doesn't re-enable following
        assert_eq!(guard.restore_speed().unwrap(), false);
        drop(guard);

        let s = v.snapshot().unwrap();
        assert_eq!(s.speed, 0);
        assert_eq!(s.following_enabled, false);
        assert_eq!(s.detecting_enabled, false);
        assert_eq!(mech.speeds(), vec![0, 0]);

        // Resume comes back to the speed before the maneuver held the car
        v.resume().unwrap();
        let s = v.snapshot().unwrap();
        assert_eq!(s.speed, 30);
        assert_eq!(s.following_enabled, true);
        assert_eq!(s.detecting_enabled, true);
    }

    #[test]
    fn test_resume_during_controlling_maneuver() {
        let (v, _) = vehicle();

        // Paused and resumed inside a stop hold: the car stays stopped until the maneuver
        // restores the speed itself
        let guard = v.begin_maneuver("stop", true).unwrap();
        assert!(guard.set_speed(0).unwrap());
        v.pause().unwrap();
        v.resume().unwrap();

        let s = v.snapshot().unwrap();
        assert_eq!(s.speed, 0);
        assert_eq!(s.following_enabled, false);

        assert!(guard.restore_speed().unwrap());
        drop(guard);
        let s = v.snapshot().unwrap();
        assert_eq!(s.speed, 30);
        assert_eq!(s.following_enabled, true);
    }

    #[test]
    fn test_resume_restores_pre_pause_speed() {
        let (v, _) = vehicle();

        let guard = v.begin_maneuver("yield", false).unwrap();
        assert!(guard.set_speed(20).unwrap());
        v.pause().unwrap();
        v.resume().unwrap();
        assert_eq!(v.snapshot().unwrap().speed, 20);
        drop(guard);

        // A speed demand made while paused is applied on resume
        let guard = v.begin_maneuver("speed_limit", false).unwrap();
        v.pause().unwrap();
        assert_eq!(guard.set_speed(60).unwrap(), false);
        drop(guard);
        assert_eq!(v.snapshot().unwrap().speed, 0);

        v.resume().unwrap();
        assert_eq!(v.snapshot().unwrap().speed, 60);
    }

    #[test]
    fn test_no_maneuver_while_paused_or_shut_down() {
        let (v, _) = vehicle();

        v.pause().unwrap();
        assert_eq!(v.begin_maneuver("stop", true).err(), Some(VehicleError::Paused));

        v.shutdown();
        assert_eq!(v.begin_maneuver("stop", true).err(), Some(VehicleError::ShutDown));
        assert_eq!(v.resume(), Err(VehicleError::ShutDown));
    }

    #[test]
    fn test_shutdown_neutralises() {
        let (v, mech) = vehicle();

        v.apply_lane_steering(|_| 120).unwrap();
        v.shutdown();

        let s = v.snapshot().unwrap();
        assert_eq!(s.running, false);
        assert_eq!(s.speed, 0);
        assert_eq!(s.steering_angle_deg, 90);
        assert_eq!(mech.last_speed(), Some(0));
        assert_eq!(mech.last_turn(), Some(90));
        assert_eq!(mech.indicators(), [IndicatorColor::OFF; NUM_INDICATOR_CELLS]);

        // No more lane steering after shutdown
        assert_eq!(v.apply_lane_steering(|_| 100).unwrap().actuated, false);
        assert_eq!(v.wait_for_detecting(Duration::from_millis(1)).unwrap(), false);
    }

    #[test]
    fn test_task_panic_shuts_down() {
        let (v, mech) = vehicle();
        let v = Arc::new(v);

        let task = {
            let v = v.clone();
            thread::spawn(move || {
                let _exit = ShutdownOnExit::new(v.clone(), "test");
                v.apply_lane_steering(|_| 100).unwrap();
                panic!("task failure");
            })
        };

        assert!(task.join().is_err());
        assert_eq!(v.is_running(), Ok(false));
        assert_eq!(mech.last_speed(), Some(0));
        assert_eq!(mech.last_turn(), Some(90));
    }

    #[test]
    fn test_wait_for_detecting_wakes_on_resume() {
        let (v, _) = vehicle();
        let v = Arc::new(v);
        v.pause().unwrap();
        assert_eq!(v.wait_for_detecting(Duration::from_millis(1)).unwrap(), false);

        let waiter = {
            let v = v.clone();
            std::thread::spawn(move || v.wait_for_detecting(Duration::from_secs(10)))
        };
        v.resume().unwrap();

        assert_eq!(waiter.join().unwrap(), Ok(true));
    }
}
