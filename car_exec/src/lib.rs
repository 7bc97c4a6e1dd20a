//! # Car library.
//!
//! The control core of the car, shared by the executable and its tests.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Time sources - wall clock and simulated time for the timed parts of the core
pub mod clock;

/// Frame slot - hands the latest camera frame from lane following to sign detection
pub mod frame_slot;

/// Lane following task - steers the car along the lane every frame
pub mod lane_follow;

/// Logging actuator - logs demands in place of the hardware drivers
pub mod mech;

/// Parameters for the car executable
pub mod params;

/// Replay collaborators - camera and models backed by a recorded drive
pub mod replay;

/// Sign detection task - detects signs and lights and triggers the matching maneuver
pub mod sign_detect;

/// Signals and the maneuvers they trigger
pub mod signals;

/// Operator commands - pause, resume and quit from the keyboard or a script
pub mod user_cmd;

/// Vehicle state - the shared commanded state of the car and its arbitration
pub mod vehicle;

#[cfg(test)]
mod mock;
