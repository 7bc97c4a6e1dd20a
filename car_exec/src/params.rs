//! Parameters structure for the car executable

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::time::Duration;

use serde::Deserialize;
use util::time::secs_to_duration;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the whole car executable.
///
/// Every field has a default so a parameter file only needs to list what it changes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CarParams {
    /// Speed the car drives at when a session starts, and the speed restored by a resume when
    /// nothing else is known.
    pub cruise_speed: u32,

    /// Width of the camera frames.
    ///
    /// Units: pixels
    pub camera_width_px: u32,

    /// Height of the camera frames.
    ///
    /// Units: pixels
    pub camera_height_px: u32,

    /// Rate at which replayed frames are delivered, 0 delivers them as fast as they're read.
    ///
    /// Units: hertz
    pub camera_frame_rate_hz: f64,

    /// Path to the labelmap, relative to the params directory.
    pub labelmap_path: String,

    pub lane: LaneParams,

    pub detect: DetectParams,

    pub mnvr: MnvrParams,
}

/// Parameters for lane following.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LaneParams {
    /// Maximum change in steering angle between two frames.
    ///
    /// Units: degrees
    pub max_angle_deviation_deg: i32,

    /// Lowest steering angle the wheels can be turned to (full left).
    ///
    /// Units: degrees
    pub min_steering_angle_deg: i32,

    /// Highest steering angle the wheels can be turned to (full right).
    ///
    /// Units: degrees
    pub max_steering_angle_deg: i32,

    /// Steering angle for driving straight ahead.
    ///
    /// Units: degrees
    pub straight_angle_deg: i32,

    /// Width of the heading line drawn on annotated frames.
    ///
    /// Units: pixels
    pub heading_line_width_px: u32,

    /// Save every n-th annotated frame into the session, 0 disables saving.
    pub save_every_n_frames: u64,
}

/// Parameters for sign detection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectParams {
    /// Time between two detection cycles.
    ///
    /// Units: seconds
    pub period_s: f64,

    /// Detections must score strictly above this to be considered.
    pub score_threshold: f32,

    /// A detection is acted on only if its proximity measure is strictly above this.
    ///
    /// The reference behaviour uses 0, accepting any non-degenerate box.
    pub proximity_threshold: f32,

    /// Scale applied to the normalised box height before dividing by the reference height.
    pub proximity_scale: f32,

    /// Reference frame height the proximity measure is expressed against.
    ///
    /// Units: pixels
    pub proximity_reference_height_px: f32,
}

/// Parameters for the maneuvers executed in response to signals.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MnvrParams {
    /// Units: seconds
    pub stop_hold_s: f64,

    /// Speeds posted on the two speed limit signs.
    pub speed_limit_low: u32,
    pub speed_limit_high: u32,

    pub yield_speed: u32,
    /// Units: seconds
    pub yield_hold_s: f64,
    pub yield_exit_speed: u32,

    pub roadwork_speed: u32,
    /// Units: seconds
    pub roadwork_hold_s: f64,
    pub roadwork_exit_speed: u32,

    /// Units: seconds
    pub red_hold_s: f64,
    pub green_speed: u32,

    /// Time taken to cover the reference distance at `ref_speed`. Straight and turn maneuvers
    /// last as long as it takes to cover this distance at the current speed.
    ///
    /// Units: seconds
    pub ref_time_s: f64,

    /// Speed at which the reference distance is covered in `ref_time_s`.
    pub ref_speed: u32,

    /// How long the indicators blink when a turn is signalled while stationary.
    ///
    /// Units: seconds
    pub stationary_blink_s: f64,

    /// Steering angles swept through at the start of a left turn.
    ///
    /// Units: degrees
    pub left_sweep_deg: Vec<i32>,

    /// Steering angles swept through at the start of a right turn.
    ///
    /// Units: degrees
    pub right_sweep_deg: Vec<i32>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for CarParams {
    fn default() -> Self {
        Self {
            cruise_speed: 30,
            camera_width_px: 320,
            camera_height_px: 240,
            camera_frame_rate_hz: 10.0,
            labelmap_path: "labelmap.txt".into(),
            lane: LaneParams::default(),
            detect: DetectParams::default(),
            mnvr: MnvrParams::default(),
        }
    }
}

impl Default for LaneParams {
    fn default() -> Self {
        Self {
            max_angle_deviation_deg: 3,
            min_steering_angle_deg: 40,
            max_steering_angle_deg: 140,
            straight_angle_deg: 90,
            heading_line_width_px: 5,
            save_every_n_frames: 0,
        }
    }
}

impl Default for DetectParams {
    fn default() -> Self {
        Self {
            period_s: 2.0,
            score_threshold: 0.6,
            proximity_threshold: 0.0,
            proximity_scale: 100.0,
            proximity_reference_height_px: 320.0,
        }
    }
}

impl Default for MnvrParams {
    fn default() -> Self {
        Self {
            stop_hold_s: 3.0,
            speed_limit_low: 30,
            speed_limit_high: 60,
            yield_speed: 20,
            yield_hold_s: 3.0,
            yield_exit_speed: 30,
            roadwork_speed: 10,
            roadwork_hold_s: 5.0,
            roadwork_exit_speed: 20,
            red_hold_s: 3.0,
            green_speed: 20,
            ref_time_s: 10.0,
            ref_speed: 20,
            stationary_blink_s: 5.0,
            left_sweep_deg: vec![80, 70, 60, 50, 45],
            right_sweep_deg: vec![100, 110, 120, 130, 135],
        }
    }
}

impl DetectParams {
    pub fn period(&self) -> Duration {
        secs_to_duration(self.period_s)
    }
}

impl LaneParams {
    /// Clamp an angle into the steering domain.
    pub fn clamp_angle(&self, angle_deg: i32) -> i32 {
        angle_deg
            .max(self.min_steering_angle_deg)
            .min(self.max_steering_angle_deg)
    }
}
