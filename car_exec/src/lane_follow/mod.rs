//! # Lane following task
//!
//! Runs once per camera frame: infer a steering angle for the frame, stabilise it against the
//! current angle and, if lane following is enabled, drive the front wheels with it. Every frame
//! acquired is published for the sign detection task.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod overlay;
mod stabilise;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::sync::Arc;

use car_if::{
    eqpt::cam::{CamError, Frame, FrameSource},
    model::{InferenceError, SteeringModel},
};
use image::RgbImage;
use log::{debug, info, trace, warn};
use util::session::{self, SaveData};

use crate::frame_slot::FrameSlot;
use crate::params::LaneParams;
use crate::vehicle::{LaneSteer, Vehicle, VehicleError};

pub use overlay::draw_heading_line;
pub use stabilise::{round_proposal, stabilise};

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Destination of the annotated frames.
pub trait FrameSink {
    fn show(&mut self, seq: u64, image: RgbImage);
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

pub struct LaneFollower {
    model: Box<dyn SteeringModel + Send>,
    vehicle: Arc<Vehicle>,
    params: LaneParams,
}

/// Result of following the lane for one frame.
#[derive(Debug, Clone)]
pub struct LaneOutput {
    /// The model's proposal rounded to the nearest degree.
    pub proposed_deg: i32,

    pub steer: LaneSteer,

    /// The frame with the heading line drawn over it.
    pub annotated: RgbImage,
}

/// Saves every n-th annotated frame into the session.
pub struct SessionFrameSink {
    every_n: u64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum LaneFollowError {
    #[error("Steering inference failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("Vehicle error: {0}")]
    Vehicle(#[from] VehicleError),

    #[error("Camera error: {0}")]
    Cam(#[from] CamError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl LaneFollower {
    pub fn new(
        model: Box<dyn SteeringModel + Send>, 
        vehicle: Arc<Vehicle>, 
        params: LaneParams
    ) -> Self {
        Self {
            model,
            vehicle,
            params
        }
    }

    /// Follow the lane until the camera runs out of frames or the vehicle shuts down.
    ///
    /// Frames the model fails on are skipped, leaving the steering unchanged. Malformed frames
    /// are skipped too. Any other camera failure is returned.
    pub fn run(
        &mut self, 
        cam: &mut dyn FrameSource, 
        slot: &FrameSlot, 
        sink: &mut dyn FrameSink
    ) -> Result<(), LaneFollowError> {
        info!("Lane following started");

        loop {
            if !self.vehicle.is_running()? {
                info!("Vehicle stopped, lane following ends");
                break
            }

            let frame = match cam.next_frame() {
                Ok(f) => f,
                Err(CamError::EndOfStream) => {
                    info!("End of camera stream, lane following ends");
                    break
                },
                Err(e) if e.is_transient() => {
                    warn!("Frame skipped: {}", e);
                    continue
                },
                Err(e) => return Err(e.into())
            };

            let frame = slot.publish(frame);

            match self.follow_lane(&frame) {
                Ok(out) => sink.show(frame.seq, out.annotated),
                Err(LaneFollowError::Inference(e)) => {
                    warn!("Frame {} skipped, steering unchanged: {}", frame.seq, e)
                },
                Err(e) => return Err(e)
            }
        }

        Ok(())
    }

    /// Follow the lane for a single frame.
    pub fn follow_lane(&mut self, frame: &Frame) -> Result<LaneOutput, LaneFollowError> {
        let raw_deg = self.model.infer_steering(frame)?;
        if !raw_deg.is_finite() {
            return Err(InferenceError::MalformedOutput(
                format!("steering angle {}", raw_deg)
            ).into())
        }

        let proposed_deg = round_proposal(raw_deg);
        let target_deg = self.params.clamp_angle(proposed_deg);

        let params = &self.params;
        let steer = self.vehicle.apply_lane_steering(|previous_deg| {
            params.clamp_angle(stabilise(previous_deg, target_deg, params.max_angle_deviation_deg))
        })?;

        if steer.actuated {
            debug!("Frame {}: steering {} deg", frame.seq, steer.stabilised_deg);
        }
        else {
            trace!(
                "Frame {}: following suspended, {} deg not actuated", 
                frame.seq, steer.stabilised_deg
            );
        }

        // Show where the wheels actually point
        let shown_deg = if steer.actuated { steer.stabilised_deg } else { steer.previous_deg };
        let annotated = draw_heading_line(&frame.image, shown_deg, params.heading_line_width_px);

        Ok(LaneOutput {
            proposed_deg,
            steer,
            annotated
        })
    }
}

impl SessionFrameSink {
    /// Save every `every_n`-th frame, 0 saves nothing.
    pub fn new(every_n: u64) -> Self {
        Self {
            every_n
        }
    }
}

impl FrameSink for SessionFrameSink {
    fn show(&mut self, seq: u64, image: RgbImage) {
        if self.every_n > 0 && seq % self.every_n == 0 {
            session::save(format!("frames/frame_{:06}.png", seq), SaveData::Image(image));
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::mock::{test_frame, ActEvent, BlankCamera, RecordingMech, ScriptedSteering};

    #[derive(Default)]
    struct CollectSink(Vec<u64>);

    impl FrameSink for CollectSink {
        fn show(&mut self, seq: u64, _image: RgbImage) {
            self.0.push(seq)
        }
    }

    struct BrokenCamera(u64);

    impl FrameSource for BrokenCamera {
        fn next_frame(&mut self) -> Result<Frame, CamError> {
            self.0 += 1;
            match self.0 {
                1 => Err(CamError::MalformedFrame(0, "truncated".into())),
                2 => Ok(test_frame(1)),
                _ => Err(CamError::Unavailable("unplugged".into()))
            }
        }
    }

    fn follower(
        results: Vec<Result<f64, InferenceError>>, 
        params: LaneParams
    ) -> (LaneFollower, Arc<Vehicle>, RecordingMech) {
        let mech = RecordingMech::new(true);
        let vehicle = Arc::new(Vehicle::new(Box::new(mech.clone()), 90));
        vehicle.start(30).unwrap();
        mech.clear();

        let f = LaneFollower::new(Box::new(ScriptedSteering::new(results)), vehicle.clone(), params);
        (f, vehicle, mech)
    }

    #[test]
    fn test_follow_lane_stabilises() {
        let (mut f, v, mech) = follower(vec![Ok(119.6), Ok(91.2)], LaneParams::default());

        let out = f.follow_lane(&test_frame(0)).unwrap();
        assert_eq!(out.proposed_deg, 120);
        assert_eq!(out.steer, LaneSteer { previous_deg: 90, stabilised_deg: 93, actuated: true });
        assert_eq!(out.annotated.dimensions(), (32, 24));

        let out = f.follow_lane(&test_frame(1)).unwrap();
        assert_eq!(out.steer.stabilised_deg, 91);

        assert_eq!(v.snapshot().unwrap().steering_angle_deg, 91);
        assert_eq!(mech.turns(), vec![93, 91]);
    }

    #[test]
    fn test_steering_stays_in_domain() {
        let params = LaneParams {
            min_steering_angle_deg: 89,
            ..LaneParams::default()
        };
        let (mut f, _, mech) = follower(vec![Ok(60.0)], params);

        assert_eq!(f.follow_lane(&test_frame(0)).unwrap().steer.stabilised_deg, 89);
        assert_eq!(mech.turns(), vec![89]);
    }

    #[test]
    fn test_extreme_proposals_steer_towards_their_side() {
        let (mut f, v, mech) = follower(
            vec![Ok(-1.0e12), Ok(1.0e12), Ok(1.0e12)], 
            LaneParams::default()
        );

        let out = f.follow_lane(&test_frame(0)).unwrap();
        assert_eq!(out.steer, LaneSteer { previous_deg: 90, stabilised_deg: 87, actuated: true });

        f.follow_lane(&test_frame(1)).unwrap();
        f.follow_lane(&test_frame(2)).unwrap();
        assert_eq!(mech.turns(), vec![87, 90, 93]);
        assert_eq!(v.snapshot().unwrap().steering_angle_deg, 93);
    }

    #[test]
    fn test_no_writes_while_maneuver_has_control() {
        let (mut f, v, mech) = follower(vec![Ok(100.0)], LaneParams::default());

        let guard = v.begin_maneuver("straight", true).unwrap();
        let out = f.follow_lane(&test_frame(0)).unwrap();
        assert_eq!(out.steer.actuated, false);
        assert!(mech.events().is_empty());

        drop(guard);
        assert!(f.follow_lane(&test_frame(1)).unwrap().steer.actuated);
        assert_eq!(mech.events(), vec![ActEvent::Turn(93)]);
    }

    #[test]
    fn test_inference_failures_skip_frames() {
        let (mut f, v, mech) = follower(vec![
            Ok(95.0), 
            Err(InferenceError::Backend("busy".into())), 
            Ok(std::f64::NAN),
            Ok(100.0)
        ], LaneParams::default());

        let mut cam = BlankCamera::new(4);
        let slot = FrameSlot::new();
        let mut sink = CollectSink::default();

        f.run(&mut cam, &slot, &mut sink).unwrap();

        assert_eq!(mech.turns(), vec![93, 96]);
        assert_eq!(sink.0, vec![0, 3]);
        assert_eq!(slot.latest().map(|f| f.seq), Some(3));
        assert_eq!(v.snapshot().unwrap().steering_angle_deg, 96);
    }

    #[test]
    fn test_camera_failures() {
        let (mut f, _, mech) = follower(vec![Ok(90.0)], LaneParams::default());
        let slot = FrameSlot::new();
        let mut sink = CollectSink::default();

        let res = f.run(&mut BrokenCamera(0), &slot, &mut sink);

        assert!(matches!(res, Err(LaneFollowError::Cam(CamError::Unavailable(_)))));
        assert_eq!(sink.0, vec![1]);
        assert_eq!(mech.turns(), vec![90]);
    }

    #[test]
    fn test_run_stops_on_shutdown() {
        let (mut f, v, mech) = follower(vec![Ok(90.0)], LaneParams::default());
        v.shutdown();
        mech.clear();

        let mut sink = CollectSink::default();
        f.run(&mut BlankCamera::new(10), &FrameSlot::new(), &mut sink).unwrap();
        assert!(sink.0.is_empty());
        assert!(mech.events().is_empty());
    }
}
