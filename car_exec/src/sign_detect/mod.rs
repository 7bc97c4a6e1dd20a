//! # Sign detection task
//!
//! Runs on its own cadence, independent of the camera rate. Each cycle takes the latest frame,
//! runs the detection model over it, and if the first detection scoring above the threshold is a
//! known signal close enough to the car, executes the matching maneuver. The task is blocked for
//! as long as the maneuver runs, so no other maneuver can start before it completes.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod labelmap;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::sync::Arc;
use std::time::Duration;

use car_if::model::{BoundingBox, DetectionModel, InferenceError, RawDetections};
use log::{debug, info, trace, warn};

use crate::clock::Clock;
use crate::frame_slot::FrameSlot;
use crate::params::{CarParams, DetectParams};
use crate::signals::{ManeuverRecord, ManeuverRunner, Signal};
use crate::vehicle::{Vehicle, VehicleError};

pub use labelmap::{LabelMap, LabelMapError};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Longest time the idle task waits before checking whether the vehicle is still running.
const IDLE_POLL: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A detection which passed the score threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub label: String,
    pub score: f32,
    pub bbox: BoundingBox,
    pub class_id: usize,
}

pub struct SignDetector {
    model: Box<dyn DetectionModel + Send>,
    labels: LabelMap,
    params: CarParams,
    vehicle: Arc<Vehicle>,
    frames: Arc<FrameSlot>,
    runner: ManeuverRunner,
    clock: Arc<dyn Clock>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// What a single detection cycle did.
#[derive(Debug)]
pub enum CycleOutcome {
    /// Detection is disabled or the vehicle has shut down.
    Idle,

    /// No frame has been published yet.
    NoFrame,

    /// Nothing scored above the threshold.
    NoDetection,

    /// The first detection is of a class with no signal.
    UnknownClass(usize),

    /// The signal was detected but is too far away to act on.
    TooFar(Signal),

    /// The signal does not apply in the current state.
    NotApplicable(Signal),

    Executed(ManeuverRecord),

    /// The vehicle refused the maneuver, for instance because of a pause.
    Rejected(Signal, VehicleError),
}

#[derive(Debug, thiserror::Error)]
pub enum SignDetectError {
    #[error("Detection inference failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("Vehicle error: {0}")]
    Vehicle(#[from] VehicleError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SignDetector {
    pub fn new(
        model: Box<dyn DetectionModel + Send>,
        labels: LabelMap,
        params: CarParams,
        vehicle: Arc<Vehicle>,
        frames: Arc<FrameSlot>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            model,
            labels,
            params,
            runner: ManeuverRunner::new(vehicle.clone(), clock.clone()),
            vehicle,
            frames,
            clock,
        }
    }

    /// Run detection cycles until the vehicle shuts down.
    ///
    /// Inference failures skip the cycle. Only a failure of the vehicle itself ends the task
    /// with an error.
    pub fn run(&mut self) -> Result<(), SignDetectError> {
        let period = self.params.detect.period();
        info!("Sign detection started, period {:.2} s", period.as_secs_f64());

        loop {
            if !self.vehicle.is_running()? {
                break
            }

            // Idle until detection is (re-)enabled
            if !self.vehicle.wait_for_detecting(IDLE_POLL)? {
                continue
            }

            match self.cycle() {
                Ok(CycleOutcome::Executed(r)) => info!(
                    "Maneuver {} executed in {:.2} s", r.name, r.end_s - r.start_s
                ),
                Ok(o) => trace!("Detection cycle: {:?}", o),
                Err(SignDetectError::Inference(e)) => warn!(
                    "Detection cycle skipped: {}", e
                ),
                Err(e) => return Err(e)
            }

            self.clock.sleep(period);
        }

        info!("Sign detection stopped");
        Ok(())
    }

    /// Execute a single detection cycle.
    pub fn cycle(&mut self) -> Result<CycleOutcome, SignDetectError> {
        let state = self.vehicle.snapshot()?;
        if !state.running || !state.detecting_enabled {
            return Ok(CycleOutcome::Idle)
        }

        let frame = match self.frames.latest() {
            Some(f) => f,
            None => return Ok(CycleOutcome::NoFrame)
        };

        let raw = self.model.infer_detections(&frame)?;
        let detections = filter_detections(&raw, &self.labels, self.params.detect.score_threshold)?;

        // The first survivor is used, whatever the scores of the others
        let first = match detections.first() {
            Some(d) => d,
            None => return Ok(CycleOutcome::NoDetection)
        };
        debug!(
            "Frame {}: detected {} (class {}, score {:.2})", 
            frame.seq, first.label, first.class_id, first.score
        );

        let signal = match Signal::from_class_id(first.class_id, &self.params.mnvr) {
            Some(s) => s,
            None => {
                warn!("No signal for detected class {}, ignored", first.class_id);
                return Ok(CycleOutcome::UnknownClass(first.class_id))
            }
        };

        if !is_near(&first.bbox, &self.params.detect) {
            debug!(
                "{} detected but too far away (proximity {:.3})", 
                signal.name(), 
                proximity(&first.bbox, &self.params.detect)
            );
            return Ok(CycleOutcome::TooFar(signal))
        }

        // Inference takes time, plan on the state as it is now
        let state = self.vehicle.snapshot()?;
        if !state.running || !state.detecting_enabled {
            return Ok(CycleOutcome::Idle)
        }

        let mnvr = match signal.plan(&state, &self.params) {
            Some(m) => m,
            None => {
                debug!("{} does not apply at speed {}", signal.name(), state.speed);
                return Ok(CycleOutcome::NotApplicable(signal))
            }
        };

        match self.runner.run(&mnvr) {
            Ok(r) => Ok(CycleOutcome::Executed(r)),
            Err(VehicleError::LockPoisoned) => Err(VehicleError::LockPoisoned.into()),
            Err(e) => {
                info!("{} maneuver not started: {}", signal.name(), e);
                Ok(CycleOutcome::Rejected(signal, e))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Keep the detections scoring strictly above `threshold`, in their original order.
pub fn filter_detections(
    raw: &RawDetections, 
    labels: &LabelMap, 
    threshold: f32
) -> Result<Vec<Detection>, InferenceError> {
    let n = raw.len()?;
    let mut detections = Vec::new();

    for i in 0..n {
        let score = raw.scores[i];
        if !(score > threshold) {
            continue
        }

        let class_id = class_id(raw.classes[i])?;
        let label = match labels.label(class_id) {
            Some(l) => l.to_string(),
            None => format!("class_{}", class_id)
        };

        detections.push(Detection {
            label,
            score,
            bbox: raw.boxes[i],
            class_id
        });
    }

    Ok(detections)
}

/// Apparent size of a detection, as its vertical extent scaled against the reference height.
pub fn proximity(bbox: &BoundingBox, params: &DetectParams) -> f32 {
    bbox.height() * params.proximity_scale / params.proximity_reference_height_px
}

/// True if the detection is close enough to be acted on.
pub fn is_near(bbox: &BoundingBox, params: &DetectParams) -> bool {
    proximity(bbox, params) > params.proximity_threshold
}

/// The model reports class ids as floats.
fn class_id(raw: f32) -> Result<usize, InferenceError> {
    if !raw.is_finite() || raw < 0.0 {
        return Err(InferenceError::MalformedOutput(format!("invalid class id {}", raw)))
    }

    Ok(raw as usize)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Mutex;

    use car_if::eqpt::cam::Frame;

    use crate::clock::SimClock;
    use crate::mock::{test_frame, ActEvent, RecordingMech, ScriptedDetector};

    const LABELS: &str = "Stop\nVel30\nVel60\nCeda\nLuces\nObras\nRecto\nIzquierda\nDerecha\n\
                          Verde\nRojo\n";

    fn bbox(ymin: f32, ymax: f32) -> BoundingBox {
        BoundingBox { ymin, xmin: 0.4, ymax, xmax: 0.6 }
    }

    fn raw(dets: &[(f32, f32, BoundingBox)]) -> RawDetections {
        RawDetections {
            scores: dets.iter().map(|d| d.0).collect(),
            classes: dets.iter().map(|d| d.1).collect(),
            boxes: dets.iter().map(|d| d.2).collect(),
        }
    }

    struct Rig {
        det: SignDetector,
        vehicle: Arc<Vehicle>,
        mech: RecordingMech,
        clock: Arc<SimClock>,
    }

    /// Model which starts the car moving while it runs.
    struct StartsCar {
        vehicle: Arc<Vehicle>,
        detections: RawDetections,
    }

    impl DetectionModel for StartsCar {
        fn infer_detections(&mut self, _frame: &Frame) -> Result<RawDetections, InferenceError> {
            self.vehicle.start(30).unwrap();
            Ok(self.detections.clone())
        }
    }

    fn detector(
        model: Box<dyn DetectionModel + Send>, 
        vehicle: &Arc<Vehicle>, 
        clock: &Arc<SimClock>
    ) -> SignDetector {
        let frames = Arc::new(FrameSlot::new());
        frames.publish(test_frame(0));

        SignDetector::new(
            model,
            LabelMap::from_str(LABELS).unwrap(),
            CarParams::default(),
            vehicle.clone(),
            frames,
            clock.clone(),
        )
    }

    fn rig(results: Vec<Result<RawDetections, InferenceError>>) -> Rig {
        let mech = RecordingMech::new(true);
        let vehicle = Arc::new(Vehicle::new(Box::new(mech.clone()), 90));
        vehicle.start(30).unwrap();
        mech.clear();

        let clock = Arc::new(SimClock::new());
        let det = detector(Box::new(ScriptedDetector::new(results)), &vehicle, &clock);

        Rig { det, vehicle, mech, clock }
    }

    #[test]
    fn test_first_survivor_selected() {
        let labels = LabelMap::from_str(LABELS).unwrap();
        let r = raw(&[
            (0.5, 0.0, bbox(0.1, 0.2)), 
            (0.7, 3.0, bbox(0.1, 0.3)), 
            (0.9, 1.0, bbox(0.1, 0.4))
        ]);

        let dets = filter_detections(&r, &labels, 0.6).unwrap();
        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].label, "Ceda");
        assert_eq!(dets[0].class_id, 3);
        assert_eq!(dets[1].class_id, 1);

        // Equal to the threshold is not above it
        let r = raw(&[(0.6, 0.0, bbox(0.1, 0.2))]);
        assert!(filter_detections(&r, &labels, 0.6).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_detections() {
        let labels = LabelMap::from_str(LABELS).unwrap();

        let r = raw(&[(0.9, -1.0, bbox(0.1, 0.2))]);
        assert!(matches!(
            filter_detections(&r, &labels, 0.6), 
            Err(InferenceError::MalformedOutput(_))
        ));

        // Filtered out detections aren't inspected
        let r = raw(&[(0.1, std::f32::NAN, bbox(0.1, 0.2))]);
        assert!(filter_detections(&r, &labels, 0.6).unwrap().is_empty());

        let mut r = raw(&[(0.9, 0.0, bbox(0.1, 0.2))]);
        r.classes.clear();
        assert!(filter_detections(&r, &labels, 0.6).is_err());
    }

    #[test]
    fn test_proximity() {
        let mut p = DetectParams::default();
        assert!(is_near(&bbox(0.1, 0.2), &p));
        assert!(!is_near(&bbox(0.2, 0.2), &p));
        assert!(!is_near(&bbox(0.3, 0.2), &p));

        // 0.32 of the frame height is 0.1 with the reference scaling
        assert!((proximity(&bbox(0.18, 0.5), &p) - 0.1).abs() < 1e-6);
        p.proximity_threshold = 0.1;
        assert!(!is_near(&bbox(0.2, 0.5), &p));
        assert!(is_near(&bbox(0.1, 0.5), &p));
    }

    #[test]
    fn test_stop_sign_end_to_end() {
        let mut r = rig(vec![Ok(raw(&[(0.9, 0.0, bbox(0.2, 0.5))]))]);

        // Lane following keeps trying to steer during the maneuver
        let during = Arc::new(Mutex::new(Vec::new()));
        for at_ms in [500u64, 1500, 2500].iter() {
            let v = r.vehicle.clone();
            let during = during.clone();
            r.clock.schedule_at(Duration::from_millis(*at_ms), move || {
                let steer = v.apply_lane_steering(|prev| prev + 3).unwrap();
                let s = v.snapshot().unwrap();
                during.lock().unwrap().push((s.speed, s.following_enabled, steer.actuated));
            });
        }

        let outcome = r.det.cycle().unwrap();
        assert!(matches!(outcome, CycleOutcome::Executed(ref rec) if rec.name == "stop"));

        assert_eq!(*during.lock().unwrap(), vec![(0, false, false); 3]);
        assert_eq!(r.clock.now(), Duration::from_secs(3));

        let s = r.vehicle.snapshot().unwrap();
        assert_eq!(s.speed, 30);
        assert_eq!(s.following_enabled, true);
        assert_eq!(s.steering_angle_deg, 90);
        assert_eq!(r.mech.events(), vec![ActEvent::Speed(0), ActEvent::Speed(30)]);
    }

    #[test]
    fn test_cycle_outcomes() {
        let mut r = rig(vec![
            Ok(raw(&[(0.9, 0.0, bbox(0.5, 0.5))])),
            Ok(raw(&[(0.9, 42.0, bbox(0.2, 0.5))])),
            Err(InferenceError::Backend("timeout".into())),
            Ok(raw(&[(0.3, 0.0, bbox(0.2, 0.5))])),
        ]);

        assert!(matches!(r.det.cycle().unwrap(), CycleOutcome::TooFar(Signal::Stop)));
        assert!(matches!(r.det.cycle().unwrap(), CycleOutcome::UnknownClass(42)));
        assert!(matches!(r.det.cycle(), Err(SignDetectError::Inference(_))));
        assert!(matches!(r.det.cycle().unwrap(), CycleOutcome::NoDetection));

        // Nothing reached the actuators
        assert!(r.mech.events().is_empty());

        r.vehicle.pause().unwrap();
        assert!(matches!(r.det.cycle().unwrap(), CycleOutcome::Idle));
    }

    #[test]
    fn test_stationary_car() {
        let mut r = rig(vec![
            Ok(raw(&[(0.9, 0.0, bbox(0.2, 0.5))])),
            Ok(raw(&[(0.9, 9.0, bbox(0.2, 0.5))])),
        ]);
        r.vehicle.start(0).unwrap();

        // A stop sign means nothing to a stationary car, a green light sets it off
        assert!(matches!(r.det.cycle().unwrap(), CycleOutcome::NotApplicable(Signal::Stop)));
        assert!(matches!(r.det.cycle().unwrap(), CycleOutcome::Executed(_)));
        assert_eq!(r.vehicle.snapshot().unwrap().speed, 20);
    }

    #[test]
    fn test_concurrent_cycle_cannot_start_second_maneuver() {
        let mut r = rig(vec![Ok(raw(&[(0.9, 0.0, bbox(0.2, 0.5))]))]);

        // A second detector sharing the car sees the lights sign during the stop hold
        let mut other = detector(
            Box::new(ScriptedDetector::new(vec![Ok(raw(&[(0.9, 4.0, bbox(0.2, 0.5))]))])),
            &r.vehicle,
            &r.clock
        );
        let outcome = Arc::new(Mutex::new(None));
        {
            let outcome = outcome.clone();
            r.clock.schedule_at(Duration::from_secs(1), move || {
                *outcome.lock().unwrap() = Some(other.cycle().unwrap());
            });
        }

        let first = r.det.cycle().unwrap();
        assert!(matches!(first, CycleOutcome::Executed(ref rec) if rec.name == "stop"));

        assert!(matches!(
            outcome.lock().unwrap().take(),
            Some(CycleOutcome::Rejected(Signal::Lights, VehicleError::ManeuverActive("stop")))
        ));
        assert_eq!(r.mech.events(), vec![ActEvent::Speed(0), ActEvent::Speed(30)]);
        assert_eq!(r.vehicle.snapshot().unwrap().lights_on, false);
    }

    #[test]
    fn test_plan_uses_state_after_inference() {
        let mech = RecordingMech::new(true);
        let vehicle = Arc::new(Vehicle::new(Box::new(mech.clone()), 90));
        let clock = Arc::new(SimClock::new());

        // Stationary when the cycle begins, moving by the time the stop sign is found
        let model = StartsCar {
            vehicle: vehicle.clone(),
            detections: raw(&[(0.9, 0.0, bbox(0.2, 0.5))]),
        };
        let mut det = detector(Box::new(model), &vehicle, &clock);

        let outcome = det.cycle().unwrap();
        assert!(matches!(outcome, CycleOutcome::Executed(ref rec) if rec.name == "stop"));
        assert_eq!(mech.speeds(), vec![0, 30, 0, 30]);
    }

    #[test]
    fn test_no_frame() {
        let mech = RecordingMech::new(true);
        let vehicle = Arc::new(Vehicle::new(Box::new(mech), 90));
        let mut det = SignDetector::new(
            Box::new(ScriptedDetector::new(vec![])),
            LabelMap::from_str(LABELS).unwrap(),
            CarParams::default(),
            vehicle,
            Arc::new(FrameSlot::new()),
            Arc::new(SimClock::new()),
        );

        assert!(matches!(det.cycle().unwrap(), CycleOutcome::NoFrame));
    }

    #[test]
    fn test_run_until_shutdown() {
        let mut r = rig(vec![Ok(raw(&[(0.9, 0.0, bbox(0.2, 0.5))]))]);
        {
            let v = r.vehicle.clone();
            r.clock.schedule_at(Duration::from_secs(7), move || v.shutdown());
        }

        r.det.run().unwrap();

        // Stop maneuver 0..3 s, then cycles at 5 s and 7 s
        assert_eq!(r.clock.now(), Duration::from_secs(7));
        assert_eq!(&r.mech.speeds()[..2], &[0, 30]);
        assert_eq!(r.mech.last_speed(), Some(0));
        assert_eq!(r.vehicle.is_running().unwrap(), false);
    }
}
