//! Test doubles for the car's collaborators

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use car_if::{
    eqpt::{
        act::{Actuator, ActuatorError, IndicatorColor, NUM_INDICATOR_CELLS},
        cam::{CamError, Frame, FrameSource},
    },
    model::{DetectionModel, InferenceError, RawDetections, SteeringModel},
};
use image::RgbImage;

/// A demand received by the [`RecordingMech`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActEvent {
    Turn(i32),
    Speed(u32),
    Indicator(usize, IndicatorColor),
}

/// Actuator recording every demand it receives. Clones share the same record.
#[derive(Debug, Clone)]
pub struct RecordingMech {
    events: Arc<Mutex<Vec<ActEvent>>>,
    cells: Arc<Mutex<[IndicatorColor; NUM_INDICATOR_CELLS]>>,
    indicators_fitted: bool,
}

impl RecordingMech {
    pub fn new(indicators_fitted: bool) -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            cells: Arc::new(Mutex::new([IndicatorColor::OFF; NUM_INDICATOR_CELLS])),
            indicators_fitted,
        }
    }

    pub fn events(&self) -> Vec<ActEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear()
    }

    pub fn turns(&self) -> Vec<i32> {
        self.events().iter().filter_map(|e| match e {
            ActEvent::Turn(a) => Some(*a),
            _ => None
        }).collect()
    }

    pub fn speeds(&self) -> Vec<u32> {
        self.events().iter().filter_map(|e| match e {
            ActEvent::Speed(s) => Some(*s),
            _ => None
        }).collect()
    }

    pub fn last_turn(&self) -> Option<i32> {
        self.turns().last().copied()
    }

    pub fn last_speed(&self) -> Option<u32> {
        self.speeds().last().copied()
    }

    pub fn indicators(&self) -> [IndicatorColor; NUM_INDICATOR_CELLS] {
        *self.cells.lock().unwrap()
    }

    pub fn num_indicator_writes(&self) -> usize {
        self.events().iter().filter(|e| matches!(e, ActEvent::Indicator(..))).count()
    }
}

impl Actuator for RecordingMech {
    fn turn_front_wheels(&mut self, angle_deg: i32) {
        self.events.lock().unwrap().push(ActEvent::Turn(angle_deg))
    }

    fn set_speed(&mut self, speed: u32) {
        self.events.lock().unwrap().push(ActEvent::Speed(speed))
    }

    fn set_indicator(&mut self, cell: usize, color: IndicatorColor) -> Result<(), ActuatorError> {
        if !self.indicators_fitted {
            return Err(ActuatorError::IndicatorUnavailable)
        }
        if cell >= NUM_INDICATOR_CELLS {
            return Err(ActuatorError::InvalidCell(cell))
        }
        self.cells.lock().unwrap()[cell] = color;
        self.events.lock().unwrap().push(ActEvent::Indicator(cell, color));
        Ok(())
    }
}

/// Steering model returning scripted results, then repeating the last one.
pub struct ScriptedSteering {
    results: VecDeque<Result<f64, InferenceError>>,
    last: f64,
}

impl ScriptedSteering {
    pub fn new(results: Vec<Result<f64, InferenceError>>) -> Self {
        Self {
            results: results.into(),
            last: 90.0
        }
    }
}

impl SteeringModel for ScriptedSteering {
    fn infer_steering(&mut self, _frame: &Frame) -> Result<f64, InferenceError> {
        match self.results.pop_front() {
            Some(Ok(a)) => {
                self.last = a;
                Ok(a)
            },
            Some(Err(e)) => Err(e),
            None => Ok(self.last)
        }
    }
}

/// Detection model returning scripted results, then nothing.
pub struct ScriptedDetector {
    results: VecDeque<Result<RawDetections, InferenceError>>,
}

impl ScriptedDetector {
    pub fn new(results: Vec<Result<RawDetections, InferenceError>>) -> Self {
        Self {
            results: results.into()
        }
    }
}

impl DetectionModel for ScriptedDetector {
    fn infer_detections(&mut self, _frame: &Frame) -> Result<RawDetections, InferenceError> {
        self.results.pop_front().unwrap_or_else(|| Ok(RawDetections::default()))
    }
}

/// Camera producing a fixed number of blank frames.
pub struct BlankCamera {
    next_seq: u64,
    num_frames: u64,
}

impl BlankCamera {
    pub fn new(num_frames: u64) -> Self {
        Self {
            next_seq: 0,
            num_frames
        }
    }
}

impl FrameSource for BlankCamera {
    fn next_frame(&mut self) -> Result<Frame, CamError> {
        if self.next_seq >= self.num_frames {
            return Err(CamError::EndOfStream)
        }
        let frame = test_frame(self.next_seq);
        self.next_seq += 1;
        Ok(frame)
    }
}

/// A small blank frame.
pub fn test_frame(seq: u64) -> Frame {
    Frame::new(seq, RgbImage::new(32, 24))
}
