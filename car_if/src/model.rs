//! # Perception model interface
//!
//! The steering and sign detection models are black boxes to the control core: given a camera
//! frame they return a value. Any preprocessing (cropping, resizing, colour conversion) the
//! model needs is its own concern.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::eqpt::cam::Frame;

// -----------------------------------------------------------------------------------------------
// STRUCTS
// -----------------------------------------------------------------------------------------------

/// Bounding box of a detection in normalised image coordinates (0 at the top/left, 1 at the
/// bottom/right).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub ymin: f32,
    pub xmin: f32,
    pub ymax: f32,
    pub xmax: f32,
}

/// Raw output of the detection model, as parallel arrays.
///
/// Element `i` of each array describes the same detection. Class ids are reported as floats by
/// the model backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDetections {
    pub scores: Vec<f32>,
    pub classes: Vec<f32>,
    pub boxes: Vec<BoundingBox>,
}

// -----------------------------------------------------------------------------------------------
// TRAITS
// -----------------------------------------------------------------------------------------------

/// Model proposing a steering angle for a frame.
pub trait SteeringModel {
    /// Infer the steering angle in degrees (90 is straight ahead).
    fn infer_steering(&mut self, frame: &Frame) -> Result<f64, InferenceError>;
}

/// Model detecting traffic signs and lights in a frame.
pub trait DetectionModel {
    /// Infer the detections present in the frame.
    fn infer_detections(&mut self, frame: &Frame) -> Result<RawDetections, InferenceError>;
}

// -----------------------------------------------------------------------------------------------
// ENUMS
// -----------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("The model produced malformed output: {0}")]
    MalformedOutput(String),

    #[error("The model has no result for frame {0}")]
    NoResult(u64),

    #[error("Model backend error: {0}")]
    Backend(String),
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl BoundingBox {
    /// Vertical extent of the box, negative if the box is inverted.
    pub fn height(&self) -> f32 {
        self.ymax - self.ymin
    }
}

impl RawDetections {
    /// Number of detections, or an error if the parallel arrays differ in length.
    pub fn len(&self) -> Result<usize, InferenceError> {
        let n = self.scores.len();
        if self.classes.len() != n || self.boxes.len() != n {
            return Err(InferenceError::MalformedOutput(format!(
                "parallel arrays differ in length (scores: {}, classes: {}, boxes: {})",
                n, self.classes.len(), self.boxes.len()
            )))
        }
        Ok(n)
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}
