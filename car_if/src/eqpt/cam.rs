//! # Camera equipment interface

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use image::RgbImage;

// -----------------------------------------------------------------------------------------------
// STRUCTS
// -----------------------------------------------------------------------------------------------

/// A single camera frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Sequence number of the frame in this drive session, starting at zero
    pub seq: u64,

    /// Time at which the frame was acquired
    pub timestamp: DateTime<Utc>,

    /// The image itself
    pub image: RgbImage,
}

// -----------------------------------------------------------------------------------------------
// TRAITS
// -----------------------------------------------------------------------------------------------

/// A source of camera frames.
pub trait FrameSource {
    /// Block until the next frame is available and return it.
    fn next_frame(&mut self) -> Result<Frame, CamError>;
}

// -----------------------------------------------------------------------------------------------
// ENUMS
// -----------------------------------------------------------------------------------------------

/// Errors which can occur while acquiring frames.
#[derive(Debug, thiserror::Error)]
pub enum CamError {
    #[error("The camera has no more frames")]
    EndOfStream,

    #[error("Frame {0} is malformed: {1}")]
    MalformedFrame(u64, String),

    #[error("Camera unavailable: {0}")]
    Unavailable(String),

    #[error("Could not decode frame: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Camera IO error: {0}")]
    Io(#[from] std::io::Error),
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl Frame {
    /// Create a frame stamped with the current time.
    pub fn new(seq: u64, image: RgbImage) -> Self {
        Self {
            seq,
            timestamp: Utc::now(),
            image
        }
    }

    /// Width and height of the frame in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

impl CamError {
    /// Returns true if the error only affects the current frame, and acquisition may continue.
    pub fn is_transient(&self) -> bool {
        matches!(self, CamError::MalformedFrame(..))
    }
}
