//! # Replay collaborators
//!
//! Camera and models backed by a recorded drive, so the control core can be run away from the
//! car. The camera reads frames from a directory of images, the models read a JSON inference log
//! holding, for each frame sequence number, the steering angle and raw detections the models
//! produced for that frame:
//!
//! ```json
//! [
//!     { "seq": 0, "steering_deg": 91.2 },
//!     { "seq": 1, "steering_deg": 92.0, "detections": {
//!         "scores": [0.91], "classes": [0.0],
//!         "boxes": [{ "ymin": 0.2, "xmin": 0.4, "ymax": 0.5, "xmax": 0.6 }]
//!     }}
//! ]
//! ```

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use car_if::{
    eqpt::cam::{CamError, Frame, FrameSource},
    model::{DetectionModel, InferenceError, RawDetections, SteeringModel},
};
use image::imageops::{self, FilterType};
use log::{debug, info};
use serde::Deserialize;
use util::time::secs_to_duration;

use crate::clock::Clock;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// File extensions of the images the camera replays.
const FRAME_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Camera replaying the images of a directory in file name order.
pub struct ReplayCamera {
    paths: Vec<PathBuf>,
    next_seq: u64,

    width: u32,
    height: u32,

    /// Time between frames, `None` delivers frames as fast as they are read.
    period: Option<Duration>,
    next_due: Duration,
    clock: Arc<dyn Clock>,
}

/// One frame's entry in the inference log.
#[derive(Debug, Clone, Deserialize)]
pub struct InferenceEntry {
    pub seq: u64,

    #[serde(default)]
    pub steering_deg: Option<f64>,

    #[serde(default)]
    pub detections: Option<RawDetections>,
}

/// Recorded model outputs, by frame sequence number.
#[derive(Debug, Default)]
pub struct InferenceLog {
    entries: HashMap<u64, InferenceEntry>,
}

/// Steering model replaying the inference log.
pub struct ReplaySteering(pub Arc<InferenceLog>);

/// Detection model replaying the inference log.
pub struct ReplayDetector(pub Arc<InferenceLog>);

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("Could not read {0:?}: {1}")]
    Io(PathBuf, std::io::Error),

    #[error("Could not parse the inference log: {0}")]
    Json(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ReplayCamera {
    /// Open the frames in `dir`. Frames are resized to `width` x `height` if needed.
    pub fn open<P: AsRef<Path>>(
        dir: P,
        width: u32,
        height: u32,
        frame_rate_hz: f64,
        clock: Arc<dyn Clock>
    ) -> Result<Self, CamError> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir.as_ref())? {
            let path = entry?.path();

            let is_frame = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| FRAME_EXTENSIONS.contains(&e.to_lowercase().as_str()))
                .unwrap_or(false);

            if is_frame && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        if paths.is_empty() {
            return Err(CamError::Unavailable(format!("no frames in {:?}", dir.as_ref())))
        }

        info!("Replaying {} frames from {:?}", paths.len(), dir.as_ref());

        let period = if frame_rate_hz > 0.0 {
            Some(secs_to_duration(1.0 / frame_rate_hz))
        }
        else {
            None
        };

        Ok(Self {
            paths,
            next_seq: 0,
            width,
            height,
            period,
            next_due: clock.now(),
            clock,
        })
    }

    pub fn num_frames(&self) -> usize {
        self.paths.len()
    }
}

impl FrameSource for ReplayCamera {
    fn next_frame(&mut self) -> Result<Frame, CamError> {
        let seq = self.next_seq;
        let path = match self.paths.get(seq as usize) {
            Some(p) => p,
            None => return Err(CamError::EndOfStream)
        };
        self.next_seq += 1;

        if let Some(period) = self.period {
            self.clock.sleep_until(self.next_due);
            self.next_due = self.next_due.max(self.clock.now()) + period;
        }

        let image = image::open(path)
            .map_err(|e| CamError::MalformedFrame(seq, format!("{:?}: {}", path, e)))?
            .to_rgb8();

        let image = if image.dimensions() != (self.width, self.height) {
            debug!("Resizing frame {} from {:?}", seq, image.dimensions());
            imageops::resize(&image, self.width, self.height, FilterType::Triangle)
        }
        else {
            image
        };

        Ok(Frame::new(seq, image))
    }
}

impl InferenceLog {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ReplayError> {
        let s = fs::read_to_string(path.as_ref())
            .map_err(|e| ReplayError::Io(path.as_ref().to_path_buf(), e))?;

        Self::from_str(&s)
    }

    pub fn from_str(s: &str) -> Result<Self, ReplayError> {
        let entries: Vec<InferenceEntry> = serde_json::from_str(s)?;

        Ok(Self {
            entries: entries.into_iter().map(|e| (e.seq, e)).collect()
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Recorded steering angle for a frame.
    pub fn steering(&self, seq: u64) -> Result<f64, InferenceError> {
        self.entries
            .get(&seq)
            .and_then(|e| e.steering_deg)
            .ok_or(InferenceError::NoResult(seq))
    }

    /// Recorded detections for a frame, none if nothing was recorded.
    pub fn detections(&self, seq: u64) -> RawDetections {
        self.entries
            .get(&seq)
            .and_then(|e| e.detections.clone())
            .unwrap_or_default()
    }
}

impl SteeringModel for ReplaySteering {
    fn infer_steering(&mut self, frame: &Frame) -> Result<f64, InferenceError> {
        self.0.steering(frame.seq)
    }
}

impl DetectionModel for ReplayDetector {
    fn infer_detections(&mut self, frame: &Frame) -> Result<RawDetections, InferenceError> {
        Ok(self.0.detections(frame.seq))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use image::RgbImage;

    use crate::clock::SimClock;
    use crate::mock::test_frame;

    #[test]
    fn test_inference_log() {
        let log = InferenceLog::from_str(r#"[
            { "seq": 0, "steering_deg": 91.2 },
            { "seq": 2, "detections": {
                "scores": [0.91], "classes": [0.0],
                "boxes": [{ "ymin": 0.2, "xmin": 0.4, "ymax": 0.5, "xmax": 0.6 }]
            }}
        ]"#).unwrap();
        let log = Arc::new(log);

        let mut steering = ReplaySteering(log.clone());
        let mut detector = ReplayDetector(log.clone());

        assert_eq!(steering.infer_steering(&test_frame(0)).unwrap(), 91.2);
        assert!(matches!(
            steering.infer_steering(&test_frame(2)), 
            Err(InferenceError::NoResult(2))
        ));
        assert!(detector.infer_detections(&test_frame(0)).unwrap().is_empty());
        assert_eq!(detector.infer_detections(&test_frame(2)).unwrap().scores, vec![0.91]);

        assert!(InferenceLog::from_str("{").is_err());
    }

    #[test]
    fn test_replay_camera() {
        let dir = std::env::temp_dir().join(format!("car_replay_test_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        RgbImage::new(32, 24).save(dir.join("f000.png")).unwrap();
        RgbImage::new(64, 48).save(dir.join("f001.png")).unwrap();
        fs::write(dir.join("f002.png"), b"not an image").unwrap();
        fs::write(dir.join("notes.txt"), b"ignored").unwrap();

        let clock = Arc::new(SimClock::new());
        let mut cam = ReplayCamera::open(&dir, 32, 24, 10.0, clock.clone()).unwrap();
        assert_eq!(cam.num_frames(), 3);

        let f = cam.next_frame().unwrap();
        assert_eq!((f.seq, f.dimensions()), (0, (32, 24)));

        let f = cam.next_frame().unwrap();
        assert_eq!((f.seq, f.dimensions()), (1, (32, 24)));

        let e = cam.next_frame().unwrap_err();
        assert!(e.is_transient());

        assert!(matches!(cam.next_frame(), Err(CamError::EndOfStream)));
        assert_eq!(clock.now(), Duration::from_millis(200));

        fs::remove_dir_all(&dir).unwrap();
    }
}
