//! Single-slot handoff of the latest camera frame
//!
//! The lane following task publishes every frame it acquires, the sign detection task reads
//! whichever frame is latest when its cycle starts. Frames are shared immutably, so a reader
//! never observes a partially written frame.

use std::sync::{Arc, Mutex, MutexGuard};

use car_if::eqpt::cam::Frame;

/// Holds the most recently published frame.
#[derive(Debug, Default)]
pub struct FrameSlot {
    latest: Mutex<Option<Arc<Frame>>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a frame, replacing the previous one.
    pub fn publish(&self, frame: Frame) -> Arc<Frame> {
        let frame = Arc::new(frame);
        *self.lock() = Some(frame.clone());
        frame
    }

    /// Get the latest frame, or `None` if nothing has been published yet.
    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.lock().clone()
    }

    // The slot only ever holds a complete value, so a poisoned lock is still consistent.
    fn lock(&self) -> MutexGuard<'_, Option<Arc<Frame>>> {
        self.latest.lock().unwrap_or_else(|e| e.into_inner())
    }
}
