//! Time sources for the control tasks
//!
//! Every hold, blink frame and detection period goes through a [`Clock`], so maneuvers can be
//! executed against simulated time.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A monotonic time source.
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock was created.
    fn now(&self) -> Duration;

    /// Block the calling task for the given duration.
    fn sleep(&self, dur: Duration);

    /// Block the calling task until the clock reaches `deadline`.
    fn sleep_until(&self, deadline: Duration) {
        let now = self.now();
        if deadline > now {
            self.sleep(deadline - now);
        }
    }
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Wall clock time.
#[derive(Debug)]
pub struct SystemClock {
    start: Instant,
}

/// Simulated time.
///
/// Sleeping advances the simulated time instantly. Actions may be scheduled at simulated
/// instants, they are executed by whichever task's sleep crosses their instant, in order of
/// their instant and then of scheduling.
pub struct SimClock {
    inner: Mutex<SimInner>,
}

struct SimInner {
    now: Duration,
    next_seq: u64,
    scheduled: Vec<Scheduled>,
}

struct Scheduled {
    at: Duration,
    seq: u64,
    action: Box<dyn FnOnce() + Send>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now()
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep(&self, dur: Duration) {
        thread::sleep(dur)
    }
}

impl SimClock {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SimInner {
                now: Duration::from_secs(0),
                next_seq: 0,
                scheduled: Vec::new(),
            })
        }
    }

    /// Schedule an action to run when simulated time reaches `at`.
    pub fn schedule_at<F>(&self, at: Duration, action: F) 
    where
        F: FnOnce() + Send + 'static
    {
        let mut inner = self.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.scheduled.push(Scheduled {
            at,
            seq,
            action: Box::new(action)
        });
    }

    /// Advance simulated time without any task sleeping.
    pub fn advance(&self, dur: Duration) {
        self.sleep(dur)
    }

    /// Number of scheduled actions which have not run yet.
    pub fn num_pending(&self) -> usize {
        self.lock().scheduled.len()
    }

    /// Poisoning is ignored, the simulated time is always consistent.
    fn lock(&self) -> MutexGuard<'_, SimInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SimClock {
    fn now(&self) -> Duration {
        self.lock().now
    }

    fn sleep(&self, dur: Duration) {
        let target = self.now() + dur;

        loop {
            // Pop the earliest action due before the target. The lock must be released before
            // the action runs since actions may use the clock themselves.
            let due = {
                let mut inner = self.lock();
                let next = inner.scheduled
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| s.at <= target)
                    .min_by_key(|(_, s)| (s.at, s.seq))
                    .map(|(i, _)| i);

                match next {
                    Some(i) => {
                        let s = inner.scheduled.remove(i);
                        if s.at > inner.now {
                            inner.now = s.at;
                        }
                        Some(s.action)
                    },
                    None => {
                        if target > inner.now {
                            inner.now = target;
                        }
                        None
                    }
                }
            };

            match due {
                Some(action) => action(),
                None => break
            }
        }
    }
}
