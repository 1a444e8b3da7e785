//! Clock sources used to place report windows on the store's timeline.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

use chrono::Utc;

use crate::store::Timestamp;

/// Source of the two clocks a scheduler reconciles.
pub trait Clock: Send + Sync + 'static {
    /// Monotonic seconds since an arbitrary, fixed origin.
    fn monotonic_secs(&self) -> i64;

    /// Wall-clock seconds since the Unix epoch.
    fn wall_secs(&self) -> Timestamp;
}

/// Process clocks: `Instant` for monotonic time, `chrono::Utc` for wall time.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn monotonic_secs(&self) -> i64 {
        self.origin.elapsed().as_secs() as i64
    }

    fn wall_secs(&self) -> Timestamp {
        Utc::now().timestamp()
    }
}

/// Manually driven clock for tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    monotonic: AtomicI64,
    wall: AtomicI64,
}

impl ManualClock {
    pub fn new(monotonic: i64, wall: Timestamp) -> Self {
        Self {
            monotonic: AtomicI64::new(monotonic),
            wall: AtomicI64::new(wall),
        }
    }

    /// Move both clocks forward by `secs`.
    pub fn advance(&self, secs: i64) {
        self.monotonic.fetch_add(secs, Ordering::SeqCst);
        self.wall.fetch_add(secs, Ordering::SeqCst);
    }

    /// Set the wall clock, e.g. to simulate an NTP step.
    pub fn set_wall(&self, wall: Timestamp) {
        self.wall.store(wall, Ordering::SeqCst);
    }

    pub fn set_monotonic(&self, monotonic: i64) {
        self.monotonic.store(monotonic, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn monotonic_secs(&self) -> i64 {
        self.monotonic.load(Ordering::SeqCst)
    }

    fn wall_secs(&self) -> Timestamp {
        self.wall.load(Ordering::SeqCst)
    }
}
