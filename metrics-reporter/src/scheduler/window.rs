//! Report window computation.
//!
//! A window is the inclusive range of store timestamps the next cycle asks
//! for. Windows are derived from the report cursor and the clocks, never
//! stored, so the timer path and the on-demand path compute them the same
//! way.

use std::fmt;

use super::clock::Clock;
use crate::store::Timestamp;

/// Inclusive `[from, to]` range of store timestamps.
///
/// A window with `from > to` is empty: it selects nothing and never moves
/// the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub from: Timestamp,
    pub to: Timestamp,
}

impl Window {
    pub fn new(from: Timestamp, to: Timestamp) -> Self {
        Self { from, to }
    }

    pub fn is_empty(&self) -> bool {
        self.from > self.to
    }

    /// First timestamp after this window.
    pub fn next_from(&self) -> Timestamp {
        self.to.saturating_add(1)
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.from, self.to)
    }
}

/// Compute the next window from scheduler state and clock readings.
///
/// Cases, in priority order:
/// 1. no interval, nothing reported: everything since the scheduler started
/// 2. no interval, cursor set: from the cursor up to now
/// 3. interval, nothing reported: exactly one interval back from now
/// 4. interval, cursor set: from the cursor up to now
pub fn compute_window(
    report_interval_ms: Option<u64>,
    next_query_from: Option<Timestamp>,
    start_time: i64,
    monotonic_now: i64,
    wall_now: Timestamp,
) -> Window {
    match (report_interval_ms, next_query_from) {
        (None, None) => {
            let elapsed = monotonic_now.saturating_sub(start_time).max(0);
            Window::new(wall_now.saturating_sub(elapsed), wall_now)
        }
        (None, Some(from)) => Window::new(from, wall_now),
        (Some(interval_ms), None) => {
            let interval_secs = (interval_ms / 1000) as i64;
            Window::new(wall_now.saturating_sub(interval_secs), wall_now)
        }
        (Some(_), Some(from)) => Window::new(from, wall_now),
    }
}

/// How much of the timeline has been delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportCursor {
    start_time: i64,
    next_query_from: Option<Timestamp>,
}

impl ReportCursor {
    /// A cursor for a scheduler started at monotonic time `start_time`.
    pub fn new(start_time: i64) -> Self {
        Self {
            start_time,
            next_query_from: None,
        }
    }

    /// Monotonic seconds at scheduler creation.
    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    /// First unreported timestamp, once a window was delivered or held.
    pub fn next_query_from(&self) -> Option<Timestamp> {
        self.next_query_from
    }

    /// The window the next cycle should query.
    pub fn window(&self, report_interval_ms: Option<u64>, clock: &dyn Clock) -> Window {
        compute_window(
            report_interval_ms,
            self.next_query_from,
            self.start_time,
            clock.monotonic_secs(),
            clock.wall_secs(),
        )
    }

    /// Pin the start of a window that was not delivered.
    ///
    /// No-op once the cursor is set, or for an empty window.
    pub fn hold(&mut self, window: &Window) {
        if self.next_query_from.is_none() && !window.is_empty() {
            self.next_query_from = Some(window.from);
        }
    }

    /// Mark `window` as delivered.
    ///
    /// The cursor never moves backwards and empty windows leave it alone.
    pub fn advance(&mut self, window: &Window) {
        if window.is_empty() {
            return;
        }
        let next = window.next_from();
        self.next_query_from = Some(match self.next_query_from {
            Some(current) => current.max(next),
            None => next,
        });
    }
}
