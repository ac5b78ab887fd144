//! The 30-minute window scheduler.
//!
//! Windows are anchored to multiples of the window size from the epoch,
//! not to process start. Consecutive successful runs tile the timeline
//! with no gaps and no overlaps: each run starts where the last success
//! ended, and a failed or skipped window is back-filled by widening the
//! next run's start.

use chrono::{DateTime, Duration, Utc};

/// Window size. Fixed; CLI overrides are logged and ignored.
pub const WINDOW_MINUTES: i64 = 30;
const WINDOW_MS: i64 = WINDOW_MINUTES * 60_000;

/// Floors an instant to the boundary at or before it.
pub fn floor_to_boundary(t: DateTime<Utc>) -> DateTime<Utc> {
    let millis = t.timestamp_millis();
    let floored = millis.div_euclid(WINDOW_MS) * WINDOW_MS;
    DateTime::from_timestamp_millis(floored).unwrap_or(t)
}

/// The first boundary strictly after an instant. An instant already on a
/// boundary maps to the next one, never itself.
pub fn next_boundary_after(t: DateTime<Utc>) -> DateTime<Utc> {
    floor_to_boundary(t) + Duration::milliseconds(WINDOW_MS)
}

pub fn is_exact_boundary(t: DateTime<Utc>) -> bool {
    t.timestamp_millis().rem_euclid(WINDOW_MS) == 0
}

/// Pure scheduling state, separate from the async loop so the window
/// selection rules are testable without time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerState {
    last_end: Option<DateTime<Utc>>,
    running: bool,
}

impl SchedulerState {
    /// `seed`, when present, acts as the previous successful window's end.
    pub const fn new(seed: Option<DateTime<Utc>>) -> Self {
        Self {
            last_end: seed,
            running: false,
        }
    }

    pub const fn last_end(&self) -> Option<DateTime<Utc>> {
        self.last_end
    }

    /// The `[start, end)` window for a boundary firing at `end`.
    ///
    /// Starts at the last successful end when that back-fills a real span,
    /// else falls back to one fixed-size window.
    pub fn window_for(&self, end: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let fallback = end - Duration::milliseconds(WINDOW_MS);
        let start = match self.last_end {
            Some(last) if last < end => last,
            _ => fallback,
        };
        if start >= end {
            return (fallback, end);
        }
        (start, end)
    }

    /// Marks a run as started. Returns `false` when one is already in
    /// flight; the trigger must then be skipped, not queued.
    pub const fn begin(&mut self) -> bool {
        if self.running {
            return false;
        }
        self.running = true;
        true
    }

    /// Marks the run as finished. Only success advances `last_end`; a
    /// failure leaves the span to be back-filled by the next run.
    pub fn finish(&mut self, end: DateTime<Utc>, success: bool) {
        self.running = false;
        if success {
            self.last_end = Some(end);
        }
    }
}
