//! Sliding query window of one endpoint

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;
use tracing::warn;

/// Half-open time range `[start, end)` to query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Tracks the end of the last successfully delivered window.
///
/// The window only advances on success, so failed ticks are replayed by the
/// next one. Replay never reaches further back than `max_replay`.
#[derive(Debug, Clone)]
pub struct PollWindow {
    last_poll: Option<DateTime<Utc>>,
    cadence: TimeDelta,
    max_replay: TimeDelta,
}

impl PollWindow {
    pub fn new(cadence: Duration, max_replay: Duration) -> Self {
        Self {
            last_poll: None,
            cadence: to_delta(cadence),
            max_replay: to_delta(max_replay.max(cadence)),
        }
    }

    pub fn last_poll(&self) -> Option<DateTime<Utc>> {
        self.last_poll
    }

    /// Window ending at `now`. The first call starts one cadence before `now`.
    pub fn begin(&mut self, now: DateTime<Utc>) -> Window {
        let last_poll = *self.last_poll.get_or_insert(now - self.cadence);
        let earliest = now - self.max_replay;

        let start = if last_poll < earliest {
            warn!(
                last_poll = %last_poll,
                replay_from = %earliest,
                "Replay window exceeds limit, samples before replay_from are dropped"
            );
            earliest
        } else {
            last_poll
        };

        Window { start, end: now }
    }

    /// Mark everything before `now` as delivered
    pub fn advance(&mut self, now: DateTime<Utc>) {
        self.last_poll = Some(now);
    }
}

fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or_else(|_| TimeDelta::weeks(1))
}
