//! Minimum spacing between accepted calls.
//!
//! The caller passes the current time, so tests never sleep.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Accepts a call only when the previous accepted call is at least
/// `interval` old. Rejected calls do not move the window.
#[derive(Debug)]
pub struct Cooldown {
    interval: Duration,
    last_accepted: Mutex<Option<Instant>>,
}

impl Cooldown {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_accepted: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Record a call at `now` if the cooldown has elapsed.
    pub fn try_acquire(&self, now: Instant) -> bool {
        let mut last = match self.last_accepted.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(previous) = *last {
            if now.saturating_duration_since(previous) < self.interval {
                return false;
            }
        }

        *last = Some(now);
        true
    }

    /// Time left before the next call would be accepted.
    pub fn remaining(&self, now: Instant) -> Duration {
        let last = match self.last_accepted.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        };

        last.map(|previous| {
            self.interval
                .saturating_sub(now.saturating_duration_since(previous))
        })
        .unwrap_or(Duration::ZERO)
    }
}
