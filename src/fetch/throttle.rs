//! Minimum-interval gate between consecutive external calls.

use std::time::Duration;
use tokio::time::{Instant, sleep};

/// Spaces calls at least `min_interval` apart, measured from the completion
/// of the previous call on the tokio clock.
#[derive(Debug)]
pub struct Throttle {
    min_interval: Duration,
    last_call: Option<Instant>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: None,
        }
    }

    /// Time still to wait at `now` before the next call may start.
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.last_call {
            Some(last) => self
                .min_interval
                .saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    /// Sleep for the remaining interval, if any. Returns how long it waited.
    pub async fn wait_turn(&self) -> Duration {
        let wait = self.remaining(Instant::now());
        if !wait.is_zero() {
            sleep(wait).await;
        }
        wait
    }

    /// Mark a call as finished, whatever its outcome.
    pub fn record_call(&mut self) {
        self.last_call = Some(Instant::now());
    }
}
