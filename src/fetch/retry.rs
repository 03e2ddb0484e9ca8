//! Bounded fixed-delay retry policy.

use std::fmt;
use std::time::Duration;

use crate::error::FetchError;

/// Default total attempts per item.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default pause between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// How many times to try, how long to pause, and which errors qualify.
pub struct RetryPolicy<E> {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub delay: Duration,
    is_retryable: fn(&E) -> bool,
}

impl<E> RetryPolicy<E> {
    pub fn new(max_attempts: u32, delay: Duration, is_retryable: fn(&E) -> bool) -> Self {
        Self {
            max_attempts,
            delay,
            is_retryable,
        }
    }

    pub fn is_retryable(&self, err: &E) -> bool {
        (self.is_retryable)(err)
    }

    /// Delay before the next attempt after `attempt` (1-based) failed with
    /// `err`, or `None` when the item should be given up.
    pub fn next_delay(&self, err: &E, attempt: u32) -> Option<Duration> {
        (attempt < self.max_attempts && self.is_retryable(err)).then_some(self.delay)
    }
}

impl RetryPolicy<FetchError> {
    pub fn for_fetch(max_attempts: u32, delay: Duration) -> Self {
        Self::new(max_attempts, delay, FetchError::is_retryable)
    }
}

impl Default for RetryPolicy<FetchError> {
    fn default() -> Self {
        Self::for_fetch(DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY)
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}
