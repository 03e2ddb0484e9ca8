//! Rate-limited, retrying access to the external title API.
//!
//! [`TitleSource`] is the lookup seam. [`RateLimitedFetchClient`] wraps any
//! source with a [`Throttle`] and a [`RetryPolicy`] and keeps call counters.
//! Calls are strictly sequential; the client is owned by one task.

pub mod jikan;
pub mod retry;
pub mod throttle;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use crate::emit;
use crate::error::FetchError;
use crate::metrics::events::{FetchAttempt, FetchOutcome, FetchRetry, RateLimitWait};
use crate::model::RawPayload;

pub use jikan::JikanSource;
pub use retry::RetryPolicy;
pub use throttle::Throttle;

/// Default minimum interval between external calls.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(550);

/// A single external lookup, without rate limiting or retry.
#[async_trait]
pub trait TitleSource: Send + Sync {
    async fn lookup(&self, id: i64) -> Result<RawPayload, FetchError>;

    /// Recorded as the `source` metadata of stored raw payloads.
    fn name(&self) -> &str;
}

pub type TitleSourceRef = Arc<dyn TitleSource>;

/// Counters kept across the lifetime of a client.
#[derive(Debug, Clone, Default)]
pub struct FetchStats {
    /// Every external call, retries included.
    pub calls_made: u64,
    pub successes: u64,
    pub last_success: Option<Instant>,
}

pub struct RateLimitedFetchClient {
    source: TitleSourceRef,
    throttle: Throttle,
    retry: RetryPolicy<FetchError>,
    stats: FetchStats,
}

impl RateLimitedFetchClient {
    pub fn new(source: TitleSourceRef, min_interval: Duration, retry: RetryPolicy<FetchError>) -> Self {
        Self {
            source,
            throttle: Throttle::new(min_interval),
            retry,
            stats: FetchStats::default(),
        }
    }

    pub fn stats(&self) -> &FetchStats {
        &self.stats
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Fetch one title, waiting out the rate limit before every attempt and
    /// retrying per the policy. Not-found is returned on the first attempt.
    pub async fn fetch(&mut self, id: i64) -> Result<RawPayload, FetchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let waited = self.throttle.wait_turn().await;
            if !waited.is_zero() {
                emit!(RateLimitWait { duration: waited });
            }

            let result = self.source.lookup(id).await;
            self.throttle.record_call();
            self.stats.calls_made += 1;

            let err = match result {
                Ok(payload) => {
                    self.stats.successes += 1;
                    self.stats.last_success = Some(Instant::now());
                    emit!(FetchAttempt {
                        outcome: FetchOutcome::Success
                    });
                    debug!("Fetched title {} on attempt {}", id, attempt);
                    return Ok(payload);
                }
                Err(err) => err,
            };

            if err.is_not_found() {
                emit!(FetchAttempt {
                    outcome: FetchOutcome::NotFound
                });
                warn!("Title {} not found", id);
                return Err(err);
            }
            emit!(FetchAttempt {
                outcome: FetchOutcome::Error
            });

            if !self.retry.is_retryable(&err) {
                return Err(err);
            }
            match self.retry.next_delay(&err, attempt) {
                Some(delay) => {
                    warn!(
                        "Attempt {}/{} for title {} failed: {}. Retrying in {:?}",
                        attempt, self.retry.max_attempts, id, err, delay
                    );
                    emit!(FetchRetry);
                    sleep(delay).await;
                }
                None => {
                    return Err(FetchError::RetriesExhausted {
                        id,
                        attempts: attempt,
                        source: Box::new(err),
                    });
                }
            }
        }
    }
}
