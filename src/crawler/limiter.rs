//! Shared request throttle
//!
//! One token bucket for the whole process, refilled at the configured
//! requests-per-second with a burst of one. Every worker acquires from the
//! same bucket before each fetch.

use crate::gateway::FetchError;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::time::Instant;

type GovernorRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Token bucket shared by every worker
#[derive(Clone)]
pub struct ApiRateLimiter {
    inner: Arc<GovernorRateLimiter>,
    requests_per_second: u32,
}

impl ApiRateLimiter {
    /// Creates a limiter allowing `requests_per_second` requests, one at a time
    ///
    /// A rate of zero is treated as one.
    pub fn new(requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(rps).allow_burst(NonZeroU32::MIN);

        Self {
            inner: Arc::new(RateLimiter::direct(quota)),
            requests_per_second: rps.get(),
        }
    }

    pub fn requests_per_second(&self) -> u32 {
        self.requests_per_second
    }

    /// Waits for a token, giving up at `deadline`
    ///
    /// Dropping the returned future abandons the wait without consuming a
    /// token.
    pub async fn acquire(&self, deadline: Instant) -> Result<(), FetchError> {
        tokio::time::timeout_at(deadline, self.inner.until_ready())
            .await
            .map_err(|_| FetchError::RateLimitWait)
    }
}
