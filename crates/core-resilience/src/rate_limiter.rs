//! Rate limiting for keeping booking traffic under a request ceiling
//!
//! Token bucket (GCRA) rate limiting backed by the governor crate. One
//! limiter is shared by every booking attempt in the process.

use super::error::ResilienceError;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as Governor,
};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

/// Shared token-bucket gate
///
/// With the default burst of one, permits are spaced evenly at
/// `1 / requests_per_second`, so no one-second window ever sees more than
/// the configured number of requests.
///
/// # Example
/// ```no_run
/// use slotline_core_resilience::{RateLimiter, ResilienceError};
///
/// #[tokio::main]
/// async fn main() -> Result<(), ResilienceError> {
///     // At most 5 booking requests per second
///     let limiter = RateLimiter::per_second(5)?;
///
///     limiter.execute(|| async {
///         Ok::<_, ResilienceError>(42)
///     }).await?;
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct RateLimiter {
    limiter: Arc<Governor<NotKeyed, InMemoryState, DefaultClock>>,
    requests_per_second: u32,
    burst: u32,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("requests_per_second", &self.requests_per_second)
            .field("burst", &self.burst)
            .finish()
    }
}

impl RateLimiter {
    /// Create a limiter allowing `requests_per_second` evenly spaced permits
    pub fn per_second(requests_per_second: u32) -> Result<Self, ResilienceError> {
        Self::with_burst(requests_per_second, 1)
    }

    /// Create a limiter that lets `burst` permits through back to back
    pub fn with_burst(requests_per_second: u32, burst: u32) -> Result<Self, ResilienceError> {
        let rate = NonZeroU32::new(requests_per_second).ok_or_else(|| {
            ResilienceError::InvalidConfig("rate_limit_per_second must be > 0".to_string())
        })?;
        let burst_nz = NonZeroU32::new(burst)
            .ok_or_else(|| ResilienceError::InvalidConfig("burst must be > 0".to_string()))?;

        let quota = Quota::per_second(rate).allow_burst(burst_nz);

        Ok(Self {
            limiter: Arc::new(Governor::direct(quota)),
            requests_per_second,
            burst,
        })
    }

    /// Wait until a permit is available
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }

    /// Take a permit if one is available right now
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }

    /// Execute an operation once a permit is available
    pub async fn execute<F, Fut, T>(&self, op: F) -> Result<T, ResilienceError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, ResilienceError>>,
    {
        self.acquire().await;
        op().await
    }

    pub fn requests_per_second(&self) -> u32 {
        self.requests_per_second
    }

    pub fn burst(&self) -> u32 {
        self.burst
    }

    /// Minimum spacing between two permits once the burst is spent
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.requests_per_second as f64)
    }
}
