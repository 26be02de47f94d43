//! Circuit Breaker implementation for fault tolerance
//!
//! The circuit breaker stops the retry engine from hammering a dependency
//! that keeps failing. It has three states:
//! - Closed: Normal operation, requests pass through
//! - Open: Dependency is failing, requests are refused
//! - HalfOpen: Reset timeout elapsed, exactly one probe request is let through
//!
//! One breaker guards exactly one operation name; the [`crate::RetryEngine`]
//! keeps a registry so breakers are never shared between operations.

use super::error::ResilienceError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

/// State of the circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, requests pass through normally
    Closed,
    /// Circuit is open, requests fail immediately
    Open,
    /// Circuit is half-open, a single probe is in flight
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF-OPEN",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of failures before opening circuit
    pub failure_threshold: u32,
    /// Time since the last failure after which one probe is allowed
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// Internal state of the circuit breaker
#[derive(Debug)]
struct CircuitBreakerState {
    state: CircuitState,
    failures: u32,
    last_failure_time: Option<Instant>,
    /// How many times the breaker went Closed/HalfOpen -> Open
    times_opened: u64,
}

impl CircuitBreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: 0,
            last_failure_time: None,
            times_opened: 0,
        }
    }
}

/// Circuit breaker for a single named operation
///
/// # Example
/// ```no_run
/// use slotline_core_resilience::{CircuitBreaker, CircuitBreakerConfig};
///
/// #[tokio::main]
/// async fn main() {
///     let breaker = CircuitBreaker::new("check_available_slots", CircuitBreakerConfig::default());
///
///     if breaker.can_request().await {
///         // run the guarded call, then report the outcome
///         breaker.record_success().await;
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    name: Arc<str>,
    config: Arc<CircuitBreakerConfig>,
    state: Arc<Mutex<CircuitBreakerState>>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker for `name` with the given configuration
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: Arc::from(name.into()),
            config: Arc::new(config),
            state: Arc::new(Mutex::new(CircuitBreakerState::new())),
        }
    }

    /// Create a new circuit breaker with default configuration
    pub fn new_default(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the current state of the circuit breaker
    pub async fn get_state(&self) -> CircuitState {
        self.state.lock().await.state
    }

    /// Get current failure count
    pub async fn get_failure_count(&self) -> u32 {
        self.state.lock().await.failures
    }

    /// Number of Closed/HalfOpen -> Open transitions so far
    pub async fn times_opened(&self) -> u64 {
        self.state.lock().await.times_opened
    }

    /// Reset the circuit breaker to closed state
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.state = CircuitState::Closed;
        state.failures = 0;
        state.last_failure_time = None;
    }

    /// Whether a request may go through right now.
    ///
    /// An open breaker whose reset timeout has elapsed moves to HalfOpen and
    /// admits exactly this caller; everyone else is refused until the probe
    /// reports back.
    pub async fn can_request(&self) -> bool {
        let mut state = self.state.lock().await;

        match state.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = state
                    .last_failure_time
                    .map(|at| at.elapsed() > self.config.reset_timeout)
                    .unwrap_or(true);
                if elapsed {
                    state.state = CircuitState::HalfOpen;
                    info!(breaker = %self.name, "Circuit breaker state changed to HALF-OPEN");
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => false,
        }
    }

    /// Reset the failure count and force the breaker closed
    pub async fn record_success(&self) {
        let mut state = self.state.lock().await;
        let previous = state.state;
        state.failures = 0;
        state.state = CircuitState::Closed;

        if previous != CircuitState::Closed {
            info!(breaker = %self.name, from = %previous, "Circuit breaker closed after success");
        }
    }

    /// Count a failure, opening the breaker once the threshold is reached
    pub async fn record_failure(&self) {
        let mut state = self.state.lock().await;
        state.failures = state.failures.saturating_add(1);

        if state.failures >= self.config.failure_threshold {
            state.last_failure_time = Some(Instant::now());
            if state.state != CircuitState::Open {
                state.state = CircuitState::Open;
                state.times_opened += 1;
                warn!(
                    breaker = %self.name,
                    failures = state.failures,
                    "Circuit breaker opened"
                );
            }
        } else {
            info!(
                breaker = %self.name,
                failures = state.failures,
                "Circuit breaker recorded failure"
            );
        }
    }

    /// Run `op` once under breaker protection, without retries
    pub async fn call<F, Fut, T>(&self, op: F) -> Result<T, ResilienceError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, ResilienceError>>,
    {
        if !self.can_request().await {
            return Err(ResilienceError::CircuitOpen {
                operation: self.name.to_string(),
                attempts: 1,
            });
        }

        match op().await {
            Ok(result) => {
                self.record_success().await;
                Ok(result)
            }
            Err(e) => {
                self.record_failure().await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, reset_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                reset_timeout: Duration::from_secs(reset_secs),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_breaker_closed_to_open() {
        let breaker = breaker(3, 30);

        for _ in 0..2 {
            breaker.record_failure().await;
            assert_eq!(breaker.get_state().await, CircuitState::Closed);
            assert!(breaker.can_request().await);
        }

        breaker.record_failure().await;
        assert_eq!(breaker.get_state().await, CircuitState::Open);
        assert!(!breaker.can_request().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_exactly_once_and_blocks_until_reset_timeout() {
        let breaker = breaker(3, 30);

        for _ in 0..7 {
            breaker.record_failure().await;
        }
        assert_eq!(breaker.times_opened().await, 1);

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(!breaker.can_request().await);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(breaker.can_request().await);
        assert_eq!(breaker.get_state().await, CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_single_probe() {
        let breaker = breaker(1, 10);
        breaker.record_failure().await;

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(breaker.can_request().await);
        assert!(!breaker.can_request().await);

        breaker.record_success().await;
        assert_eq!(breaker.get_state().await, CircuitState::Closed);
        assert!(breaker.can_request().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let breaker = breaker(2, 10);
        breaker.record_failure().await;
        breaker.record_failure().await;

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(breaker.can_request().await);

        breaker.record_failure().await;
        assert_eq!(breaker.get_state().await, CircuitState::Open);
        assert_eq!(breaker.times_opened().await, 2);
        assert!(!breaker.can_request().await);
    }

    #[tokio::test]
    async fn test_call_records_outcomes() {
        let breaker = breaker(1, 60);

        let ok = breaker.call(|| async { Ok::<_, ResilienceError>(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let err: Result<(), _> = breaker
            .call(|| async { Err(ResilienceError::Failed("down".into())) })
            .await;
        assert!(err.is_err());

        let refused: Result<(), _> = breaker.call(|| async { Ok(()) }).await;
        assert!(refused.unwrap_err().is_circuit_open());
    }

    #[tokio::test]
    async fn test_reset() {
        let breaker = breaker(1, 60);
        breaker.record_failure().await;

        breaker.reset().await;

        assert_eq!(breaker.get_state().await, CircuitState::Closed);
        assert_eq!(breaker.get_failure_count().await, 0);
    }
}
