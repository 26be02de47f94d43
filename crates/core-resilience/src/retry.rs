//! Retry engine with configurable backoff and per-operation circuit breaking
//!
//! `RetryEngine::retry` wraps a zero-argument async operation:
//!
//! 1. The operation's circuit breaker is consulted; an open breaker fails fast
//!    with [`ResilienceError::CircuitOpen`].
//! 2. The shared [`PreRequestHook`] runs; its failure counts as an operation failure.
//! 3. The operation runs under a hard deadline.
//! 4. Timeouts and transient errors are retried immediately.
//! 5. Any other error is retried after a backoff delay.
//! 6. Once `max_retries` attempts are used up the failure is reported to the
//!    [`HealthReporter`] and [`ResilienceError::RetriesExhausted`] is returned.
//!
//! # Example
//!
//! ```no_run
//! use slotline_core_resilience::{RetryEngine, RetryPolicy, ResilienceError};
//!
//! # async fn example() -> Result<(), ResilienceError> {
//! let engine = RetryEngine::builder(RetryPolicy::default()).build();
//!
//! let slots = engine
//!     .retry("check_available_slots", || async {
//!         Ok::<_, ResilienceError>(vec!["slot-1"])
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use crate::error::ResilienceError;
use crate::hooks::{HealthReporter, NoopHealthReporter, NoopHook, PreRequestHook};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// How the delay between attempts grows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// `base * attempt`
    Linear,
    /// `base * 2^(attempt - 1)`
    Exponential,
    /// `base * fib(attempt)`
    Fibonacci,
    /// `base`
    Fixed,
}

impl BackoffStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackoffStrategy::Linear => "linear",
            BackoffStrategy::Exponential => "exponential",
            BackoffStrategy::Fibonacci => "fibonacci",
            BackoffStrategy::Fixed => "fixed",
        }
    }

    /// Multiplier applied to the base delay for `attempt` (1-based)
    pub fn multiplier(&self, attempt: u32) -> f64 {
        match self {
            BackoffStrategy::Linear => attempt as f64,
            BackoffStrategy::Exponential => 2f64.powi(attempt.saturating_sub(1) as i32),
            BackoffStrategy::Fibonacci => fibonacci(attempt),
            BackoffStrategy::Fixed => 1.0,
        }
    }
}

impl FromStr for BackoffStrategy {
    type Err = ResilienceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(BackoffStrategy::Linear),
            "exponential" => Ok(BackoffStrategy::Exponential),
            "fibonacci" => Ok(BackoffStrategy::Fibonacci),
            "fixed" => Ok(BackoffStrategy::Fixed),
            other => Err(ResilienceError::InvalidConfig(format!(
                "unknown retry strategy '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for BackoffStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// fib(0) = fib(1) = fib(2) = 1, then the usual recurrence
pub fn fibonacci(n: u32) -> f64 {
    if n <= 1 {
        return 1.0;
    }
    let (mut a, mut b) = (1.0_f64, 1.0_f64);
    for _ in 2..n {
        let next = a + b;
        a = b;
        b = next;
    }
    b
}

/// Global retry defaults
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts before giving up (> 0)
    pub max_retries: u32,
    /// Deadline for a single attempt
    pub timeout: Duration,
    /// Backoff strategy for non-transient failures
    pub strategy: BackoffStrategy,
    /// Base delay fed into the strategy
    pub base_delay: Duration,
    /// Upper bound for any computed delay
    pub max_delay: Duration,
    /// Jitter is drawn uniformly from `[0, jitter_factor * delay]`
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            timeout: Duration::from_secs(300),
            strategy: BackoffStrategy::Exponential,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    pub fn validate(&self) -> Result<(), ResilienceError> {
        if self.max_retries == 0 {
            return Err(ResilienceError::InvalidConfig(
                "max_retries must be greater than 0".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(ResilienceError::InvalidConfig(
                "timeout must be greater than 0".to_string(),
            ));
        }
        if self.max_delay < self.base_delay {
            return Err(ResilienceError::InvalidConfig(
                "max_delay must not be smaller than base_delay".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ResilienceError::InvalidConfig(
                "jitter_factor must be within [0, 1]".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply per-call overrides on top of these defaults
    pub fn merged(&self, options: Option<&RetryOptions>) -> RetryPolicy {
        let Some(opts) = options else {
            return self.clone();
        };
        RetryPolicy {
            max_retries: opts.max_retries.unwrap_or(self.max_retries),
            timeout: opts.timeout.unwrap_or(self.timeout),
            strategy: opts.strategy.unwrap_or(self.strategy),
            base_delay: opts.base_delay.unwrap_or(self.base_delay),
            max_delay: opts.max_delay.unwrap_or(self.max_delay),
            jitter_factor: opts.jitter_factor.unwrap_or(self.jitter_factor),
        }
    }

    /// Delay for `attempt` before jitter and clamping
    pub fn raw_delay(&self, attempt: u32) -> Duration {
        let secs = self.base_delay.as_secs_f64() * self.strategy.multiplier(attempt);
        self.clamp(secs)
    }

    /// Delay for `attempt` with jitter, clamped to `max_delay`
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let raw = self.base_delay.as_secs_f64() * self.strategy.multiplier(attempt);
        let jitter_span = raw * self.jitter_factor;
        let jitter = if jitter_span.is_finite() && jitter_span > 0.0 {
            rand::rng().random_range(0.0..=jitter_span)
        } else {
            0.0
        };
        self.clamp(raw + jitter)
    }

    fn clamp(&self, secs: f64) -> Duration {
        let max = self.max_delay.as_secs_f64();
        if !secs.is_finite() || secs >= max {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs.max(0.0))
        }
    }
}

/// Per-call overrides; `None` keeps the engine default
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryOptions {
    pub max_retries: Option<u32>,
    pub timeout: Option<Duration>,
    pub strategy: Option<BackoffStrategy>,
    pub base_delay: Option<Duration>,
    pub max_delay: Option<Duration>,
    pub jitter_factor: Option<f64>,
}

impl RetryOptions {
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = Some(base_delay);
        self
    }

    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    pub fn jitter_factor(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = Some(jitter_factor);
        self
    }
}

/// Builder wiring the shared collaborators into a [`RetryEngine`]
pub struct RetryEngineBuilder {
    policy: RetryPolicy,
    breaker_config: CircuitBreakerConfig,
    health: Arc<dyn HealthReporter>,
    hook: Arc<dyn PreRequestHook>,
}

impl RetryEngineBuilder {
    pub fn breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker_config = config;
        self
    }

    pub fn health_reporter(mut self, health: Arc<dyn HealthReporter>) -> Self {
        self.health = health;
        self
    }

    pub fn pre_request_hook(mut self, hook: Arc<dyn PreRequestHook>) -> Self {
        self.hook = hook;
        self
    }

    pub fn build(self) -> RetryEngine {
        RetryEngine {
            policy: self.policy,
            breaker_config: self.breaker_config,
            breakers: Mutex::new(HashMap::new()),
            health: self.health,
            hook: self.hook,
        }
    }
}

/// Retries async operations with backoff, circuit breaking and health reporting
pub struct RetryEngine {
    policy: RetryPolicy,
    breaker_config: CircuitBreakerConfig,
    breakers: Mutex<HashMap<String, CircuitBreaker>>,
    health: Arc<dyn HealthReporter>,
    hook: Arc<dyn PreRequestHook>,
}

impl std::fmt::Debug for RetryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryEngine")
            .field("policy", &self.policy)
            .field("breaker_config", &self.breaker_config)
            .finish_non_exhaustive()
    }
}

impl RetryEngine {
    pub fn builder(policy: RetryPolicy) -> RetryEngineBuilder {
        RetryEngineBuilder {
            policy,
            breaker_config: CircuitBreakerConfig::default(),
            health: Arc::new(NoopHealthReporter),
            hook: Arc::new(NoopHook),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The breaker dedicated to `operation_name`, created on first use
    pub async fn breaker(&self, operation_name: &str) -> CircuitBreaker {
        let mut breakers = self.breakers.lock().await;
        breakers
            .entry(operation_name.to_string())
            .or_insert_with(|| CircuitBreaker::new(operation_name, self.breaker_config.clone()))
            .clone()
    }

    /// Current breaker state for `operation_name`, if it has ever run
    pub async fn breaker_state(&self, operation_name: &str) -> Option<CircuitState> {
        let breaker = {
            let breakers = self.breakers.lock().await;
            breakers.get(operation_name).cloned()
        };
        match breaker {
            Some(breaker) => Some(breaker.get_state().await),
            None => None,
        }
    }

    /// Retry `op` with the engine defaults
    pub async fn retry<F, Fut, T>(&self, operation_name: &str, op: F) -> Result<T, ResilienceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ResilienceError>>,
    {
        self.retry_with(operation_name, None, op).await
    }

    /// Retry `op`, overriding the engine defaults with `options`
    pub async fn retry_with<F, Fut, T>(
        &self,
        operation_name: &str,
        options: Option<&RetryOptions>,
        mut op: F,
    ) -> Result<T, ResilienceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ResilienceError>>,
    {
        let policy = self.policy.merged(options);
        let breaker = self.breaker(operation_name).await;
        let start = Instant::now();
        let mut attempts: u32 = 0;
        let mut last_error: Option<ResilienceError> = None;

        while attempts < policy.max_retries {
            if !breaker.can_request().await {
                attempts += 1;
                warn!(
                    operation = operation_name,
                    attempts, "Circuit breaker is open, failing fast"
                );
                self.health
                    .record_error(operation_name, "circuit breaker open")
                    .await;
                return Err(ResilienceError::CircuitOpen {
                    operation: operation_name.to_string(),
                    attempts,
                });
            }

            let outcome = match self.hook.apply().await {
                Err(e) => Err(ResilienceError::Hook(format!("{:#}", e))),
                Ok(()) => match tokio::time::timeout(policy.timeout, op()).await {
                    Ok(result) => result,
                    Err(_) => Err(ResilienceError::Timeout(policy.timeout)),
                },
            };

            match outcome {
                Ok(value) => {
                    breaker.record_success().await;
                    info!(
                        operation = operation_name,
                        attempts,
                        duration_secs = start.elapsed().as_secs_f64(),
                        "Success after {} failed attempts",
                        attempts
                    );
                    self.health.record_success(operation_name).await;
                    return Ok(value);
                }
                Err(e) if e.is_transient() => {
                    attempts += 1;
                    breaker.record_failure().await;
                    warn!(
                        operation = operation_name,
                        attempt = attempts,
                        error = %e,
                        "Operation timed out or hit a transient error, retrying immediately"
                    );
                    last_error = Some(e);
                }
                Err(e) => {
                    attempts += 1;
                    breaker.record_failure().await;

                    if attempts >= policy.max_retries {
                        last_error = Some(e);
                        break;
                    }

                    let delay = policy.calculate_delay(attempts);
                    warn!(
                        operation = operation_name,
                        attempt = attempts,
                        delay_secs = delay.as_secs_f64(),
                        error = %e,
                        "Retry attempt {}, delay: {:.2}s",
                        attempts,
                        delay.as_secs_f64()
                    );
                    last_error = Some(e);
                    tokio::time::sleep(delay).await;
                }
            }
        }

        let last_error = last_error
            .unwrap_or_else(|| ResilienceError::Failed("no attempt was made".to_string()));
        error!(
            operation = operation_name,
            attempts,
            duration_secs = start.elapsed().as_secs_f64(),
            error = %last_error,
            "Failure after {} attempts",
            attempts
        );
        self.health
            .record_error(operation_name, &last_error.to_string())
            .await;

        Err(ResilienceError::RetriesExhausted {
            message: format!("Max retries reached ({})", policy.max_retries),
            last_error: Box::new(last_error),
            attempts,
        })
    }

    /// Run `op` through [`RetryEngine::retry`] on a background task after `delay`
    pub fn schedule<F, Fut, T>(
        self: &Arc<Self>,
        operation_name: impl Into<String>,
        delay: Duration,
        op: F,
    ) -> JoinHandle<Result<T, ResilienceError>>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ResilienceError>> + Send + 'static,
        T: Send + 'static,
    {
        let engine = Arc::clone(self);
        let operation_name = operation_name.into();
        info!(
            operation = %operation_name,
            delay_secs = delay.as_secs_f64(),
            "Scheduling retry"
        );
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            engine.retry(&operation_name, op).await
        })
    }
}
