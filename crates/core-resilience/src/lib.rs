//! Slotline Core Resilience: Pure-logic fault tolerance primitives
//!
//! # Overview
//!
//! This crate provides the building blocks the booking bot leans on when the
//! portal it talks to is slow, flaky or actively pushing back:
//!
//! - **Retry Engine**: Bounded attempts with linear/exponential/fibonacci/fixed backoff and jitter
//! - **Circuit Breaker**: Per-operation fail-fast gate (Closed, Open, HalfOpen)
//! - **Rate Limiter**: Token bucket ceiling shared by every booking request
//! - **Keyed Locks**: Sharded mutex pool giving per-slot mutual exclusion in bounded memory
//! - **Health Ledger**: Component/system health aggregation with typed advisories
//!
//! # Key Principles
//!
//! This crate has zero knowledge of:
//! - Browsers, HTTP clients or the portal being automated
//! - Where health history or statistics are persisted
//!
//! Collaborators are injected through the [`HealthReporter`] and
//! [`PreRequestHook`] traits, one shared instance each.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Booking Orchestrator            │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Keyed Locks + Rate Limiter        │  ← One attempt per slot, bounded rate
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Retry Engine                      │  ← Backoff, deadlines
//! │   ┌─────────────────────────────────┐   │
//! │   │  Circuit Breaker (per op name)  │   │  ← Fail-fast protection
//! │   └─────────────────────────────────┘   │
//! └─────────────┬───────────────────────────┘
//!               │ success / exhaustion
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       HealthReporter → Health Ledger    │  ← Aggregate status, advisories
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage Example
//!
//! ```no_run
//! use slotline_core_resilience::{
//!     BackoffStrategy, CircuitBreakerConfig, ResilienceError, RetryEngine, RetryPolicy,
//! };
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), ResilienceError> {
//! let policy = RetryPolicy {
//!     max_retries: 3,
//!     strategy: BackoffStrategy::Exponential,
//!     base_delay: Duration::from_secs(5),
//!     ..Default::default()
//! };
//!
//! let engine = RetryEngine::builder(policy)
//!     .breaker_config(CircuitBreakerConfig {
//!         failure_threshold: 5,
//!         reset_timeout: Duration::from_secs(30),
//!     })
//!     .build();
//!
//! let result = engine.retry("login", || async {
//!     Ok::<_, ResilienceError>(true)
//! }).await?;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod error;
pub mod health_monitor;
pub mod hooks;
pub mod keyed_lock;
pub mod rate_limiter;
pub mod retry;

// Re-export main types for convenience
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use error::ResilienceError;
pub use health_monitor::{
    Advisory, AggregateHealth, ComponentHealth, HealthLedger, HealthStatus, HealthThresholds,
    ProbeOutcome, SystemHealth,
};
pub use hooks::{HealthReporter, NoopHealthReporter, NoopHook, PreRequestHook};
pub use keyed_lock::KeyedLocks;
pub use rate_limiter::RateLimiter;
pub use retry::{BackoffStrategy, RetryEngine, RetryEngineBuilder, RetryOptions, RetryPolicy};

/// Prelude module for convenient imports
///
/// # Example
/// ```
/// use slotline_core_resilience::prelude::*;
/// ```
pub mod prelude {
    pub use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
    pub use super::error::ResilienceError;
    pub use super::health_monitor::{AggregateHealth, HealthLedger, HealthStatus};
    pub use super::hooks::{HealthReporter, PreRequestHook};
    pub use super::keyed_lock::KeyedLocks;
    pub use super::rate_limiter::RateLimiter;
    pub use super::retry::{BackoffStrategy, RetryEngine, RetryOptions, RetryPolicy};
}
