//! Error types shared by every resilience primitive

use std::time::Duration;
use thiserror::Error;

/// Errors produced by guarded operations and the primitives wrapping them
#[derive(Debug, Clone, Error)]
pub enum ResilienceError {
    /// Network-level hiccup (timeout, connection reset, 5xx) worth re-probing immediately
    #[error("transient failure: {0}")]
    Transient(String),

    /// Any other operation failure; retried after a backoff delay
    #[error("operation failed: {0}")]
    Failed(String),

    /// The operation exceeded its deadline
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The circuit breaker for `operation` refused the request
    #[error("circuit breaker is open for '{operation}' (attempt {attempts})")]
    CircuitOpen { operation: String, attempts: u32 },

    /// All attempts were consumed without a success
    #[error("{message} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        message: String,
        last_error: Box<ResilienceError>,
        attempts: u32,
    },

    /// The pre-request hook failed before the operation could run
    #[error("pre-request hook failed: {0}")]
    Hook(String),

    /// A primitive was configured with invalid parameters
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ResilienceError {
    /// Transient failures are retried without waiting for the backoff delay
    pub fn is_transient(&self) -> bool {
        matches!(self, ResilienceError::Transient(_) | ResilienceError::Timeout(_))
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ResilienceError::CircuitOpen { .. })
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, ResilienceError::RetriesExhausted { .. })
    }

    /// Number of attempts recorded by terminal retry errors
    pub fn attempts(&self) -> Option<u32> {
        match self {
            ResilienceError::CircuitOpen { attempts, .. }
            | ResilienceError::RetriesExhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    /// Convert a collaborator error, keeping a wrapped `ResilienceError` intact
    pub fn from_anyhow(err: anyhow::Error) -> Self {
        match err.downcast::<ResilienceError>() {
            Ok(inner) => inner,
            Err(other) => ResilienceError::Failed(format!("{:#}", other)),
        }
    }
}
