//! Seams through which resilience primitives talk to the rest of the system
//!
//! The primitives in this crate never own a health monitor or a request
//! shaping layer. They receive one shared instance through these traits.

use async_trait::async_trait;

/// Sink for per-component success and error reports
#[async_trait]
pub trait HealthReporter: Send + Sync {
    /// Reset the error counter of `component`
    async fn record_success(&self, component: &str);

    /// Count an error against `component`
    async fn record_error(&self, component: &str, error: &str);
}

/// Side effect run before every guarded call (request shaping, pacing, proxy
/// rotation). A failure here counts as a failure of the call itself.
#[async_trait]
pub trait PreRequestHook: Send + Sync {
    async fn apply(&self) -> anyhow::Result<()>;
}

/// Reporter that drops every report
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHealthReporter;

#[async_trait]
impl HealthReporter for NoopHealthReporter {
    async fn record_success(&self, _component: &str) {}

    async fn record_error(&self, _component: &str, _error: &str) {}
}

/// Hook that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHook;

#[async_trait]
impl PreRequestHook for NoopHook {
    async fn apply(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
