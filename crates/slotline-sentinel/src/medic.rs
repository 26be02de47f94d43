//! Medic: Recovery Operations for Unhealthy Components
//!
//! The Medic re-probes a component that the last check found unhealthy,
//! backing off exponentially between attempts, until it answers 200 or the
//! attempts run out.

use crate::probe::ComponentProbe;
use anyhow::{anyhow, Result};
use slotline_core_resilience::ProbeOutcome;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Medic: Executes recovery probes
pub struct Medic {
    probe: Arc<dyn ComponentProbe>,
    max_retries: u32,
    base_delay: Duration,
    timeout: Duration,
}

impl Medic {
    pub fn new(
        probe: Arc<dyn ComponentProbe>,
        max_retries: u32,
        base_delay: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            probe,
            max_retries: max_retries.max(1),
            base_delay,
            timeout,
        }
    }

    /// Delay after failed attempt `i` (0-based): `base * 2^i`
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.min(16)))
    }

    /// Re-probe `component` until it answers 200
    ///
    /// # Returns
    ///
    /// The healthy probe outcome, or an error describing the last failure.
    pub async fn heal_component(&self, component: &str, url: &str) -> Result<ProbeOutcome> {
        info!("🚑 Medic: Attempting recovery of {}", component);
        let mut last_failure = String::from("no attempt made");

        for attempt in 0..self.max_retries {
            let outcome = self.probe.probe(url, self.timeout).await;
            match outcome {
                ProbeOutcome::Ok { .. } => {
                    info!(
                        "✅ Recovery successful for {} after {} attempts",
                        component,
                        attempt + 1
                    );
                    return Ok(outcome);
                }
                ProbeOutcome::Status { code, .. } => {
                    last_failure = format!("HTTP {}", code);
                }
                ProbeOutcome::Failed { error } => {
                    last_failure = error;
                }
            }
            debug!(component, attempt = attempt + 1, error = %last_failure, "Recovery probe failed");

            if attempt + 1 < self.max_retries {
                tokio::time::sleep(self.backoff(attempt)).await;
            }
        }

        error!("❌ Recovery failed for {}: {}", component, last_failure);
        Err(anyhow!(
            "recovery of {} failed after {} attempts: {}",
            component,
            self.max_retries,
            last_failure
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    /// Fails `failures` times, then answers 200
    struct FlakyProbe {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ComponentProbe for FlakyProbe {
        async fn probe(&self, _url: &str, _timeout: Duration) -> ProbeOutcome {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                ProbeOutcome::Status {
                    code: 503,
                    response_time: 0.1,
                }
            } else {
                ProbeOutcome::Ok { response_time: 0.1 }
            }
        }
    }

    fn medic(failures: u32, max_retries: u32) -> (Medic, Arc<FlakyProbe>) {
        let probe = Arc::new(FlakyProbe {
            failures,
            calls: AtomicU32::new(0),
        });
        let medic = Medic::new(
            probe.clone(),
            max_retries,
            Duration::from_secs(1),
            Duration::from_secs(5),
        );
        (medic, probe)
    }

    #[test]
    fn test_backoff_doubles() {
        let (medic, _) = medic(0, 3);
        assert_eq!(medic.backoff(0), Duration::from_secs(1));
        assert_eq!(medic.backoff(3), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_backoff() {
        let (medic, probe) = medic(2, 5);
        let start = Instant::now();

        let outcome = medic.heal_component("portal", "http://portal").await.unwrap();

        assert!(matches!(outcome, ProbeOutcome::Ok { .. }));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 3);
        // 1s + 2s of backoff
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_without_trailing_sleep() {
        let (medic, probe) = medic(u32::MAX, 3);
        let start = Instant::now();

        let err = medic
            .heal_component("portal", "http://portal")
            .await
            .unwrap_err();

        assert!(err.to_string().contains("HTTP 503"));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }
}
