//! Component probes
//!
//! A probe issues one bounded request against a component endpoint and turns
//! the answer into a [`ProbeOutcome`]. It never fails: transport errors and
//! timeouts are outcomes too.

use async_trait::async_trait;
use slotline_core_resilience::ProbeOutcome;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[async_trait]
pub trait ComponentProbe: Send + Sync {
    async fn probe(&self, url: &str, timeout: Duration) -> ProbeOutcome;
}

/// HTTP GET probe; only status 200 counts as healthy
#[derive(Debug, Clone, Default)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ComponentProbe for HttpProbe {
    async fn probe(&self, url: &str, timeout: Duration) -> ProbeOutcome {
        let start = Instant::now();
        let result = self.client.get(url).timeout(timeout).send().await;
        let response_time = start.elapsed().as_secs_f64();

        match result {
            Ok(response) if response.status() == reqwest::StatusCode::OK => {
                ProbeOutcome::Ok { response_time }
            }
            Ok(response) => ProbeOutcome::Status {
                code: response.status().as_u16(),
                response_time,
            },
            Err(e) if e.is_timeout() => {
                debug!(url, "Probe timed out");
                ProbeOutcome::Failed {
                    error: "Timeout".to_string(),
                }
            }
            Err(e) => ProbeOutcome::Failed {
                error: e.to_string(),
            },
        }
    }
}

/// Response time of a completed probe, if any
pub fn response_time(outcome: &ProbeOutcome) -> Option<f64> {
    match outcome {
        ProbeOutcome::Ok { response_time } | ProbeOutcome::Status { response_time, .. } => {
            Some(*response_time)
        }
        ProbeOutcome::Failed { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_time_extraction() {
        assert_eq!(response_time(&ProbeOutcome::Ok { response_time: 0.5 }), Some(0.5));
        assert_eq!(
            response_time(&ProbeOutcome::Status {
                code: 503,
                response_time: 1.5
            }),
            Some(1.5)
        );
        assert_eq!(
            response_time(&ProbeOutcome::Failed {
                error: "Timeout".into()
            }),
            None
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_failure() {
        let probe = HttpProbe::new();
        // port 9 (discard) on localhost is closed in test environments
        let outcome = probe
            .probe("http://127.0.0.1:9/health", Duration::from_secs(2))
            .await;
        assert!(matches!(outcome, ProbeOutcome::Failed { .. }));
    }
}
