//! Slotline Server: the bot's only externally observable surface
//!
//! - `GET /api/health_check` returns the aggregate health snapshot as JSON,
//!   with `200 OK` when healthy and `503 Service Unavailable` otherwise
//! - `GET /` is a plain-text liveness page

pub mod api;
pub mod error;
pub mod state;

pub use error::{ServerError, ServerResult};
pub use state::AppState;

use axum::{routing::get, Router};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;

/// Bind address for the HTTP surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> ServerResult<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse().map_err(|_| ServerError::InvalidAddress(addr))
    }
}

/// Build the router without binding a socket
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(api::index))
        .route("/api/health_check", get(api::health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn start_server<F>(config: ServerConfig, state: AppState, shutdown: F) -> ServerResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;

    tracing::info!("Slotline listening on http://{}", addr);
    tracing::info!("   Health: http://{}/api/health_check", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use slotline_core_resilience::{ProbeOutcome, SystemHealth};
    use slotline_sentinel::{ComponentProbe, HealthMonitor, HealthPolicy, SystemSampler};
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    struct FixedProbe(u16);

    #[async_trait]
    impl ComponentProbe for FixedProbe {
        async fn probe(&self, _url: &str, _timeout: Duration) -> ProbeOutcome {
            if self.0 == 200 {
                ProbeOutcome::Ok { response_time: 0.01 }
            } else {
                ProbeOutcome::Status {
                    code: self.0,
                    response_time: 0.01,
                }
            }
        }
    }

    struct IdleHost;

    #[async_trait]
    impl SystemSampler for IdleHost {
        async fn sample(&self) -> anyhow::Result<SystemHealth> {
            Ok(SystemHealth::default())
        }
    }

    fn state(code: u16) -> AppState {
        let mut endpoints = BTreeMap::new();
        endpoints.insert("portal".to_string(), "http://portal".to_string());
        let policy = HealthPolicy {
            endpoints,
            recovery_max_retries: 1,
            ..Default::default()
        };
        let monitor =
            HealthMonitor::new(policy, Arc::new(FixedProbe(code)), Arc::new(IdleHost)).unwrap();
        AppState::new(Arc::new(monitor))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health_check_ok_when_healthy() {
        let state = state(200);
        state.monitor.perform_check().await;

        let (status, body) = get_json(router(state), "/api/health_check").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["components"]["portal"]["status"], "healthy");
    }

    #[tokio::test]
    async fn test_health_check_unavailable_when_degraded() {
        let state = state(503);
        state.monitor.perform_check().await;

        let (status, body) = get_json(router(state), "/api/health_check").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "degraded");
    }

    #[tokio::test]
    async fn test_health_check_unavailable_before_first_check() {
        let (status, body) = get_json(router(state(200)), "/api/health_check").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "unknown");
    }

    #[tokio::test]
    async fn test_liveness_page() {
        let response = router(state(200))
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"Slotline booking bot is running");
    }

    #[test]
    fn test_server_config_addr() {
        assert_eq!(
            ServerConfig::default().socket_addr().unwrap(),
            "127.0.0.1:5000".parse().unwrap()
        );
        let bad = ServerConfig {
            host: "not a host".to_string(),
            port: 1,
        };
        assert!(matches!(bad.socket_addr(), Err(ServerError::InvalidAddress(_))));
    }
}
