use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use slotline_core_resilience::AggregateHealth;

/// `GET /api/health_check`: aggregate health, 200 when healthy and 503 otherwise
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<AggregateHealth>) {
    let snapshot = state.monitor.get_status().await;
    let code = if snapshot.status.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(snapshot))
}

/// `GET /`: liveness page
pub async fn index(State(state): State<AppState>) -> String {
    format!("{} is running", state.service_name)
}
