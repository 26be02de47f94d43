//! Shared state for the HTTP handlers

use slotline_sentinel::HealthMonitor;
use std::sync::Arc;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// The process-wide health monitor
    pub monitor: Arc<HealthMonitor>,

    /// Name shown on the liveness page
    pub service_name: Arc<str>,
}

impl AppState {
    pub fn new(monitor: Arc<HealthMonitor>) -> Self {
        Self {
            monitor,
            service_name: Arc::from("Slotline booking bot"),
        }
    }
}
