//! Typed events broadcast by the health monitor

use serde::Serialize;
use slotline_core_resilience::HealthStatus;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HealthEvent {
    /// The overall status differs from the previous cycle
    StatusChanged { from: HealthStatus, to: HealthStatus },

    /// A cycle ended in Degraded or Critical
    Warning { status: HealthStatus, message: String },

    /// Recovery ran for the unhealthy components
    RecoveryAttempted {
        recovered: Vec<String>,
        failed: Vec<String>,
    },
}

impl HealthEvent {
    pub fn is_critical_warning(&self) -> bool {
        matches!(
            self,
            HealthEvent::Warning {
                status: HealthStatus::Critical,
                ..
            }
        )
    }
}
