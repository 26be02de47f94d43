//! Health check metrics
//!
//! Reports produced by a single check cycle and the booking-cycle summaries
//! recorded alongside them.

use serde::{Deserialize, Serialize};
use slotline_core_resilience::{Advisory, HealthStatus};
use std::time::Duration;

/// Outcome of one recovery pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecoveryReport {
    /// Components that answered 200 during recovery
    pub recovered: Vec<String>,
    /// Components still failing after every re-probe
    pub failed: Vec<String>,
}

impl RecoveryReport {
    pub fn attempted(&self) -> usize {
        self.recovered.len() + self.failed.len()
    }

    /// Fraction of recovered components (1.0 when nothing needed recovery)
    pub fn success_rate(&self) -> f64 {
        let attempted = self.attempted();
        if attempted == 0 {
            1.0
        } else {
            self.recovered.len() as f64 / attempted as f64
        }
    }
}

/// Result of one health check cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CheckReport {
    pub status: HealthStatus,
    pub previous: HealthStatus,
    pub components_checked: usize,
    pub unhealthy: Vec<String>,
    pub advisories: Vec<Advisory>,
    pub recovery: Option<RecoveryReport>,
    pub duration: Duration,
}

impl CheckReport {
    pub fn status_changed(&self) -> bool {
        self.status != self.previous
    }

    /// Format a human-readable summary
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Health check: {} | {} components | {} unhealthy | {:.2}s",
            self.status,
            self.components_checked,
            self.unhealthy.len(),
            self.duration.as_secs_f64()
        );
        if let Some(recovery) = &self.recovery {
            summary.push_str(&format!(
                " | Recovery: {}/{}",
                recovery.recovered.len(),
                recovery.attempted()
            ));
        }
        summary
    }
}

/// Booking counters recorded into the health history after each cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub total_attempts: u64,
    pub successful_bookings: u64,
    pub failed_bookings: u64,
    pub success_rate: f64,
}
