//! Health Policy
//!
//! Defines the endpoints, thresholds and timings for the health monitor.

use serde::{Deserialize, Serialize};
use slotline_core_resilience::HealthThresholds;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Health monitor operational policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthPolicy {
    /// Check interval in seconds
    ///
    /// **Default:** 600 (10 minutes)
    pub check_interval_s: u64,

    /// Deadline for a single component probe, in seconds
    ///
    /// Probes answering slower than this are also logged as slow.
    ///
    /// **Default:** 30
    pub probe_timeout_s: u64,

    /// Component name to probe URL
    pub endpoints: BTreeMap<String, String>,

    /// URL used to estimate network latency during the system check
    pub network_check_url: Option<String>,

    /// Thresholds for the overall status
    pub thresholds: HealthThresholds,

    /// Re-probes per unhealthy component during recovery
    ///
    /// **Default:** 5
    pub recovery_max_retries: u32,

    /// Base of the exponential backoff between recovery probes, in seconds
    ///
    /// **Default:** 5
    pub recovery_base_delay_s: u64,

    /// Directory for the daily health history files; `None` disables persistence
    pub history_dir: Option<PathBuf>,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            check_interval_s: 600,
            probe_timeout_s: 30,
            endpoints: BTreeMap::new(),
            network_check_url: None,
            thresholds: HealthThresholds::default(),
            recovery_max_retries: 5,
            recovery_base_delay_s: 5,
            history_dir: None,
        }
    }
}

impl HealthPolicy {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_s)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_s)
    }

    pub fn recovery_base_delay(&self) -> Duration {
        Duration::from_secs(self.recovery_base_delay_s)
    }

    /// Validate the policy configuration
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.check_interval_s == 0 {
            return Err("check_interval_s must be greater than 0".to_string());
        }

        if self.probe_timeout_s == 0 {
            return Err("probe_timeout_s must be greater than 0".to_string());
        }

        if self.recovery_max_retries == 0 {
            return Err("recovery_max_retries must be at least 1".to_string());
        }

        if self.thresholds.component_failure_threshold == 0 {
            return Err("component_failure_threshold must be at least 1".to_string());
        }

        let t = &self.thresholds;
        for (name, value) in [
            ("cpu_usage", t.cpu_usage),
            ("memory_usage", t.memory_usage),
            ("disk_usage", t.disk_usage),
            ("error_rate", t.error_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("threshold {} must be within [0, 1]", name));
            }
        }

        if let Some((name, _)) = self.endpoints.iter().find(|(_, url)| url.trim().is_empty()) {
            return Err(format!("endpoint '{}' has an empty URL", name));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = HealthPolicy::default();

        assert_eq!(policy.check_interval(), Duration::from_secs(600));
        assert_eq!(policy.probe_timeout(), Duration::from_secs(30));
        assert_eq!(policy.recovery_max_retries, 5);
        assert_eq!(policy.thresholds.error_rate, 0.1);

        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_validation_failures() {
        let mut policy = HealthPolicy::default();

        policy.check_interval_s = 0;
        assert!(policy.validate().is_err());
        policy.check_interval_s = 600; // Reset

        policy.recovery_max_retries = 0;
        assert!(policy.validate().is_err());
        policy.recovery_max_retries = 5; // Reset

        policy.thresholds.cpu_usage = 1.5;
        assert!(policy.validate().is_err());
        policy.thresholds.cpu_usage = 0.9; // Reset

        policy
            .endpoints
            .insert("portal".to_string(), "  ".to_string());
        assert!(policy.validate().is_err());
    }
}
