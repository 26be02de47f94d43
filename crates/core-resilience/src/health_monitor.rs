//! Health Ledger: aggregated component and system health
//!
//! The ledger is a pure-logic state machine. It receives probe outcomes,
//! error reports and system samples from the caller and derives the overall
//! status and advisories. Issuing probes, sampling the host and acting on the
//! result (recovery, restarts) is the caller's job.
//!
//! # Example
//!
//! ```
//! use slotline_core_resilience::health_monitor::{
//!     Advisory, HealthLedger, HealthStatus, HealthThresholds, ProbeOutcome, SystemHealth,
//! };
//! use chrono::Utc;
//!
//! let mut ledger = HealthLedger::new(HealthThresholds::default());
//!
//! ledger.record_probe("portal", ProbeOutcome::Ok { response_time: 0.2 }, Utc::now());
//! let advisories = ledger.check_system(SystemHealth {
//!     cpu_usage: 0.95,
//!     memory_usage: 0.40,
//!     disk_usage: 0.50,
//!     ..Default::default()
//! });
//! assert!(advisories.iter().any(|a| matches!(a, Advisory::CpuHigh { .. })));
//!
//! let status = ledger.complete_cycle(Utc::now(), None);
//! assert_eq!(status, HealthStatus::Degraded);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Health of one component or of the whole system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
    Unknown,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Critical => "critical",
            HealthStatus::Unknown => "unknown",
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last observed state of a monitored component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    /// Probe round trip in seconds; `None` when the probe never completed
    pub response_time: Option<f64>,
    pub last_checked: DateTime<Utc>,
    pub error: Option<String>,
}

/// Host resource usage, fractions in `[0, 1]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemHealth {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub disk_usage: f64,
    /// Seconds, when a latency probe was available
    pub network_latency: Option<f64>,
    pub uptime_secs: u64,
}

/// Result of a single component probe
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    /// HTTP 200
    Ok { response_time: f64 },
    /// Any other HTTP status
    Status { code: u16, response_time: f64 },
    /// Timeout, connection failure or any other exception
    Failed { error: String },
}

/// Thresholds deciding when the system stops being healthy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthThresholds {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub disk_usage: f64,
    pub error_rate: f64,
    /// Consecutive failed probes after which a component is Critical
    pub component_failure_threshold: u32,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            cpu_usage: 0.9,
            memory_usage: 0.9,
            disk_usage: 0.9,
            error_rate: 0.1,
            component_failure_threshold: 5,
        }
    }
}

/// Advisory produced by the ledger
#[derive(Debug, Clone, PartialEq)]
pub enum Advisory {
    CpuHigh { usage: f64, threshold: f64 },
    MemoryHigh { usage: f64, threshold: f64 },
    DiskHigh { usage: f64, threshold: f64 },
    ErrorRateHigh { rate: f64, threshold: f64 },
    /// Nothing above threshold
    Healthy,
}

impl std::fmt::Display for Advisory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Advisory::CpuHigh { usage, threshold } => write!(
                f,
                "High CPU usage: {:.1}% (threshold {:.1}%)",
                usage * 100.0,
                threshold * 100.0
            ),
            Advisory::MemoryHigh { usage, threshold } => write!(
                f,
                "High memory usage: {:.1}% (threshold {:.1}%)",
                usage * 100.0,
                threshold * 100.0
            ),
            Advisory::DiskHigh { usage, threshold } => write!(
                f,
                "High disk usage: {:.1}% (threshold {:.1}%)",
                usage * 100.0,
                threshold * 100.0
            ),
            Advisory::ErrorRateHigh { rate, threshold } => write!(
                f,
                "High error rate: {:.1}% (threshold {:.1}%)",
                rate * 100.0,
                threshold * 100.0
            ),
            Advisory::Healthy => f.write_str("healthy"),
        }
    }
}

/// Serializable point-in-time view of the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateHealth {
    pub status: HealthStatus,
    pub components: BTreeMap<String, ComponentHealth>,
    pub system: Option<SystemHealth>,
    pub error_counts: BTreeMap<String, u64>,
    pub error_rate: f64,
    pub total_checks: u64,
    pub last_check: Option<DateTime<Utc>>,
    /// Seconds spent in the last check cycle
    pub check_duration: Option<f64>,
}

/// Counters describing ledger activity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HealthLedgerStats {
    pub check_count: u64,
    /// Advisories produced, excluding `Healthy`
    pub advisory_count: u64,
}

/// Aggregates component probes, error counters and host samples
#[derive(Debug, Clone)]
pub struct HealthLedger {
    thresholds: HealthThresholds,
    components: BTreeMap<String, ComponentHealth>,
    error_counts: BTreeMap<String, u64>,
    consecutive_failures: HashMap<String, u32>,
    system: Option<SystemHealth>,
    total_checks: u64,
    status: HealthStatus,
    last_check: Option<DateTime<Utc>>,
    check_duration: Option<f64>,
    advisory_count: u64,
}

impl HealthLedger {
    pub fn new(thresholds: HealthThresholds) -> Self {
        Self {
            thresholds,
            components: BTreeMap::new(),
            error_counts: BTreeMap::new(),
            consecutive_failures: HashMap::new(),
            system: None,
            total_checks: 0,
            status: HealthStatus::Unknown,
            last_check: None,
            check_duration: None,
            advisory_count: 0,
        }
    }

    pub fn thresholds(&self) -> &HealthThresholds {
        &self.thresholds
    }

    /// Status computed by the last [`HealthLedger::complete_cycle`]
    pub fn status(&self) -> HealthStatus {
        self.status
    }

    pub fn total_checks(&self) -> u64 {
        self.total_checks
    }

    pub fn error_counts(&self) -> &BTreeMap<String, u64> {
        &self.error_counts
    }

    pub fn component(&self, name: &str) -> Option<&ComponentHealth> {
        self.components.get(name)
    }

    /// Components whose last probe was not healthy
    pub fn unhealthy_components(&self) -> Vec<String> {
        self.components
            .iter()
            .filter(|(_, health)| !health.status.is_healthy())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Apply one probe outcome and return the component's new status
    pub fn record_probe(
        &mut self,
        component: &str,
        outcome: ProbeOutcome,
        at: DateTime<Utc>,
    ) -> HealthStatus {
        let health = match outcome {
            ProbeOutcome::Ok { response_time } => {
                self.error_counts.insert(component.to_string(), 0);
                self.consecutive_failures.remove(component);
                ComponentHealth {
                    status: HealthStatus::Healthy,
                    response_time: Some(response_time),
                    last_checked: at,
                    error: None,
                }
            }
            ProbeOutcome::Status {
                code,
                response_time,
            } => {
                let streak = self.bump_failure(component);
                let status = if streak >= self.thresholds.component_failure_threshold {
                    HealthStatus::Critical
                } else {
                    HealthStatus::Degraded
                };
                ComponentHealth {
                    status,
                    response_time: Some(response_time),
                    last_checked: at,
                    error: Some(format!("HTTP {}", code)),
                }
            }
            ProbeOutcome::Failed { error } => {
                self.bump_failure(component);
                ComponentHealth {
                    status: HealthStatus::Critical,
                    response_time: None,
                    last_checked: at,
                    error: Some(error),
                }
            }
        };

        let status = health.status;
        self.components.insert(component.to_string(), health);
        status
    }

    fn bump_failure(&mut self, component: &str) -> u32 {
        *self.error_counts.entry(component.to_string()).or_insert(0) += 1;
        let streak = self
            .consecutive_failures
            .entry(component.to_string())
            .or_insert(0);
        *streak = streak.saturating_add(1);
        *streak
    }

    /// Count an error reported by another subsystem
    pub fn record_error(&mut self, component: &str) -> u64 {
        let count = self.error_counts.entry(component.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Reset the error counter of `component`
    pub fn record_success(&mut self, component: &str) {
        self.error_counts.insert(component.to_string(), 0);
    }

    /// Restore counters persisted by a previous run
    ///
    /// `total_checks` is set to the sum of the restored counts so the error
    /// rate starts out at most `1 / components`.
    pub fn restore_error_counts(&mut self, counts: BTreeMap<String, u64>) {
        self.total_checks = counts.values().sum();
        self.error_counts = counts;
    }

    /// Errors per check per component, guarded and clamped to `[0, 1]`
    pub fn error_rate(&self) -> f64 {
        let components = self.error_counts.len() as u64;
        if components == 0 {
            return 0.0;
        }
        let total_errors: u64 = self.error_counts.values().sum();
        let denominator = self.total_checks.max(1).saturating_mul(components);
        (total_errors as f64 / denominator as f64).clamp(0.0, 1.0)
    }

    /// Store a host sample and return the resource advisories it triggers
    pub fn check_system(&mut self, sample: SystemHealth) -> Vec<Advisory> {
        let advisories = self.resource_advisories(&sample);
        self.advisory_count += advisories.len() as u64;
        self.system = Some(sample);
        advisories
    }

    fn resource_advisories(&self, sample: &SystemHealth) -> Vec<Advisory> {
        let t = &self.thresholds;
        let mut advisories = Vec::new();
        if sample.cpu_usage > t.cpu_usage {
            advisories.push(Advisory::CpuHigh {
                usage: sample.cpu_usage,
                threshold: t.cpu_usage,
            });
        }
        if sample.memory_usage > t.memory_usage {
            advisories.push(Advisory::MemoryHigh {
                usage: sample.memory_usage,
                threshold: t.memory_usage,
            });
        }
        if sample.disk_usage > t.disk_usage {
            advisories.push(Advisory::DiskHigh {
                usage: sample.disk_usage,
                threshold: t.disk_usage,
            });
        }
        advisories
    }

    /// Every advisory that currently applies, or a single `Healthy`
    pub fn advisories(&self) -> Vec<Advisory> {
        let mut advisories = self
            .system
            .as_ref()
            .map(|s| self.resource_advisories(s))
            .unwrap_or_default();

        let rate = self.error_rate();
        if rate >= self.thresholds.error_rate {
            advisories.push(Advisory::ErrorRateHigh {
                rate,
                threshold: self.thresholds.error_rate,
            });
        }

        if advisories.is_empty() {
            advisories.push(Advisory::Healthy);
        }
        advisories
    }

    /// Overall status derived from the current state
    pub fn evaluate(&self) -> HealthStatus {
        if self.components.is_empty() && self.error_counts.is_empty() {
            return HealthStatus::Unknown;
        }

        if self
            .components
            .values()
            .any(|c| c.status == HealthStatus::Critical)
        {
            return HealthStatus::Critical;
        }

        let components_ok = self.components.values().all(|c| c.status.is_healthy());
        let error_rate_ok = self.error_rate() < self.thresholds.error_rate;
        let system_ok = self
            .system
            .as_ref()
            .map(|s| self.resource_advisories(s).is_empty())
            .unwrap_or(true);

        if components_ok && error_rate_ok && system_ok {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        }
    }

    /// Close a check cycle: count it, recompute and store the overall status
    pub fn complete_cycle(&mut self, at: DateTime<Utc>, duration_secs: Option<f64>) -> HealthStatus {
        self.total_checks += 1;
        self.last_check = Some(at);
        self.check_duration = duration_secs;
        self.status = self.evaluate();
        self.status
    }

    /// Recompute the stored status without counting a new cycle
    pub fn refresh_status(&mut self) -> HealthStatus {
        self.status = self.evaluate();
        self.status
    }

    pub fn snapshot(&self) -> AggregateHealth {
        AggregateHealth {
            status: self.status,
            components: self.components.clone(),
            system: self.system.clone(),
            error_counts: self.error_counts.clone(),
            error_rate: self.error_rate(),
            total_checks: self.total_checks,
            last_check: self.last_check,
            check_duration: self.check_duration,
        }
    }

    pub fn stats(&self) -> HealthLedgerStats {
        HealthLedgerStats {
            check_count: self.total_checks,
            advisory_count: self.advisory_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> HealthLedger {
        HealthLedger::new(HealthThresholds::default())
    }

    fn calm() -> SystemHealth {
        SystemHealth {
            cpu_usage: 0.2,
            memory_usage: 0.3,
            disk_usage: 0.4,
            network_latency: Some(0.05),
            uptime_secs: 100,
        }
    }

    #[test]
    fn test_empty_ledger_is_unknown() {
        let mut ledger = ledger();
        assert_eq!(ledger.evaluate(), HealthStatus::Unknown);
        assert_eq!(ledger.complete_cycle(Utc::now(), None), HealthStatus::Unknown);
        assert_eq!(ledger.error_rate(), 0.0);
    }

    #[test]
    fn test_healthy_system() {
        let mut ledger = ledger();
        ledger.record_probe("portal", ProbeOutcome::Ok { response_time: 0.1 }, Utc::now());
        assert!(ledger.check_system(calm()).is_empty());

        assert_eq!(ledger.complete_cycle(Utc::now(), Some(0.3)), HealthStatus::Healthy);
        assert_eq!(ledger.advisories(), vec![Advisory::Healthy]);
    }

    #[test]
    fn test_non_200_degrades_then_critical_at_threshold() {
        let mut ledger = ledger();
        let outcome = ProbeOutcome::Status {
            code: 503,
            response_time: 0.4,
        };

        for _ in 0..4 {
            assert_eq!(
                ledger.record_probe("portal", outcome.clone(), Utc::now()),
                HealthStatus::Degraded
            );
            ledger.complete_cycle(Utc::now(), None);
        }
        assert_eq!(ledger.status(), HealthStatus::Degraded);

        assert_eq!(
            ledger.record_probe("portal", outcome, Utc::now()),
            HealthStatus::Critical
        );
        assert_eq!(ledger.complete_cycle(Utc::now(), None), HealthStatus::Critical);
        assert_eq!(ledger.error_counts().get("portal"), Some(&5));
        assert_eq!(ledger.unhealthy_components(), vec!["portal".to_string()]);
    }

    #[test]
    fn test_exception_is_critical_immediately() {
        let mut ledger = ledger();
        let status = ledger.record_probe(
            "portal",
            ProbeOutcome::Failed {
                error: "timed out".into(),
            },
            Utc::now(),
        );
        assert_eq!(status, HealthStatus::Critical);
        assert_eq!(ledger.component("portal").unwrap().response_time, None);
    }

    #[test]
    fn test_successful_probe_resets_errors() {
        let mut ledger = ledger();
        ledger.record_probe("portal", ProbeOutcome::Failed { error: "x".into() }, Utc::now());
        ledger.record_probe("portal", ProbeOutcome::Ok { response_time: 0.1 }, Utc::now());

        assert_eq!(ledger.error_counts().get("portal"), Some(&0));
        assert_eq!(
            ledger.component("portal").unwrap().status,
            HealthStatus::Healthy
        );
    }

    #[test]
    fn test_error_rate_is_clamped() {
        let mut ledger = ledger();
        for _ in 0..10 {
            ledger.record_error("book_slot");
        }
        // no completed cycles yet
        assert_eq!(ledger.error_rate(), 1.0);

        ledger.record_success("book_slot");
        assert_eq!(ledger.error_rate(), 0.0);
    }

    #[test]
    fn test_error_rate_formula() {
        let mut ledger = ledger();
        ledger.record_error("login");
        ledger.record_success("slots");
        for _ in 0..5 {
            ledger.complete_cycle(Utc::now(), None);
        }
        // 1 error / (5 checks * 2 components)
        assert!((ledger.error_rate() - 0.1).abs() < 1e-9);
        assert!(ledger
            .advisories()
            .iter()
            .any(|a| matches!(a, Advisory::ErrorRateHigh { .. })));
    }

    #[test]
    fn test_errors_without_components_degrade() {
        let mut ledger = ledger();
        ledger.record_error("book_slot");
        assert_eq!(ledger.complete_cycle(Utc::now(), None), HealthStatus::Degraded);
    }

    #[test]
    fn test_resource_breach_degrades() {
        let mut ledger = ledger();
        ledger.record_probe("portal", ProbeOutcome::Ok { response_time: 0.1 }, Utc::now());
        let advisories = ledger.check_system(SystemHealth {
            disk_usage: 0.97,
            memory_usage: 0.95,
            ..calm()
        });

        assert_eq!(advisories.len(), 2);
        assert_eq!(ledger.evaluate(), HealthStatus::Degraded);
        assert_eq!(ledger.stats().advisory_count, 2);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let mut ledger = ledger();
        let advisories = ledger.check_system(SystemHealth {
            cpu_usage: 0.9,
            ..calm()
        });
        assert!(advisories.is_empty());
    }

    #[test]
    fn test_restore_error_counts() {
        let mut ledger = ledger();
        let mut counts = BTreeMap::new();
        counts.insert("login".to_string(), 3);
        counts.insert("portal".to_string(), 1);

        ledger.restore_error_counts(counts);

        assert_eq!(ledger.total_checks(), 4);
        // 4 errors / (4 checks * 2 components)
        assert!((ledger.error_rate() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut ledger = ledger();
        ledger.record_probe("portal", ProbeOutcome::Ok { response_time: 0.1 }, Utc::now());
        ledger.check_system(calm());
        ledger.complete_cycle(Utc::now(), Some(0.25));

        let snapshot = ledger.snapshot();
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["components"]["portal"]["status"], "healthy");
        assert_eq!(json["check_duration"], 0.25);

        let back: AggregateHealth = serde_json::from_value(json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_advisory_display() {
        let advisory = Advisory::CpuHigh {
            usage: 0.95,
            threshold: 0.9,
        };
        assert_eq!(advisory.to_string(), "High CPU usage: 95.0% (threshold 90.0%)");
    }
}
