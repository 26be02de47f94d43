//! Health Recovery Test
//!
//! Test Scenario:
//! 1. Setup: one "portal" component whose probe keeps answering 503
//! 2. Five consecutive checks with a component failure threshold of 5
//! 3. The first four checks leave the system Degraded
//! 4. The fifth check turns it Critical and recovery runs automatically
//! 5. Once the portal answers 200 again, recovery brings it back to Healthy

use async_trait::async_trait;
use slotline_core_resilience::{HealthStatus, ProbeOutcome, SystemHealth};
use slotline_sentinel::{ComponentProbe, HealthMonitor, HealthPolicy, SystemSampler};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct SwitchableProbe {
    code: AtomicU16,
    calls: AtomicU32,
}

#[async_trait]
impl ComponentProbe for SwitchableProbe {
    async fn probe(&self, _url: &str, _timeout: Duration) -> ProbeOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.code.load(Ordering::SeqCst) {
            200 => ProbeOutcome::Ok { response_time: 0.1 },
            code => ProbeOutcome::Status {
                code,
                response_time: 0.1,
            },
        }
    }
}

struct QuietHost;

#[async_trait]
impl SystemSampler for QuietHost {
    async fn sample(&self) -> anyhow::Result<SystemHealth> {
        Ok(SystemHealth {
            cpu_usage: 0.1,
            memory_usage: 0.1,
            disk_usage: 0.1,
            network_latency: None,
            uptime_secs: 1,
        })
    }
}

fn policy() -> HealthPolicy {
    let mut endpoints = BTreeMap::new();
    endpoints.insert("portal".to_string(), "http://portal/health".to_string());
    let mut policy = HealthPolicy {
        endpoints,
        recovery_max_retries: 3,
        recovery_base_delay_s: 1,
        ..Default::default()
    };
    policy.thresholds.component_failure_threshold = 5;
    policy
}

#[tokio::test(start_paused = true)]
async fn test_five_failed_probes_turn_critical_and_trigger_recovery() {
    let probe = Arc::new(SwitchableProbe {
        code: AtomicU16::new(503),
        calls: AtomicU32::new(0),
    });
    let monitor = HealthMonitor::new(policy(), probe.clone(), Arc::new(QuietHost)).unwrap();
    let mut events = monitor.subscribe();

    for cycle in 1..=4 {
        let report = monitor.perform_check().await;
        assert_eq!(report.status, HealthStatus::Degraded, "cycle {cycle}");
        assert!(report.recovery.is_some());
    }

    let report = monitor.perform_check().await;
    assert_eq!(report.status, HealthStatus::Critical);
    assert_eq!(report.previous, HealthStatus::Degraded);
    let recovery = report.recovery.expect("recovery runs on critical");
    assert_eq!(recovery.failed, vec!["portal".to_string()]);

    let mut critical_warning = false;
    while let Ok(event) = events.try_recv() {
        if event.is_critical_warning() {
            critical_warning = true;
        }
    }
    assert!(critical_warning);

    let snapshot = monitor.get_status().await;
    assert_eq!(snapshot.status, HealthStatus::Critical);
    assert_eq!(snapshot.components["portal"].status, HealthStatus::Critical);
}

#[tokio::test(start_paused = true)]
async fn test_recovery_restores_component() {
    let probe = Arc::new(SwitchableProbe {
        code: AtomicU16::new(500),
        calls: AtomicU32::new(0),
    });
    let monitor = HealthMonitor::new(policy(), probe.clone(), Arc::new(QuietHost)).unwrap();

    let report = monitor.perform_check().await;
    assert_eq!(report.status, HealthStatus::Degraded);

    probe.code.store(200, Ordering::SeqCst);
    let recovery = monitor.attempt_recovery().await;
    assert_eq!(recovery.recovered, vec!["portal".to_string()]);
    assert_eq!(
        monitor.get_status().await.components["portal"].status,
        HealthStatus::Healthy
    );

    let report = monitor.perform_check().await;
    assert_eq!(report.status, HealthStatus::Healthy);
    assert!(report.recovery.is_none());
}
