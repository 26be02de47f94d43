//! Health Monitor Daemon: The Check Loop
//!
//! This module implements the background loop that periodically probes the
//! configured components, samples the host, recomputes the aggregate status
//! and triggers recovery when the system is not healthy.

use crate::error::{Result, SentinelError};
use crate::events::HealthEvent;
use crate::history::{HealthHistory, HistoryRecord};
use crate::medic::Medic;
use crate::metrics::{CheckReport, CycleSummary, RecoveryReport};
use crate::policy::HealthPolicy;
use crate::probe::{response_time, ComponentProbe, HttpProbe};
use crate::system::{SysinfoSampler, SystemSampler};
use async_trait::async_trait;
use chrono::Utc;
use slotline_core_resilience::{
    Advisory, AggregateHealth, HealthLedger, HealthReporter, HealthStatus, ProbeOutcome,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Deadline for the network latency probe
const NETWORK_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Capacity of the event broadcast channel
const EVENT_CAPACITY: usize = 64;

/// Component charged when the history directory cannot be read
const HISTORY_COMPONENT: &str = "health_history";

/// The Health Monitor
///
/// Runs a periodic check loop:
/// - **Probe:** Query every configured component endpoint
/// - **Sample:** Read CPU, memory, disk and network latency
/// - **Decide:** Recompute the aggregate status
/// - **Act:** Re-probe unhealthy components and broadcast the outcome
///
/// It is also the single [`HealthReporter`] every other subsystem reports to.
pub struct HealthMonitor {
    policy: HealthPolicy,
    ledger: Mutex<HealthLedger>,
    probe: Arc<dyn ComponentProbe>,
    sampler: Arc<dyn SystemSampler>,
    medic: Medic,
    history: Option<HealthHistory>,
    events: broadcast::Sender<HealthEvent>,
    shutdown: watch::Sender<bool>,
    last_booking_cycle: Mutex<Option<CycleSummary>>,
}

impl HealthMonitor {
    /// Create a new monitor
    ///
    /// # Arguments
    ///
    /// * `policy` - Endpoints, thresholds and timings
    /// * `probe` - Probe used for component checks, network latency and recovery
    /// * `sampler` - Host resource sampler
    pub fn new(
        policy: HealthPolicy,
        probe: Arc<dyn ComponentProbe>,
        sampler: Arc<dyn SystemSampler>,
    ) -> Result<Self> {
        policy.validate().map_err(SentinelError::InvalidPolicy)?;

        let medic = Medic::new(
            probe.clone(),
            policy.recovery_max_retries,
            policy.recovery_base_delay(),
            policy.probe_timeout(),
        );
        let history = policy.history_dir.clone().map(HealthHistory::new);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            ledger: Mutex::new(HealthLedger::new(policy.thresholds.clone())),
            policy,
            probe,
            sampler,
            medic,
            history,
            events,
            shutdown,
            last_booking_cycle: Mutex::new(None),
        })
    }

    /// Monitor probing over HTTP and sampling the local host
    pub fn with_defaults(policy: HealthPolicy) -> Result<Self> {
        Self::new(policy, Arc::new(HttpProbe::new()), Arc::new(SysinfoSampler))
    }

    pub fn policy(&self) -> &HealthPolicy {
        &self.policy
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HealthEvent> {
        self.events.subscribe()
    }

    /// Restore error counters from today's history file
    pub async fn initialize(&self) -> Result<()> {
        let Some(history) = &self.history else {
            return Ok(());
        };

        match history.load_latest(Utc::now().date_naive()).await {
            Ok(Some(record)) => {
                info!(
                    components = record.error_counts.len(),
                    "Restored error counters from {}",
                    history.dir().display()
                );
                self.ledger
                    .lock()
                    .await
                    .restore_error_counts(record.error_counts);
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Starting with fresh error counters: {}", e);
                self.ledger.lock().await.record_error(HISTORY_COMPONENT);
            }
        }
        Ok(())
    }

    /// Main event loop - runs until [`HealthMonitor::stop`] is called
    ///
    /// This is typically spawned as a background tokio task:
    ///
    /// ```no_run
    /// # use slotline_sentinel::{HealthMonitor, HealthPolicy};
    /// # use std::sync::Arc;
    /// # async fn example() -> anyhow::Result<()> {
    /// let monitor = Arc::new(HealthMonitor::with_defaults(HealthPolicy::default())?);
    ///
    /// tokio::spawn(monitor.clone().run());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn run(self: Arc<Self>) {
        info!(
            "🩺 Health monitor active | Interval: {}s | Endpoints: {} | Probe timeout: {}s",
            self.policy.check_interval_s,
            self.policy.endpoints.len(),
            self.policy.probe_timeout_s
        );

        let mut shutdown = self.shutdown.subscribe();
        let mut interval = tokio::time::interval(self.policy.check_interval());

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            tokio::select! {
                _ = interval.tick() => {
                    self.perform_check().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Health monitor stopped");
    }

    /// Ask the loop started by [`HealthMonitor::run`] to exit
    pub fn stop(&self) {
        info!("Stopping health monitor");
        self.shutdown.send_replace(true);
    }

    /// Execute a single check cycle
    ///
    /// 1. Probe all components
    /// 2. Sample host resources
    /// 3. Recompute the overall status
    /// 4. Run recovery when the status is Degraded or Critical
    /// 5. Broadcast events and append to the history
    pub async fn perform_check(&self) -> CheckReport {
        let start = Instant::now();
        let previous = self.ledger.lock().await.status();

        let components_checked = self.check_components().await;
        self.check_system().await;

        let cycle_status = self
            .ledger
            .lock()
            .await
            .complete_cycle(Utc::now(), Some(start.elapsed().as_secs_f64()));

        let needs_recovery = matches!(
            cycle_status,
            HealthStatus::Degraded | HealthStatus::Critical
        );
        let recovery = if needs_recovery {
            let report = self.attempt_recovery().await;
            self.emit(HealthEvent::RecoveryAttempted {
                recovered: report.recovered.clone(),
                failed: report.failed.clone(),
            });
            Some(report)
        } else {
            None
        };

        let (status, unhealthy, advisories) = {
            let ledger = self.ledger.lock().await;
            (
                ledger.status(),
                ledger.unhealthy_components(),
                ledger.advisories(),
            )
        };

        if status != previous {
            info!("Overall health changed: {} -> {}", previous, status);
            self.emit(HealthEvent::StatusChanged {
                from: previous,
                to: status,
            });
        }

        if matches!(status, HealthStatus::Degraded | HealthStatus::Critical) {
            let message = describe(&unhealthy, &advisories);
            warn!("⚠️  System health is {}: {}", status, message);
            self.emit(HealthEvent::Warning { status, message });
        }

        self.save_history(None).await;

        let report = CheckReport {
            status,
            previous,
            components_checked,
            unhealthy,
            advisories,
            recovery,
            duration: start.elapsed(),
        };
        info!("📊 {}", report.summary());
        report
    }

    /// Probe every configured endpoint once and record the outcomes
    pub async fn check_components(&self) -> usize {
        let timeout = self.policy.probe_timeout();

        for (component, url) in &self.policy.endpoints {
            let outcome = self.probe.probe(url, timeout).await;

            if let Some(elapsed) = response_time(&outcome) {
                if elapsed > timeout.as_secs_f64() {
                    warn!("Slow response from {}: {:.2} seconds", component, elapsed);
                }
            }
            if let ProbeOutcome::Failed { error } = &outcome {
                error!("{} error: {}", component, error);
            }

            let status = self
                .ledger
                .lock()
                .await
                .record_probe(component, outcome, Utc::now());
            debug!(component = %component, status = %status, "Component checked");
        }

        self.policy.endpoints.len()
    }

    /// Sample the host and record resource advisories
    pub async fn check_system(&self) -> Vec<Advisory> {
        let mut sample = match self.sampler.sample().await {
            Ok(sample) => sample,
            Err(e) => {
                warn!("System sampling failed: {:#}", e);
                return Vec::new();
            }
        };

        if let Some(url) = &self.policy.network_check_url {
            let outcome = self.probe.probe(url, NETWORK_CHECK_TIMEOUT).await;
            sample.network_latency = response_time(&outcome);
        }

        let advisories = self.ledger.lock().await.check_system(sample);
        for advisory in &advisories {
            warn!("{}", advisory);
        }
        advisories
    }

    /// Re-probe every unhealthy component through the Medic
    ///
    /// Never fails; the outcome is logged and returned.
    pub async fn attempt_recovery(&self) -> RecoveryReport {
        info!("Attempting system recovery");
        let unhealthy = self.ledger.lock().await.unhealthy_components();
        let mut report = RecoveryReport::default();

        for component in unhealthy {
            let Some(url) = self.policy.endpoints.get(&component) else {
                continue;
            };

            match self.medic.heal_component(&component, url).await {
                Ok(outcome) => {
                    self.ledger
                        .lock()
                        .await
                        .record_probe(&component, outcome, Utc::now());
                    report.recovered.push(component);
                }
                Err(e) => {
                    debug!("{:#}", e);
                    report.failed.push(component);
                }
            }
        }

        self.ledger.lock().await.refresh_status();
        report
    }

    /// Serializable snapshot of the aggregate health
    pub async fn get_status(&self) -> AggregateHealth {
        self.ledger.lock().await.snapshot()
    }

    pub async fn status(&self) -> HealthStatus {
        self.ledger.lock().await.status()
    }

    /// Record the counters of a finished booking cycle in the history
    pub async fn record_booking_cycle(&self, summary: CycleSummary) {
        info!(
            attempts = summary.total_attempts,
            successful = summary.successful_bookings,
            failed = summary.failed_bookings,
            "Booking cycle recorded (success rate {:.1}%)",
            summary.success_rate * 100.0
        );
        *self.last_booking_cycle.lock().await = Some(summary.clone());
        self.save_history(Some(summary)).await;
    }

    pub async fn last_booking_cycle(&self) -> Option<CycleSummary> {
        self.last_booking_cycle.lock().await.clone()
    }

    fn emit(&self, event: HealthEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    async fn save_history(&self, booking_cycle: Option<CycleSummary>) {
        let Some(history) = &self.history else {
            return;
        };

        let record = {
            let ledger = self.ledger.lock().await;
            HistoryRecord {
                timestamp: Utc::now(),
                health_status: ledger.snapshot(),
                error_counts: ledger.error_counts().clone(),
                booking_cycle,
            }
        };

        if let Err(e) = history.append(&record).await {
            warn!("Failed to save health history: {}", e);
        }
    }
}

#[async_trait]
impl HealthReporter for HealthMonitor {
    async fn record_success(&self, component: &str) {
        debug!("Successful operation in {}", component);
        self.ledger.lock().await.record_success(component);
        self.save_history(None).await;
    }

    async fn record_error(&self, component: &str, error: &str) {
        error!("Error in {}: {}", component, error);
        self.ledger.lock().await.record_error(component);
        self.save_history(None).await;
    }
}

fn describe(unhealthy: &[String], advisories: &[Advisory]) -> String {
    let mut parts: Vec<String> = advisories
        .iter()
        .filter(|a| !matches!(a, Advisory::Healthy))
        .map(|a| a.to_string())
        .collect();
    if !unhealthy.is_empty() {
        parts.insert(0, format!("unhealthy components: {}", unhealthy.join(", ")));
    }
    if parts.is_empty() {
        "error counters above threshold".to_string()
    } else {
        parts.join("; ")
    }
}
