/*!
 * Bot runtime
 *
 * A *life* of the bot wires every component from the configuration, then
 * runs four concurrent activities until shutdown or a restart trigger:
 *
 * - the health monitor loop
 * - the slot poller, feeding ranked slots to the main loop over a channel
 * - the booking event consumer, marking applicants as booked
 * - the main loop, running a booking cycle every `check_interval` and
 *   whenever the poller delivers slots
 *
 * The [`Supervisor`] starts a fresh life after a critical health warning or
 * an unexpected failure, up to `max_restarts` times.
 */

use crate::booking::{BookingEvent, BookingOrchestrator, Collaborators, UserStore};
use crate::config::{BotConfig, RuntimeConfig};
use crate::error::{Result, SlotlineError};
use crate::model::{Slot, UserBookingStatus};
use crate::priority::PriorityEngine;
use slotline_core_resilience::{HealthReporter, RetryEngine};
use slotline_sentinel::{HealthEvent, HealthMonitor};
use slotline_server::{start_server, AppState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

const SLOT_CHANNEL_CAPACITY: usize = 8;
const MAX_RESTART_BACKOFF: Duration = Duration::from_secs(60);

/// Every component of one life, sharing one health monitor
#[derive(Clone)]
pub struct BotComponents {
    pub monitor: Arc<HealthMonitor>,
    pub retry: Arc<RetryEngine>,
    pub priority: Arc<PriorityEngine>,
    pub orchestrator: Arc<BookingOrchestrator>,
    pub users: Arc<dyn UserStore>,
}

impl BotComponents {
    /// Wire components around a monitor that probes over HTTP
    pub fn assemble(config: &BotConfig, collaborators: Collaborators) -> Result<Self> {
        let monitor = Arc::new(HealthMonitor::with_defaults(config.health_policy())?);
        Self::with_monitor(config, collaborators, monitor)
    }

    pub fn with_monitor(
        config: &BotConfig,
        collaborators: Collaborators,
        monitor: Arc<HealthMonitor>,
    ) -> Result<Self> {
        let health: Arc<dyn HealthReporter> = monitor.clone();

        let retry = Arc::new(
            RetryEngine::builder(config.retry_policy())
                .breaker_config(config.breaker_config())
                .health_reporter(health.clone())
                .build(),
        );
        let priority = Arc::new(PriorityEngine::new(
            config.priority_config(),
            health.clone(),
        )?);
        let users = collaborators.users.clone();
        let orchestrator = Arc::new(BookingOrchestrator::new(
            config.booking_config(),
            collaborators,
            priority.clone(),
            retry.clone(),
            health,
        )?);

        Ok(Self {
            monitor,
            retry,
            priority,
            orchestrator,
            users,
        })
    }

    /// Restore persisted state: health counters, prioritization history, booking stats
    pub async fn initialize(&self) -> Result<()> {
        self.monitor.initialize().await?;

        let loaded = self.priority.load_history().await?;
        let removed = self
            .priority
            .cleanup_old_history(self.priority.retention_days())
            .await?;
        debug!(loaded, removed, "Prioritization history ready");

        self.orchestrator.initialize().await
    }
}

/// Why a life ended without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifeEnd {
    Shutdown,
    CriticalHealth,
}

/// Run one life until `shutdown` flips to true or a restart trigger fires
pub async fn run_life(
    components: &BotComponents,
    runtime: &RuntimeConfig,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<LifeEnd> {
    components.initialize().await?;

    let (life_over, _) = watch::channel(false);
    let monitor_task = tokio::spawn(components.monitor.clone().run());

    let (slot_tx, mut slot_rx) = mpsc::channel(SLOT_CHANNEL_CAPACITY);
    let poller = tokio::spawn(poll_slots(
        components.orchestrator.clone(),
        components.priority.clone(),
        runtime.polling_interval,
        slot_tx,
    ));
    let consumer = tokio::spawn(consume_events(
        components.orchestrator.subscribe(),
        components.users.clone(),
    ));
    let server = runtime
        .http
        .clone()
        .map(|http| spawn_server(http, components.monitor.clone(), life_over.subscribe()));

    let mut health_events = components.monitor.subscribe();
    let mut ticker = tokio::time::interval(runtime.check_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        "Bot running | Check interval: {:?} | Polling interval: {:?}",
        runtime.check_interval, runtime.polling_interval
    );

    let outcome = loop {
        if *shutdown.borrow_and_update() {
            break Ok(LifeEnd::Shutdown);
        }

        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break Ok(LifeEnd::Shutdown);
                }
            }
            event = health_events.recv() => match event {
                Ok(event) if event.is_critical_warning() && runtime.restart_on_critical => {
                    if let HealthEvent::Warning { message, .. } = &event {
                        error!("Critical health warning, restarting: {}", message);
                    }
                    break Ok(LifeEnd::CriticalHealth);
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Health event receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    break Err(SlotlineError::Other("Health monitor went away".into()));
                }
            },
            _ = ticker.tick() => {
                if let Err(e) = booking_cycle(components, None).await {
                    break Err(e);
                }
            }
            Some(slots) = slot_rx.recv() => {
                if let Err(e) = booking_cycle(components, Some(slots)).await {
                    break Err(e);
                }
            }
        }
    };

    let grace = runtime.graceful_shutdown_timeout;
    info!("Stopping bot (grace period {:?})", grace);

    components.monitor.stop();
    poller.abort();
    life_over.send_replace(true);

    components.orchestrator.shutdown(grace).await;
    consumer.abort();

    if tokio::time::timeout(grace, monitor_task).await.is_err() {
        warn!("Health monitor did not stop within {:?}", grace);
    }
    if let Some(server) = server {
        if tokio::time::timeout(grace, server).await.is_err() {
            warn!("HTTP server did not stop within {:?}", grace);
        }
    }
    if let Err(e) = components.priority.close().await {
        warn!("Failed to save prioritization history: {}", e);
    }

    outcome
}

/// One main-loop cycle; only fatal errors escape
async fn booking_cycle(components: &BotComponents, slots: Option<Vec<Slot>>) -> Result<()> {
    match components.orchestrator.run_cycle(slots).await {
        Ok(stats) => {
            components
                .monitor
                .record_booking_cycle(stats.totals.summary())
                .await;
            Ok(())
        }
        Err(e) if e.is_fatal() => {
            error!("Fatal error in booking cycle: {}", e);
            Err(e)
        }
        Err(e) => {
            error!(category = %e.category(), "Error in booking cycle: {}", e);
            components
                .monitor
                .record_error("main_loop", &e.to_string())
                .await;
            Ok(())
        }
    }
}

async fn poll_slots(
    orchestrator: Arc<BookingOrchestrator>,
    priority: Arc<PriorityEngine>,
    interval: Duration,
    slots: mpsc::Sender<Vec<Slot>>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the main loop discovers slots itself on its first tick
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let discovered = match orchestrator.fetch_slots().await {
            Ok(discovered) => discovered,
            Err(e) => {
                warn!("Slot polling failed: {}", e);
                continue;
            }
        };

        let ranked = priority.prioritize(discovered).await;
        if ranked.is_empty() {
            debug!("Slot poll found nothing bookable");
            continue;
        }
        info!("Slot poll found {} bookable slots", ranked.len());
        if slots.send(ranked).await.is_err() {
            break;
        }
    }
}

async fn consume_events(mut events: broadcast::Receiver<BookingEvent>, users: Arc<dyn UserStore>) {
    loop {
        match events.recv().await {
            Ok(event) => handle_event(&event, users.as_ref()).await,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Booking event consumer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// React to one booking event: successes mark every applicant as booked
pub async fn handle_event(event: &BookingEvent, users: &dyn UserStore) {
    match event {
        BookingEvent::BookingSuccess {
            slot, booking_id, ..
        } => {
            info!(slot_id = %slot.id, %booking_id, "Booking confirmed");
            for applicant in event.applicants() {
                if let Err(e) = users
                    .update_user_booking_status(&applicant.passport_number, UserBookingStatus::Booked)
                    .await
                {
                    error!(
                        passport = %applicant.passport_number,
                        "Failed to update booking status: {:#}", e
                    );
                }
            }
        }
        BookingEvent::BookingError {
            slot,
            booking_id,
            error,
            ..
        } => {
            warn!(slot_id = %slot.id, %booking_id, "Booking failed: {}", error);
        }
    }
}

fn spawn_server(
    config: slotline_server::ServerConfig,
    monitor: Arc<HealthMonitor>,
    mut life_over: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let shutdown = async move {
            while !*life_over.borrow_and_update() {
                if life_over.changed().await.is_err() {
                    break;
                }
            }
        };
        if let Err(e) = start_server(config, AppState::new(monitor), shutdown).await {
            error!("HTTP server failed: {}", e);
        }
    })
}

/// Delay before restart number `restart` (1-based)
pub fn restart_backoff(restart: u32) -> Duration {
    let exponent = restart.saturating_sub(1).min(16);
    Duration::from_secs(5u64.saturating_mul(1 << exponent)).min(MAX_RESTART_BACKOFF)
}

/// Restarts lives until shutdown, a fatal error or the restart budget runs out
#[derive(Debug)]
pub struct Supervisor {
    config: BotConfig,
    collaborators: Collaborators,
}

impl Supervisor {
    pub fn new(config: BotConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
        }
    }

    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let runtime = self.config.runtime_config();
        let mut restarts = 0u32;

        loop {
            let components = BotComponents::assemble(&self.config, self.collaborators.clone())?;
            let mut life_shutdown = shutdown.clone();

            match run_life(&components, &runtime, &mut life_shutdown).await {
                Ok(LifeEnd::Shutdown) => {
                    info!("Bot stopped");
                    return Ok(());
                }
                Ok(LifeEnd::CriticalHealth) => {
                    warn!("Bot life ended on a critical health warning");
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => error!(category = %e.category(), "Bot life failed: {}", e),
            }

            restarts += 1;
            if restarts > runtime.max_restarts {
                return Err(SlotlineError::Other(format!(
                    "Giving up after {} restarts",
                    runtime.max_restarts
                )));
            }

            let backoff = restart_backoff(restarts);
            info!(restart = restarts, "Restarting bot in {:?}", backoff);

            let mut waiting = shutdown.clone();
            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = waiting.wait_for(|stop| *stop) => {
                    info!("Shutdown requested during restart backoff");
                    return Ok(());
                }
            }
        }
    }
}
