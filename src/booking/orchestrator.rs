//! Booking orchestration
//!
//! One cycle logs in, gathers ranked slots, fills the applicant forms and then
//! walks the slots in priority order until one booking is confirmed:
//!
//! ```text
//! for slot in ranked:
//!     slot lock (keyed) → rate limiter token → session lock → transaction
//!     success → record, emit BookingSuccess, stop
//!     failure → record, emit BookingError, schedule a retry of slot + user
//! ```
//!
//! The slot lock guarantees one in-flight attempt per slot id across
//! overlapping cycles and scheduled retries; the record of booked slot ids
//! turns a later attempt on the same slot into a no-op.

use super::collaborators::Collaborators;
use super::events::{BookingAttemptResult, BookingEvent};
use super::state::CyclePhase;
use super::stats::BookingStats;
use crate::config::BookingConfig;
use crate::error::{Result, SlotlineError};
use crate::model::{parse_slots, BookingProjection, Slot, User};
use crate::priority::PriorityEngine;
use futures::future::BoxFuture;
use slotline_core_resilience::{
    HealthReporter, KeyedLocks, RateLimiter, ResilienceError, RetryEngine,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Applicants booked together in one appointment
pub const USERS_PER_CYCLE: usize = 2;

const EVENT_CAPACITY: usize = 256;
const BOOKING_COMPONENT: &str = "booking";
const RETRY_OPERATION: &str = "booking_retry";
const STATS_COMPONENT: &str = "booking_stats";

type RetryHandle = JoinHandle<std::result::Result<Option<BookingAttemptResult>, ResilienceError>>;

/// How a cycle ended
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Nothing survived prioritization
    NoSlots,
    /// Every applicant is already booked
    NoUsers,
    Booked { slot_id: String, booking_id: Uuid },
    /// Every candidate slot was tried without a confirmation
    NoneConfirmed,
}

/// Result of [`BookingOrchestrator::run_cycle`]
#[derive(Debug, Clone, PartialEq)]
pub struct CycleStats {
    pub outcome: CycleOutcome,
    /// Phases entered, in order
    pub phases: Vec<CyclePhase>,
    pub attempts: Vec<BookingAttemptResult>,
    /// Counters after the cycle
    pub totals: BookingStats,
    pub duration: Duration,
}

impl CycleStats {
    pub fn booked(&self) -> bool {
        matches!(self.outcome, CycleOutcome::Booked { .. })
    }
}

/// Drives booking cycles against the portal collaborators
pub struct BookingOrchestrator {
    config: BookingConfig,
    collaborators: Collaborators,
    priority: Arc<PriorityEngine>,
    retry: Arc<RetryEngine>,
    health: Arc<dyn HealthReporter>,
    slot_locks: KeyedLocks,
    limiter: RateLimiter,
    /// Serializes every step that drives the shared browser session
    session: Mutex<()>,
    booked: StdMutex<HashSet<String>>,
    stats: StdMutex<BookingStats>,
    events: broadcast::Sender<BookingEvent>,
    phase: watch::Sender<CyclePhase>,
    pending_retries: StdMutex<Vec<RetryHandle>>,
}

impl std::fmt::Debug for BookingOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookingOrchestrator")
            .field("config", &self.config)
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

impl BookingOrchestrator {
    pub fn new(
        config: BookingConfig,
        collaborators: Collaborators,
        priority: Arc<PriorityEngine>,
        retry: Arc<RetryEngine>,
        health: Arc<dyn HealthReporter>,
    ) -> Result<Self> {
        if config.booking_timeout >= retry.policy().timeout {
            return Err(SlotlineError::Config(format!(
                "booking timeout {:?} must be shorter than the retry timeout {:?}",
                config.booking_timeout,
                retry.policy().timeout
            )));
        }
        let limiter = RateLimiter::per_second(config.rate_limit_per_second)?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (phase, _) = watch::channel(CyclePhase::Idle);

        Ok(Self {
            config,
            collaborators,
            priority,
            retry,
            health,
            slot_locks: KeyedLocks::default(),
            limiter,
            session: Mutex::new(()),
            booked: StdMutex::new(HashSet::new()),
            stats: StdMutex::new(BookingStats::default()),
            events,
            phase,
            pending_retries: StdMutex::new(Vec::new()),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BookingEvent> {
        self.events.subscribe()
    }

    /// Phase of the most recent cycle step
    pub fn phase(&self) -> CyclePhase {
        *self.phase.borrow()
    }

    pub fn watch_phase(&self) -> watch::Receiver<CyclePhase> {
        self.phase.subscribe()
    }

    pub async fn stats(&self) -> BookingStats {
        *self.lock_stats()
    }

    pub async fn is_booked(&self, slot_id: &str) -> bool {
        self.lock_booked().contains(slot_id)
    }

    fn lock_stats(&self) -> MutexGuard<'_, BookingStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_booked(&self) -> MutexGuard<'_, HashSet<String>> {
        self.booked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Scheduled retries that have not finished yet
    pub fn pending_retries(&self) -> usize {
        let mut pending = self
            .pending_retries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        pending.retain(|handle| !handle.is_finished());
        pending.len()
    }

    /// Restore counters persisted by a previous run
    pub async fn initialize(&self) -> Result<()> {
        let Some(path) = &self.config.stats_file else {
            return Ok(());
        };

        let stats = match BookingStats::load(path).await {
            Ok(stats) => {
                info!(
                    attempts = stats.total_attempts,
                    successful = stats.successful_bookings,
                    "Loaded booking stats from {}",
                    path.display()
                );
                stats
            }
            Err(e) => {
                error!("Failed to load booking stats, starting from zero: {}", e);
                self.health
                    .record_error(STATS_COMPONENT, &e.to_string())
                    .await;
                BookingStats::default()
            }
        };
        *self.lock_stats() = stats;
        Ok(())
    }

    pub async fn persist_stats(&self) -> Result<()> {
        let Some(path) = &self.config.stats_file else {
            return Ok(());
        };
        let stats = *self.lock_stats();
        if let Err(e) = stats.save(path).await {
            self.health
                .record_error(STATS_COMPONENT, &e.to_string())
                .await;
            return Err(e);
        }
        Ok(())
    }

    /// Run one booking cycle
    ///
    /// `prioritized` skips slot discovery when the caller already holds a
    /// ranked list. Empty slot or user lists end the cycle without an error.
    pub async fn run_cycle(self: &Arc<Self>, prioritized: Option<Vec<Slot>>) -> Result<CycleStats> {
        let start = Instant::now();
        let mut phases = Vec::new();

        let result = self.drive_cycle(prioritized, &mut phases).await;
        self.enter(&mut phases, CyclePhase::Idle);

        if let Err(e) = self.persist_stats().await {
            warn!("Failed to persist booking stats: {}", e);
        }

        let (outcome, attempts) = result?;
        let totals = self.stats().await;
        info!(
            attempts = totals.total_attempts,
            successful = totals.successful_bookings,
            failed = totals.failed_bookings,
            "Booking cycle completed: {:?}",
            outcome
        );

        Ok(CycleStats {
            outcome,
            phases,
            attempts,
            totals,
            duration: start.elapsed(),
        })
    }

    async fn drive_cycle(
        self: &Arc<Self>,
        prioritized: Option<Vec<Slot>>,
        phases: &mut Vec<CyclePhase>,
    ) -> Result<(CycleOutcome, Vec<BookingAttemptResult>)> {
        self.enter(phases, CyclePhase::LoggingIn);
        self.ensure_logged_in().await?;

        let ranked = match prioritized {
            Some(slots) => slots,
            None => {
                self.enter(phases, CyclePhase::CheckingSlots);
                let slots = self.fetch_slots().await?;
                self.enter(phases, CyclePhase::Prioritizing);
                self.priority.prioritize(slots).await
            }
        };

        info!("Processing {} prioritized slots", ranked.len());
        if ranked.is_empty() {
            info!("No slots available for booking");
            return Ok((CycleOutcome::NoSlots, Vec::new()));
        }

        let mut users = match self
            .collaborators
            .users
            .get_unbooked_users(USERS_PER_CYCLE)
            .await
        {
            Ok(users) => users,
            Err(e) => {
                let message = format!("{:#}", e);
                self.health.record_error("user_data", &message).await;
                return Err(SlotlineError::Collaborator(message));
            }
        };
        users.truncate(USERS_PER_CYCLE);
        if users.is_empty() {
            warn!("No unbooked users available for booking");
            return Ok((CycleOutcome::NoUsers, Vec::new()));
        }

        self.enter(phases, CyclePhase::FillingForm);
        self.fill_forms(&users).await?;

        let lead = users.remove(0);
        let companions = users;
        let projections = self.priority.prepare_for_booking(&ranked);

        let mut attempts = Vec::new();
        for (slot, projection) in ranked.iter().zip(&projections) {
            self.enter(phases, CyclePhase::SelectingSlot);
            let Some(result) = self
                .attempt(slot, projection, &lead, &companions, Some(&mut *phases), true)
                .await
            else {
                continue;
            };

            let booked = result.success.then_some(result.booking_id);
            attempts.push(result);
            if let Some(booking_id) = booked {
                self.enter(phases, CyclePhase::Succeeded);
                return Ok((
                    CycleOutcome::Booked {
                        slot_id: slot.id.clone(),
                        booking_id,
                    },
                    attempts,
                ));
            }
        }

        self.enter(phases, CyclePhase::Failed);
        Ok((CycleOutcome::NoneConfirmed, attempts))
    }

    /// Log in unless the portal session is still authenticated
    pub async fn ensure_logged_in(&self) -> Result<()> {
        let _session = self.session.lock().await;
        let login = &self.collaborators.login;

        match login.check_login_status().await {
            Ok(true) => {
                debug!("Session already authenticated");
                return Ok(());
            }
            Ok(false) => {}
            Err(e) => warn!("Login status check failed, logging in again: {:#}", e),
        }

        let rejected = AtomicBool::new(false);
        let rejected_ref = &rejected;
        let username = self.config.username.as_str();
        let password = self.config.password.expose();

        let outcome = self
            .retry
            .retry("login", move || async move {
                match login.login(username, password).await {
                    Ok(true) => Ok(()),
                    Ok(false) => {
                        rejected_ref.store(true, Ordering::SeqCst);
                        Err(ResilienceError::Failed(
                            "portal rejected the credentials".to_string(),
                        ))
                    }
                    Err(e) => {
                        rejected_ref.store(false, Ordering::SeqCst);
                        Err(ResilienceError::from_anyhow(e))
                    }
                }
            })
            .await;

        match outcome {
            Ok(()) => {
                info!(username, "Login successful");
                Ok(())
            }
            Err(e) if rejected.load(Ordering::SeqCst) => {
                error!(username, "Login failed: {}", e);
                Err(SlotlineError::Authentication(format!(
                    "portal rejected the credentials for {}",
                    username
                )))
            }
            Err(e) => {
                error!(username, "Login failed: {}", e);
                Err(e.into())
            }
        }
    }

    /// Discover slots through the retry engine and parse them
    pub async fn fetch_slots(&self) -> Result<Vec<Slot>> {
        let _session = self.session.lock().await;
        let source = &self.collaborators.slots;
        let raw = self
            .retry
            .retry("check_available_slots", move || async move {
                source
                    .check_available_slots()
                    .await
                    .map_err(ResilienceError::from_anyhow)
            })
            .await?;
        debug!("Slot discovery returned {} candidates", raw.len());
        Ok(parse_slots(raw))
    }

    /// Fill one form per applicant; a second applicant is added to the same booking
    async fn fill_forms(&self, users: &[User]) -> Result<()> {
        let _session = self.session.lock().await;
        let forms = &self.collaborators.forms;

        let filled: anyhow::Result<()> = async {
            for (index, user) in users.iter().enumerate() {
                if index > 0 {
                    forms.add_another_applicant().await?;
                }
                if !forms.fill_form(user).await? {
                    anyhow::bail!("form rejected applicant {}", user.passport_number);
                }
                forms.save_form().await?;
            }
            forms.continue_to_booking().await
        }
        .await;

        match filled {
            Ok(()) => {
                info!("Filled forms for {} applicants", users.len());
                Ok(())
            }
            Err(e) => {
                let message = format!("{:#}", e);
                error!("Form filling failed: {}", message);
                self.health.record_error("form_filler", &message).await;
                Err(SlotlineError::FormFill(message))
            }
        }
    }

    /// Attempt to book `slot` for the applicants
    ///
    /// `None` when the slot is already booked, or when another attempt keeps
    /// it locked for the whole booking timeout.
    pub async fn attempt_booking(
        self: &Arc<Self>,
        slot: &Slot,
        user: &User,
        companions: &[User],
    ) -> Option<BookingAttemptResult> {
        let projection = BookingProjection::from(slot);
        self.attempt(slot, &projection, user, companions, None, true)
            .await
    }

    /// One booking attempt, bounded as a whole by `booking_timeout`
    ///
    /// Between counting the attempt and recording its outcome the only await
    /// is the deadline-bounded transaction, so a caller with a longer
    /// deadline never drops an attempt half-accounted.
    async fn attempt(
        self: &Arc<Self>,
        slot: &Slot,
        projection: &BookingProjection,
        user: &User,
        companions: &[User],
        trace: Option<&mut Vec<CyclePhase>>,
        retry_on_failure: bool,
    ) -> Option<BookingAttemptResult> {
        let deadline = tokio::time::Instant::now() + self.config.booking_timeout;

        let admitted = tokio::time::timeout_at(deadline, async {
            let guard = self.slot_locks.lock(&slot.id).await;
            let already_booked = self.lock_booked().contains(&slot.id);
            if already_booked {
                return None;
            }
            self.limiter.acquire().await;
            Some(guard)
        })
        .await;
        let _slot_guard = match admitted {
            Ok(Some(guard)) => guard,
            Ok(None) => {
                info!(slot_id = %slot.id, "Slot already booked, skipping");
                return None;
            }
            Err(_) => {
                warn!(
                    slot_id = %slot.id,
                    "Slot still busy after {:?}, skipping",
                    self.config.booking_timeout
                );
                return None;
            }
        };

        let booking_id = Uuid::new_v4();
        let start = Instant::now();
        self.lock_stats().record_attempt();

        let outcome = tokio::time::timeout_at(deadline, async move {
            let _session = self.session.lock().await;
            self.book_transaction(projection, trace).await
        })
        .await;
        let latency = start.elapsed().as_secs_f64();

        let failure = match outcome {
            Ok(Ok(true)) => None,
            Ok(Ok(false)) => Some("Booking not confirmed".to_string()),
            Ok(Err(e)) => Some(format!("{:#}", e)),
            Err(_) => Some(format!(
                "Booking timed out after {:?}",
                self.config.booking_timeout
            )),
        };
        self.lock_stats().record_outcome(failure.is_none());
        if failure.is_none() {
            self.lock_booked().insert(slot.id.clone());
        }

        match failure {
            None => {
                info!(
                    slot_id = %slot.id,
                    %booking_id,
                    user = %user.passport_number,
                    latency_secs = latency,
                    "Booking successful"
                );
                self.emit(BookingEvent::BookingSuccess {
                    slot: slot.clone(),
                    booking_id,
                    user: user.clone(),
                    companions: companions.to_vec(),
                    latency,
                });
                self.health.record_success(BOOKING_COMPONENT).await;
                Some(BookingAttemptResult {
                    success: true,
                    booking_id,
                    latency_seconds: latency,
                    reason: None,
                })
            }
            Some(reason) => {
                error!(
                    slot_id = %slot.id,
                    %booking_id,
                    user = %user.passport_number,
                    latency_secs = latency,
                    "Booking error: {}",
                    reason
                );
                self.emit(BookingEvent::BookingError {
                    slot: slot.clone(),
                    booking_id,
                    user: user.clone(),
                    companions: companions.to_vec(),
                    error: reason.clone(),
                    latency,
                });
                if retry_on_failure {
                    self.schedule_retry(slot, projection, user, companions);
                }
                self.health.record_error(BOOKING_COMPONENT, &reason).await;
                Some(BookingAttemptResult {
                    success: false,
                    booking_id,
                    latency_seconds: latency,
                    reason: Some(reason),
                })
            }
        }
    }

    /// Boxed so the scheduled retry can name the attempt's future type
    fn attempt_boxed(
        self: Arc<Self>,
        slot: Slot,
        projection: BookingProjection,
        user: User,
        companions: Vec<User>,
    ) -> BoxFuture<'static, Option<BookingAttemptResult>> {
        Box::pin(async move {
            self.attempt(&slot, &projection, &user, &companions, None, false)
                .await
        })
    }

    async fn book_transaction(
        &self,
        projection: &BookingProjection,
        trace: Option<&mut Vec<CyclePhase>>,
    ) -> anyhow::Result<bool> {
        let driver = &self.collaborators.driver;
        driver.select_appointment_type(&projection.category).await?;
        driver.choose_slot(projection).await?;
        driver.submit().await?;
        if let Some(trace) = trace {
            self.enter(trace, CyclePhase::Confirming);
        }
        driver.await_confirmation().await
    }

    /// Re-attempt slot + applicants in the background through the retry engine
    fn schedule_retry(
        self: &Arc<Self>,
        slot: &Slot,
        projection: &BookingProjection,
        user: &User,
        companions: &[User],
    ) {
        let delay = self.retry.policy().calculate_delay(1);
        let this = Arc::clone(self);
        let slot = slot.clone();
        let projection = projection.clone();
        let user = user.clone();
        let companions = companions.to_vec();

        let handle = self.retry.schedule(RETRY_OPERATION, delay, move || {
            let attempt = Arc::clone(&this).attempt_boxed(
                slot.clone(),
                projection.clone(),
                user.clone(),
                companions.clone(),
            );
            async move {
                match attempt.await {
                    Some(result) if !result.success => Err(ResilienceError::Failed(
                        result.reason.unwrap_or_default(),
                    )),
                    other => Ok(other),
                }
            }
        });

        let mut pending = self
            .pending_retries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        pending.retain(|handle| !handle.is_finished());
        pending.push(handle);
    }

    pub async fn logout(&self) {
        let _session = self.session.lock().await;
        match self.collaborators.login.logout().await {
            Ok(()) => info!("Logged out"),
            Err(e) => warn!("Logout failed: {:#}", e),
        }
    }

    /// Wait up to `grace` for scheduled retries, then log out and persist stats
    pub async fn shutdown(&self, grace: Duration) {
        let pending: Vec<RetryHandle> = {
            let mut pending = self
                .pending_retries
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *pending)
        };
        let pending: Vec<RetryHandle> = pending.into_iter().filter(|h| !h.is_finished()).collect();

        if !pending.is_empty() {
            info!(
                "Waiting up to {:?} for {} scheduled booking retries",
                grace,
                pending.len()
            );
            let aborts: Vec<_> = pending.iter().map(|h| h.abort_handle()).collect();
            if tokio::time::timeout(grace, futures::future::join_all(pending))
                .await
                .is_err()
            {
                warn!("Aborting {} booking retries still running", aborts.len());
                for abort in aborts {
                    abort.abort();
                }
            }
        }

        self.logout().await;
        if let Err(e) = self.persist_stats().await {
            warn!("Failed to persist booking stats: {}", e);
        }
    }

    fn enter(&self, trace: &mut Vec<CyclePhase>, next: CyclePhase) {
        let current = trace.last().copied().unwrap_or(CyclePhase::Idle);
        if current == next {
            return;
        }
        if !current.can_transition_to(next) {
            warn!(from = %current, to = %next, "Unexpected booking phase transition");
        }
        debug!(from = %current, to = %next, "Booking phase");
        trace.push(next);
        self.phase.send_replace(next);
    }

    fn emit(&self, event: BookingEvent) {
        // nobody listening is fine
        let _ = self.events.send(event);
    }
}
