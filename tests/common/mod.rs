//! In-memory portal and helpers shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use slotline::booking::{
    BookingDriver, BookingOrchestrator, Collaborators, FormFiller, LoginClient, SlotSource,
    UserStore,
};
use slotline::config::{BookingConfig, Secret};
use slotline::model::{BookingProjection, RawSlot, Slot, User, UserBookingStatus, VisaCategory};
use slotline::priority::{PriorityConfig, PriorityEngine};
use slotline_core_resilience::{
    BackoffStrategy, HealthReporter, NoopHealthReporter, RetryEngine, RetryPolicy,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Portal fake recording every call it receives
#[derive(Default)]
pub struct FakePortal {
    calls: Mutex<Vec<String>>,
    logged_in: AtomicBool,
    reject_login: AtomicBool,
    /// Confirmation result per booking attempt; `true` once exhausted
    confirmations: Mutex<VecDeque<bool>>,
    booking_delay: Mutex<Duration>,
    form_delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    slots: Mutex<Vec<RawSlot>>,
    users: Mutex<Vec<User>>,
}

impl FakePortal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_users(self: Arc<Self>, users: Vec<User>) -> Arc<Self> {
        *self.users.lock().unwrap() = users;
        self
    }

    pub fn with_slots(self: Arc<Self>, slots: Vec<RawSlot>) -> Arc<Self> {
        *self.slots.lock().unwrap() = slots;
        self
    }

    pub fn with_confirmations(self: Arc<Self>, results: &[bool]) -> Arc<Self> {
        *self.confirmations.lock().unwrap() = results.iter().copied().collect();
        self
    }

    pub fn with_booking_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        *self.booking_delay.lock().unwrap() = delay;
        self
    }

    pub fn with_form_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        *self.form_delay.lock().unwrap() = delay;
        self
    }

    pub fn reject_login(&self) {
        self.reject_login.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn user(&self, passport: &str) -> Option<User> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.passport_number == passport)
            .cloned()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl LoginClient for FakePortal {
    async fn login(&self, username: &str, _password: &str) -> anyhow::Result<bool> {
        self.record(format!("login:{}", username));
        if self.reject_login.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.logged_in.store(true, Ordering::SeqCst);
        Ok(true)
    }

    async fn check_login_status(&self) -> anyhow::Result<bool> {
        Ok(self.logged_in.load(Ordering::SeqCst))
    }

    async fn logout(&self) -> anyhow::Result<()> {
        self.record("logout");
        self.logged_in.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl FormFiller for FakePortal {
    async fn fill_form(&self, user: &User) -> anyhow::Result<bool> {
        self.record(format!("fill:{}", user.passport_number));
        let delay = *self.form_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(true)
    }

    async fn save_form(&self) -> anyhow::Result<()> {
        self.record("save");
        Ok(())
    }

    async fn add_another_applicant(&self) -> anyhow::Result<()> {
        self.record("add_applicant");
        Ok(())
    }

    async fn continue_to_booking(&self) -> anyhow::Result<()> {
        self.record("continue");
        Ok(())
    }
}

#[async_trait]
impl SlotSource for FakePortal {
    async fn check_available_slots(&self) -> anyhow::Result<Vec<RawSlot>> {
        self.record("check_slots");
        Ok(self.slots.lock().unwrap().clone())
    }
}

#[async_trait]
impl UserStore for FakePortal {
    async fn get_unbooked_users(&self, limit: usize) -> anyhow::Result<Vec<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.booking_status == UserBookingStatus::Pending)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn update_user_booking_status(
        &self,
        passport_number: &str,
        status: UserBookingStatus,
    ) -> anyhow::Result<()> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .iter_mut()
            .find(|u| u.passport_number == passport_number)
            .ok_or_else(|| anyhow::anyhow!("unknown passport {}", passport_number))?;
        user.booking_status = status;
        Ok(())
    }
}

#[async_trait]
impl BookingDriver for FakePortal {
    async fn select_appointment_type(&self, label: &str) -> anyhow::Result<()> {
        self.record(format!("select_type:{}", label));
        Ok(())
    }

    async fn choose_slot(&self, slot: &BookingProjection) -> anyhow::Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.record(format!("choose:{}", slot.id));

        let delay = *self.booking_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn submit(&self) -> anyhow::Result<()> {
        self.record("submit");
        Ok(())
    }

    async fn await_confirmation(&self) -> anyhow::Result<bool> {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let confirmed = self
            .confirmations
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(true);
        self.record(format!("confirm:{}", confirmed));
        Ok(confirmed)
    }
}

/// Health reporter remembering every report
#[derive(Default)]
pub struct RecordingHealth {
    pub errors: Mutex<Vec<(String, String)>>,
    pub successes: Mutex<Vec<String>>,
}

impl RecordingHealth {
    pub fn error_components(&self) -> Vec<String> {
        self.errors
            .lock()
            .unwrap()
            .iter()
            .map(|(component, _)| component.clone())
            .collect()
    }
}

#[async_trait]
impl HealthReporter for RecordingHealth {
    async fn record_success(&self, component: &str) {
        self.successes.lock().unwrap().push(component.to_string());
    }

    async fn record_error(&self, component: &str, error: &str) {
        self.errors
            .lock()
            .unwrap()
            .push((component.to_string(), error.to_string()));
    }
}

pub fn collaborators(portal: &Arc<FakePortal>) -> Collaborators {
    Collaborators {
        login: portal.clone(),
        forms: portal.clone(),
        slots: portal.clone(),
        users: portal.clone(),
        driver: portal.clone(),
    }
}

/// Small delays so scheduled retries finish quickly in real time
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        timeout: Duration::from_secs(5),
        strategy: BackoffStrategy::Fixed,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        jitter_factor: 0.0,
    }
}

pub fn booking_config() -> BookingConfig {
    BookingConfig {
        username: "agent".to_string(),
        password: Secret::new("secret"),
        rate_limit_per_second: 1000,
        booking_timeout: Duration::from_secs(2),
        stats_file: None,
    }
}

pub fn orchestrator_with(
    portal: &Arc<FakePortal>,
    health: Arc<dyn HealthReporter>,
) -> Arc<BookingOrchestrator> {
    let retry = Arc::new(
        RetryEngine::builder(fast_policy())
            .health_reporter(health.clone())
            .build(),
    );
    let priority = Arc::new(PriorityEngine::new(PriorityConfig::default(), health.clone()).unwrap());
    Arc::new(
        BookingOrchestrator::new(
            booking_config(),
            collaborators(portal),
            priority,
            retry,
            health,
        )
        .unwrap(),
    )
}

pub fn orchestrator(portal: &Arc<FakePortal>) -> Arc<BookingOrchestrator> {
    orchestrator_with(portal, Arc::new(NoopHealthReporter))
}

pub fn future_date(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 9, 0, 0).unwrap()
}

pub fn slot(id: &str, date: DateTime<Utc>, category: VisaCategory, spots: i64) -> Slot {
    Slot::new(id, date, category, spots)
}

pub fn raw_slot(id: &str, date: &str, category: &str, spots: i64) -> RawSlot {
    RawSlot {
        id: id.to_string(),
        date: date.to_string(),
        category: category.to_string(),
        available_spots: spots,
    }
}

pub fn two_users() -> Vec<User> {
    vec![User::new("P1", "Ana", "Silva"), User::new("P2", "Rui", "Silva")]
}
