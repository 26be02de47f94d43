//! Portal session that only logs what a browser would do
//!
//! Lets the whole pipeline run end to end against the JSON sources without
//! touching the real portal. Every booking is confirmed.

use crate::booking::{BookingDriver, FormFiller, LoginClient};
use crate::model::{BookingProjection, User};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::info;

#[derive(Debug, Default)]
pub struct DryRunSession {
    logged_in: AtomicBool,
    applicants: AtomicUsize,
}

impl DryRunSession {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LoginClient for DryRunSession {
    async fn login(&self, username: &str, _password: &str) -> anyhow::Result<bool> {
        info!(username, "[dry-run] login");
        self.logged_in.store(true, Ordering::SeqCst);
        Ok(true)
    }

    async fn check_login_status(&self) -> anyhow::Result<bool> {
        Ok(self.logged_in.load(Ordering::SeqCst))
    }

    async fn logout(&self) -> anyhow::Result<()> {
        info!("[dry-run] logout");
        self.logged_in.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl FormFiller for DryRunSession {
    async fn fill_form(&self, user: &User) -> anyhow::Result<bool> {
        let index = self.applicants.fetch_add(1, Ordering::SeqCst) + 1;
        info!(applicant = index, passport = %user.passport_number, "[dry-run] fill form for {}", user.full_name());
        Ok(true)
    }

    async fn save_form(&self) -> anyhow::Result<()> {
        info!("[dry-run] save form");
        Ok(())
    }

    async fn add_another_applicant(&self) -> anyhow::Result<()> {
        info!("[dry-run] add another applicant");
        Ok(())
    }

    async fn continue_to_booking(&self) -> anyhow::Result<()> {
        self.applicants.store(0, Ordering::SeqCst);
        info!("[dry-run] continue to booking");
        Ok(())
    }
}

#[async_trait]
impl BookingDriver for DryRunSession {
    async fn select_appointment_type(&self, label: &str) -> anyhow::Result<()> {
        info!(label, "[dry-run] select appointment type");
        Ok(())
    }

    async fn choose_slot(&self, slot: &BookingProjection) -> anyhow::Result<()> {
        info!(slot_id = %slot.id, date = %slot.date, "[dry-run] choose slot");
        Ok(())
    }

    async fn submit(&self) -> anyhow::Result<()> {
        info!("[dry-run] submit");
        Ok(())
    }

    async fn await_confirmation(&self) -> anyhow::Result<bool> {
        Ok(true)
    }
}
