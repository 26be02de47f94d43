//! External collaborators the booking flow drives
//!
//! Every browser-facing step sits behind one of these traits. Implementations
//! share a single portal session; the orchestrator serializes access to it.

use crate::model::{BookingProjection, RawSlot, User, UserBookingStatus};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait LoginClient: Send + Sync {
    /// `Ok(false)` means the portal rejected the credentials
    async fn login(&self, username: &str, password: &str) -> anyhow::Result<bool>;

    async fn check_login_status(&self) -> anyhow::Result<bool>;

    async fn logout(&self) -> anyhow::Result<()>;
}

#[async_trait]
pub trait FormFiller: Send + Sync {
    /// `Ok(false)` means the form did not accept the applicant's data
    async fn fill_form(&self, user: &User) -> anyhow::Result<bool>;

    async fn save_form(&self) -> anyhow::Result<()>;

    async fn add_another_applicant(&self) -> anyhow::Result<()>;

    async fn continue_to_booking(&self) -> anyhow::Result<()>;
}

#[async_trait]
pub trait SlotSource: Send + Sync {
    async fn check_available_slots(&self) -> anyhow::Result<Vec<RawSlot>>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_unbooked_users(&self, limit: usize) -> anyhow::Result<Vec<User>>;

    async fn update_user_booking_status(
        &self,
        passport_number: &str,
        status: UserBookingStatus,
    ) -> anyhow::Result<()>;
}

/// The booking transaction on the portal's appointment page
#[async_trait]
pub trait BookingDriver: Send + Sync {
    async fn select_appointment_type(&self, label: &str) -> anyhow::Result<()>;

    async fn choose_slot(&self, slot: &BookingProjection) -> anyhow::Result<()>;

    async fn submit(&self) -> anyhow::Result<()>;

    /// Whether the confirmation marker appeared
    async fn await_confirmation(&self) -> anyhow::Result<bool>;
}

/// One shared instance of each collaborator
#[derive(Clone)]
pub struct Collaborators {
    pub login: Arc<dyn LoginClient>,
    pub forms: Arc<dyn FormFiller>,
    pub slots: Arc<dyn SlotSource>,
    pub users: Arc<dyn UserStore>,
    pub driver: Arc<dyn BookingDriver>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
