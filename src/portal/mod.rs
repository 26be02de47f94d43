//! Portal adapters for running without a browser
//!
//! Slots and applicants come from JSON files; the portal session itself is a
//! dry run that logs every step and confirms every booking.

pub mod dry_run;
pub mod file_sources;

pub use dry_run::DryRunSession;
pub use file_sources::{JsonSlotFeed, JsonUserStore};

use crate::booking::Collaborators;
use crate::config::BotConfig;
use std::sync::Arc;

/// Collaborators backed by the configured JSON files and a dry-run session
pub fn dry_run_collaborators(config: &BotConfig) -> Collaborators {
    let session = Arc::new(DryRunSession::new());
    Collaborators {
        login: session.clone(),
        forms: session.clone(),
        slots: Arc::new(JsonSlotFeed::new(&config.slot_feed_file)),
        users: Arc::new(JsonUserStore::new(&config.user_data_file)),
        driver: session,
    }
}
