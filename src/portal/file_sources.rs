//! JSON file backed slot feed and user store

use crate::booking::{SlotSource, UserStore};
use crate::model::{RawSlot, User, UserBookingStatus};
use anyhow::Context;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Read a JSON array, treating a missing file as empty
async fn read_list<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("{} does not exist yet", path.display());
            Ok(Vec::new())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

/// Slot discovery from a JSON file refreshed by an external scraper
#[derive(Debug, Clone)]
pub struct JsonSlotFeed {
    path: PathBuf,
}

impl JsonSlotFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SlotSource for JsonSlotFeed {
    async fn check_available_slots(&self) -> anyhow::Result<Vec<RawSlot>> {
        let slots: Vec<RawSlot> = read_list(&self.path).await?;
        debug!("Read {} slots from {}", slots.len(), self.path.display());
        Ok(slots)
    }
}

/// Applicant records kept in a JSON array
#[derive(Debug)]
pub struct JsonUserStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonUserStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub async fn all_users(&self) -> anyhow::Result<Vec<User>> {
        read_list(&self.path).await
    }
}

#[async_trait]
impl UserStore for JsonUserStore {
    async fn get_unbooked_users(&self, limit: usize) -> anyhow::Result<Vec<User>> {
        let users = self.all_users().await?;
        Ok(users
            .into_iter()
            .filter(|user| user.booking_status == UserBookingStatus::Pending)
            .take(limit)
            .collect())
    }

    async fn update_user_booking_status(
        &self,
        passport_number: &str,
        status: UserBookingStatus,
    ) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut users = self.all_users().await?;
        let user = users
            .iter_mut()
            .find(|user| user.passport_number == passport_number)
            .with_context(|| format!("No user with passport {}", passport_number))?;
        user.booking_status = status;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(&users)?;
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        info!(passport = passport_number, %status, "Updated booking status");
        Ok(())
    }
}
