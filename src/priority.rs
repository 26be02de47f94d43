/*!
 * Slot prioritization
 *
 * Validation drops candidates nobody could book; a [`RankingStrategy`] then
 * orders what is left. Every invocation leaves a [`PrioritizationEvent`] in an
 * append-only history persisted as JSON.
 */

use crate::error::{Result, SlotlineError};
use crate::model::{BookingProjection, Slot, VisaCategory};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use slotline_core_resilience::HealthReporter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// National slots first, then Schengen, earliest date first within a category
pub const STANDARD_STRATEGY: &str = "angola_to_portugal_standard";

/// Earliest date first regardless of category
pub const EARLIEST_FIRST_STRATEGY: &str = "earliest_first";

const HEALTH_COMPONENT: &str = "prioritization";

pub fn is_known_strategy(name: &str) -> bool {
    strategy_by_name(name).is_some()
}

/// Ordering function applied to already-validated slots
pub trait RankingStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Order `slots`; an error makes the whole prioritization yield nothing
    fn rank(&self, slots: Vec<Slot>) -> anyhow::Result<Vec<Slot>>;
}

/// Category rank used by the standard strategy
fn category_rank(category: &VisaCategory) -> (bool, bool) {
    (
        *category != VisaCategory::National,
        *category != VisaCategory::Schengen,
    )
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CategoryThenDate;

impl RankingStrategy for CategoryThenDate {
    fn name(&self) -> &str {
        STANDARD_STRATEGY
    }

    fn rank(&self, mut slots: Vec<Slot>) -> anyhow::Result<Vec<Slot>> {
        slots.sort_by(|a, b| {
            category_rank(&a.category)
                .cmp(&category_rank(&b.category))
                .then(a.date.cmp(&b.date))
        });
        Ok(slots)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EarliestFirst;

impl RankingStrategy for EarliestFirst {
    fn name(&self) -> &str {
        EARLIEST_FIRST_STRATEGY
    }

    fn rank(&self, mut slots: Vec<Slot>) -> anyhow::Result<Vec<Slot>> {
        slots.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then(category_rank(&a.category).cmp(&category_rank(&b.category)))
        });
        Ok(slots)
    }
}

pub fn strategy_by_name(name: &str) -> Option<Box<dyn RankingStrategy>> {
    match name {
        STANDARD_STRATEGY => Some(Box::new(CategoryThenDate)),
        EARLIEST_FIRST_STRATEGY => Some(Box::new(EarliestFirst)),
        _ => None,
    }
}

/// Settings for the priority engine
#[derive(Debug, Clone, PartialEq)]
pub struct PriorityConfig {
    pub strategy: String,
    /// Where the prioritization history is persisted; `None` keeps it in memory
    pub history_file: Option<PathBuf>,
    /// Age after which history events are pruned
    pub retention_days: u32,
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            strategy: STANDARD_STRATEGY.to_string(),
            history_file: None,
            retention_days: 30,
        }
    }
}

/// Audit record of one prioritization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrioritizationEvent {
    pub strategy: String,
    pub input_count: usize,
    pub output_count: usize,
    /// Seconds spent validating and ranking
    pub execution_time: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrioritizationStats {
    pub total_prioritizations: usize,
    pub average_execution_time: f64,
    pub last_prioritization: Option<PrioritizationEvent>,
}

impl PrioritizationStats {
    pub fn from_events(events: &[PrioritizationEvent]) -> Self {
        let total = events.len();
        let average_execution_time = if total == 0 {
            0.0
        } else {
            events.iter().map(|e| e.execution_time).sum::<f64>() / total as f64
        };
        Self {
            total_prioritizations: total,
            average_execution_time,
            last_prioritization: events.last().cloned(),
        }
    }
}

/// Shape of a slot batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotTrends {
    pub total_slots: usize,
    pub national_slots: usize,
    pub schengen_slots: usize,
    pub earliest_slot_date: Option<DateTime<Utc>>,
    pub latest_slot_date: Option<DateTime<Utc>>,
    pub average_slots_per_day: f64,
}

/// Validates and ranks slot candidates
pub struct PriorityEngine {
    strategy: Box<dyn RankingStrategy>,
    config: PriorityConfig,
    history: Mutex<Vec<PrioritizationEvent>>,
    health: Arc<dyn HealthReporter>,
}

impl std::fmt::Debug for PriorityEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityEngine")
            .field("strategy", &self.strategy.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PriorityEngine {
    pub fn new(config: PriorityConfig, health: Arc<dyn HealthReporter>) -> Result<Self> {
        let strategy = strategy_by_name(&config.strategy).ok_or_else(|| {
            SlotlineError::Config(format!("Unknown priority_strategy '{}'", config.strategy))
        })?;
        Ok(Self::with_strategy(strategy, config, health))
    }

    /// Use a custom ranking function; `config.strategy` is ignored
    pub fn with_strategy(
        strategy: Box<dyn RankingStrategy>,
        config: PriorityConfig,
        health: Arc<dyn HealthReporter>,
    ) -> Self {
        Self {
            strategy,
            config,
            history: Mutex::new(Vec::new()),
            health,
        }
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    /// Drop slots that cannot be booked as of now
    pub fn validate(&self, slots: Vec<Slot>) -> Vec<Slot> {
        validate_at(slots, Utc::now())
    }

    /// Validate then rank; never fails, an empty result means nothing to book
    pub async fn prioritize(&self, slots: Vec<Slot>) -> Vec<Slot> {
        self.prioritize_at(slots, Utc::now()).await
    }

    pub async fn prioritize_at(&self, slots: Vec<Slot>, now: DateTime<Utc>) -> Vec<Slot> {
        let input_count = slots.len();
        info!("Prioritizing {} slots with '{}'", input_count, self.strategy.name());
        let start = Instant::now();

        let valid = validate_at(slots, now);
        let ranked = match self.strategy.rank(valid) {
            Ok(ranked) => {
                self.health.record_success(HEALTH_COMPONENT).await;
                ranked
            }
            Err(e) => {
                error!("Prioritization error occurred: {:#}", e);
                self.health
                    .record_error(HEALTH_COMPONENT, &format!("{:#}", e))
                    .await;
                Vec::new()
            }
        };

        let execution_time = start.elapsed().as_secs_f64();
        self.history.lock().await.push(PrioritizationEvent {
            strategy: self.strategy.name().to_string(),
            input_count,
            output_count: ranked.len(),
            execution_time,
            timestamp: Utc::now(),
        });

        info!(
            "Prioritization completed in {:.3}s: {} of {} slots kept",
            execution_time,
            ranked.len(),
            input_count
        );
        ranked
    }

    /// Map ranked slots to the records the booking flow consumes
    pub fn prepare_for_booking(&self, ranked: &[Slot]) -> Vec<BookingProjection> {
        let projections: Vec<BookingProjection> =
            ranked.iter().map(BookingProjection::from).collect();
        debug!("Prepared {} slots for booking", projections.len());
        projections
    }

    pub async fn stats(&self) -> PrioritizationStats {
        PrioritizationStats::from_events(&self.history.lock().await)
    }

    pub async fn history(&self) -> Vec<PrioritizationEvent> {
        self.history.lock().await.clone()
    }

    /// Per-category counts and the date span of `slots`
    pub fn analyze_trends(slots: &[Slot]) -> SlotTrends {
        let national_slots = slots
            .iter()
            .filter(|s| s.category == VisaCategory::National)
            .count();
        let schengen_slots = slots
            .iter()
            .filter(|s| s.category == VisaCategory::Schengen)
            .count();
        let earliest = slots.iter().map(|s| s.date).min();
        let latest = slots.iter().map(|s| s.date).max();

        let average_slots_per_day = match (earliest, latest) {
            (Some(first), Some(last)) => {
                let days = (last.date_naive() - first.date_naive()).num_days() + 1;
                slots.len() as f64 / days as f64
            }
            _ => 0.0,
        };

        SlotTrends {
            total_slots: slots.len(),
            national_slots,
            schengen_slots,
            earliest_slot_date: earliest,
            latest_slot_date: latest,
            average_slots_per_day,
        }
    }

    /// Replace the in-memory history with the persisted one
    ///
    /// An unreadable file is reported to health and the engine starts with
    /// an empty history.
    pub async fn load_history(&self) -> Result<usize> {
        let Some(path) = &self.config.history_file else {
            return Ok(0);
        };

        match load_events(path).await {
            Ok(Some(events)) => {
                let count = events.len();
                *self.history.lock().await = events;
                info!("Loaded {} prioritization events from {}", count, path.display());
                Ok(count)
            }
            Ok(None) => {
                info!("No prioritization history file found. Starting with empty history.");
                Ok(0)
            }
            Err(e) => {
                error!("Failed to load prioritization history: {}", e);
                self.health
                    .record_error("load_prioritization_history", &e.to_string())
                    .await;
                self.history.lock().await.clear();
                Ok(0)
            }
        }
    }

    pub async fn save_history(&self) -> Result<()> {
        let Some(path) = &self.config.history_file else {
            return Ok(());
        };

        let events = self.history.lock().await.clone();
        if let Err(e) = write_json(path, &events).await {
            error!("Failed to save prioritization history: {}", e);
            self.health
                .record_error("save_prioritization_history", &e.to_string())
                .await;
            return Err(e);
        }
        debug!("Saved {} prioritization events", events.len());
        Ok(())
    }

    /// Drop events older than `days` and persist the remainder
    pub async fn cleanup_old_history(&self, days: u32) -> Result<usize> {
        let cutoff = Utc::now() - ChronoDuration::days(i64::from(days));
        let removed = {
            let mut history = self.history.lock().await;
            let before = history.len();
            history.retain(|event| event.timestamp > cutoff);
            before - history.len()
        };
        info!(
            "Cleaned up {} prioritization events older than {} days",
            removed, days
        );
        self.save_history().await?;
        Ok(removed)
    }

    pub fn retention_days(&self) -> u32 {
        self.config.retention_days
    }

    /// Persist the history; called once at shutdown
    pub async fn close(&self) -> Result<()> {
        self.save_history().await?;
        info!("PriorityEngine closed");
        Ok(())
    }
}

/// Keep slots with a recognized category, free spots and a date not before `now`
pub fn validate_at(slots: Vec<Slot>, now: DateTime<Utc>) -> Vec<Slot> {
    slots
        .into_iter()
        .filter(|slot| {
            if !slot.category.is_recognized() {
                warn!("Slot {} has an invalid visa type: {}", slot.id, slot.category);
                return false;
            }
            if slot.available_spots <= 0 {
                warn!("Slot {} has no available spots", slot.id);
                return false;
            }
            if slot.date < now {
                warn!("Slot {} has a past date", slot.id);
                return false;
            }
            true
        })
        .collect()
}

/// Read a persisted prioritization history; `None` when the file does not exist
pub async fn load_events(path: &Path) -> Result<Option<Vec<PrioritizationEvent>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SlotlineError::io(path, e)),
    }
}

pub(crate) async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| SlotlineError::io(parent, e))?;
    }
    let bytes = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| SlotlineError::io(path, e))
}
