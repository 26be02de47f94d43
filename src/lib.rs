/*!
 * Slotline - resilient appointment slot booking
 *
 * Coordination core of a bot that books visa appointment slots on a portal:
 * - Slot validation and ranking (National before Schengen, earliest first)
 * - Booking cycles with per-slot locking, rate limiting and scheduled retries
 * - Retries with backoff and per-operation circuit breakers (core-resilience)
 * - Health monitoring with auto-recovery and daily history (sentinel)
 * - Supervised runtime with a slot poller and an HTTP health endpoint
 *
 * Browser mechanics stay behind the collaborator traits in [`booking`].
 */

pub mod booking;
pub mod bot;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod portal;
pub mod priority;

// Re-export commonly used types
pub use booking::{
    BookingEvent, BookingOrchestrator, BookingStats, Collaborators, CycleOutcome, CycleStats,
};
pub use bot::{BotComponents, Supervisor};
pub use config::{BotConfig, LogLevel};
pub use error::{Result, SlotlineError};
pub use model::{Slot, User, VisaCategory};
pub use priority::PriorityEngine;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
