//! Booking cycle: collaborators, orchestration, counters and events

pub mod collaborators;
pub mod events;
pub mod orchestrator;
pub mod state;
pub mod stats;

pub use collaborators::{
    BookingDriver, Collaborators, FormFiller, LoginClient, SlotSource, UserStore,
};
pub use events::{BookingAttemptResult, BookingEvent};
pub use orchestrator::{BookingOrchestrator, CycleOutcome, CycleStats, USERS_PER_CYCLE};
pub use state::CyclePhase;
pub use stats::BookingStats;
