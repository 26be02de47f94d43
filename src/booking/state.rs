//! Booking cycle state machine

use serde::Serialize;
use std::fmt;

/// Phase of a booking cycle
///
/// ```text
/// Idle → LoggingIn → CheckingSlots → Prioritizing → FillingForm
///      → SelectingSlot → Confirming → {Succeeded, Failed} → Idle
/// ```
///
/// A cycle handed an already ranked list skips `CheckingSlots` and
/// `Prioritizing`; a cycle with nothing to book returns to `Idle` early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    Idle,
    LoggingIn,
    CheckingSlots,
    Prioritizing,
    FillingForm,
    SelectingSlot,
    Confirming,
    Succeeded,
    Failed,
}

impl CyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CyclePhase::Idle => "idle",
            CyclePhase::LoggingIn => "logging_in",
            CyclePhase::CheckingSlots => "checking_slots",
            CyclePhase::Prioritizing => "prioritizing",
            CyclePhase::FillingForm => "filling_form",
            CyclePhase::SelectingSlot => "selecting_slot",
            CyclePhase::Confirming => "confirming",
            CyclePhase::Succeeded => "succeeded",
            CyclePhase::Failed => "failed",
        }
    }

    pub fn can_transition_to(&self, next: CyclePhase) -> bool {
        use CyclePhase::*;
        match (self, next) {
            (Idle, LoggingIn) => true,
            (LoggingIn, CheckingSlots | FillingForm | Idle) => true,
            (CheckingSlots, Prioritizing) => true,
            (Prioritizing, FillingForm | Idle) => true,
            (FillingForm, SelectingSlot | Idle) => true,
            (SelectingSlot, Confirming | Failed) => true,
            // one confirmation per candidate slot
            (Confirming, SelectingSlot | Succeeded | Failed) => true,
            // terminal phases settle back to Idle; an error aborts from anywhere
            (_, Idle) => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CyclePhase::Succeeded | CyclePhase::Failed)
    }
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
