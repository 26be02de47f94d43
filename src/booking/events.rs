//! Terminal events emitted once per booking attempt

use crate::model::{Slot, User};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Result of one booking attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingAttemptResult {
    pub success: bool,
    pub booking_id: Uuid,
    pub latency_seconds: f64,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BookingEvent {
    BookingSuccess {
        slot: Slot,
        booking_id: Uuid,
        /// Lead applicant
        user: User,
        /// Applicants added to the same appointment
        companions: Vec<User>,
        latency: f64,
    },
    BookingError {
        slot: Slot,
        booking_id: Uuid,
        user: User,
        companions: Vec<User>,
        error: String,
        latency: f64,
    },
}

impl BookingEvent {
    pub fn slot(&self) -> &Slot {
        match self {
            BookingEvent::BookingSuccess { slot, .. } | BookingEvent::BookingError { slot, .. } => {
                slot
            }
        }
    }

    pub fn booking_id(&self) -> Uuid {
        match self {
            BookingEvent::BookingSuccess { booking_id, .. }
            | BookingEvent::BookingError { booking_id, .. } => *booking_id,
        }
    }

    /// Every applicant covered by the attempt, lead first
    pub fn applicants(&self) -> impl Iterator<Item = &User> {
        let (user, companions) = match self {
            BookingEvent::BookingSuccess {
                user, companions, ..
            }
            | BookingEvent::BookingError {
                user, companions, ..
            } => (user, companions),
        };
        std::iter::once(user).chain(companions.iter())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BookingEvent::BookingSuccess { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VisaCategory;
    use chrono::Utc;

    #[test]
    fn test_event_json_shape() {
        let event = BookingEvent::BookingError {
            slot: Slot::new("s1", Utc::now(), VisaCategory::Schengen, 1),
            booking_id: Uuid::nil(),
            user: User::new("P1", "Ana", "Silva"),
            companions: vec![User::new("P2", "Rui", "Silva")],
            error: "Booking not confirmed".into(),
            latency: 1.5,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "booking_error");
        assert_eq!(json["slot"]["id"], "s1");
        assert_eq!(json["user"]["passportNumber"], "P1");

        let applicants: Vec<_> = event
            .applicants()
            .map(|u| u.passport_number.as_str())
            .collect();
        assert_eq!(applicants, vec!["P1", "P2"]);
        assert!(!event.is_success());
    }
}
