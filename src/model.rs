/*!
 * Domain model shared by prioritization and booking
 */

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Visa category a slot can be booked for
///
/// National visas rank ahead of Schengen visas. Anything else the portal
/// reports is kept as `Unrecognized` so validation can drop it with a reason.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VisaCategory {
    National,
    Schengen,
    Unrecognized(String),
}

impl VisaCategory {
    /// Parse a category key or portal label
    pub fn parse(value: &str) -> Self {
        let normalized = value.trim().to_ascii_lowercase();
        if normalized == "national" || normalized.starts_with("nacional") {
            VisaCategory::National
        } else if normalized.starts_with("schengen") {
            VisaCategory::Schengen
        } else {
            VisaCategory::Unrecognized(value.to_string())
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, VisaCategory::Unrecognized(_))
    }

    /// Short key used in files and logs
    pub fn key(&self) -> &str {
        match self {
            VisaCategory::National => "national",
            VisaCategory::Schengen => "schengen",
            VisaCategory::Unrecognized(raw) => raw,
        }
    }

    /// Label shown in the portal's appointment-type selector
    pub fn label(&self) -> &str {
        match self {
            VisaCategory::National => "Nacional (Long-term Portuguese Visa from Angola)",
            VisaCategory::Schengen => "Schengen (Short-term visa for Portugal from Angola)",
            VisaCategory::Unrecognized(raw) => raw,
        }
    }
}

impl From<String> for VisaCategory {
    fn from(value: String) -> Self {
        VisaCategory::parse(&value)
    }
}

impl From<VisaCategory> for String {
    fn from(category: VisaCategory) -> Self {
        category.key().to_string()
    }
}

impl fmt::Display for VisaCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A bookable appointment candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub id: String,
    pub date: DateTime<Utc>,
    #[serde(rename = "type")]
    pub category: VisaCategory,
    /// Remaining capacity; zero or negative slots are dropped by validation
    pub available_spots: i64,
}

impl Slot {
    pub fn new(
        id: impl Into<String>,
        date: DateTime<Utc>,
        category: VisaCategory,
        available_spots: i64,
    ) -> Self {
        Self {
            id: id.into(),
            date,
            category,
            available_spots,
        }
    }
}

/// Slot as reported by the slot-discovery collaborator, before parsing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSlot {
    pub id: String,
    /// RFC 3339 timestamp, `YYYY-MM-DDTHH:MM:SS` (UTC) or a bare `YYYY-MM-DD`
    pub date: String,
    #[serde(rename = "type")]
    pub category: String,
    pub available_spots: i64,
}

impl TryFrom<RawSlot> for Slot {
    type Error = String;

    fn try_from(raw: RawSlot) -> Result<Self, Self::Error> {
        let date = parse_date(&raw.date)
            .ok_or_else(|| format!("Slot {} has an unreadable date '{}'", raw.id, raw.date))?;
        Ok(Slot {
            category: VisaCategory::parse(&raw.category),
            id: raw.id,
            date,
            available_spots: raw.available_spots,
        })
    }
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(value) {
        return Some(date.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Convert a discovery batch, logging and skipping unreadable entries
pub fn parse_slots(raw: Vec<RawSlot>) -> Vec<Slot> {
    raw.into_iter()
        .filter_map(|raw| match Slot::try_from(raw) {
            Ok(slot) => Some(slot),
            Err(reason) => {
                tracing::warn!("{}", reason);
                None
            }
        })
        .collect()
}

/// Plain record handed to the booking flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingProjection {
    pub id: String,
    /// ISO 8601 date
    pub date: String,
    #[serde(rename = "type")]
    pub category: String,
    pub available_spots: i64,
}

impl From<&Slot> for BookingProjection {
    fn from(slot: &Slot) -> Self {
        Self {
            id: slot.id.clone(),
            date: slot.date.to_rfc3339(),
            category: slot.category.label().to_string(),
            available_spots: slot.available_spots,
        }
    }
}

/// Whether an applicant still needs an appointment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserBookingStatus {
    #[default]
    Pending,
    Booked,
}

impl fmt::Display for UserBookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserBookingStatus::Pending => f.write_str("pending"),
            UserBookingStatus::Booked => f.write_str("booked"),
        }
    }
}

/// An applicant record from the user store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub passport_number: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub date_of_birth: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub booking_status: UserBookingStatus,
}

impl User {
    pub fn new(
        passport_number: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            passport_number: passport_number.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            date_of_birth: None,
            email: None,
            phone_number: None,
            booking_status: UserBookingStatus::Pending,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}
