//! Booking counters and their JSON file

use crate::error::{Result, SlotlineError};
use serde::{Deserialize, Serialize};
use slotline_sentinel::CycleSummary;
use std::path::Path;

/// Monotonic booking counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingStats {
    pub total_attempts: u64,
    pub successful_bookings: u64,
    pub failed_bookings: u64,
}

/// On-disk shape, carrying the derived rate for readers of the file
#[derive(Serialize)]
struct StatsFile<'a> {
    #[serde(flatten)]
    stats: &'a BookingStats,
    success_rate: f64,
}

impl BookingStats {
    pub fn record_attempt(&mut self) {
        self.total_attempts += 1;
    }

    pub fn record_outcome(&mut self, success: bool) {
        if success {
            self.successful_bookings += 1;
        } else {
            self.failed_bookings += 1;
        }
    }

    /// Fraction of attempts that booked a slot, 0 before the first attempt
    pub fn success_rate(&self) -> f64 {
        if self.total_attempts == 0 {
            0.0
        } else {
            self.successful_bookings as f64 / self.total_attempts as f64
        }
    }

    pub fn summary(&self) -> CycleSummary {
        CycleSummary {
            total_attempts: self.total_attempts,
            successful_bookings: self.successful_bookings,
            failed_bookings: self.failed_bookings,
            success_rate: self.success_rate(),
        }
    }

    /// Load counters; a missing file yields zeroed stats
    pub async fn load(path: &Path) -> Result<Self> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(SlotlineError::io(path, e)),
        }
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let file = StatsFile {
            stats: self,
            success_rate: self.success_rate(),
        };
        crate::priority::write_json(path, &file).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_success_rate() {
        let mut stats = BookingStats::default();
        assert_eq!(stats.success_rate(), 0.0);

        for success in [true, false, false, true] {
            stats.record_attempt();
            stats.record_outcome(success);
        }
        assert_eq!(stats.total_attempts, 4);
        assert_eq!(stats.failed_bookings, 2);
        assert_eq!(stats.success_rate(), 0.5);
        assert_eq!(stats.summary().success_rate, 0.5);
    }

    #[tokio::test]
    async fn test_file_includes_success_rate() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data/booking_stats.json");
        assert_eq!(BookingStats::load(&path).await.unwrap(), BookingStats::default());

        let stats = BookingStats {
            total_attempts: 4,
            successful_bookings: 1,
            failed_bookings: 3,
        };
        stats.save(&path).await.unwrap();

        let json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(json["success_rate"], 0.25);
        assert_eq!(json["total_attempts"], 4);

        assert_eq!(BookingStats::load(&path).await.unwrap(), stats);
    }
}
