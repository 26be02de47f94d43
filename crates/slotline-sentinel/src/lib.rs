//! Slotline Sentinel: Health Monitoring and Self-Recovery
//!
//! The Sentinel is the bot's immune system. It periodically probes the
//! portal endpoints, samples the host, aggregates every error reported by the
//! other subsystems and tries to recover components that stopped answering.
//!
//! # Architecture: The Check Loop
//!
//! ```text
//! ┌─────────────┐
//! │  Probe      │──> GET every configured endpoint (bounded timeout)
//! └──────┬──────┘
//!        │
//!        v
//! ┌─────────────┐
//! │  Sample     │──> CPU / memory / disk / network latency
//! └──────┬──────┘
//!        │
//!        v
//! ┌─────────────┐
//! │  Decide     │──> Healthy? Degraded? Critical?
//! └──────┬──────┘
//!        │
//!        v
//! ┌─────────────┐
//! │  Act        │──> Medic re-probes, events broadcast, history appended
//! └──────┬──────┘
//!        │
//!        └────> Loop
//! ```
//!
//! # Example
//!
//! ```no_run
//! use slotline_sentinel::{HealthMonitor, HealthPolicy};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let mut policy = HealthPolicy::default();
//! policy
//!     .endpoints
//!     .insert("portal".to_string(), "https://portal.example/health".to_string());
//!
//! let monitor = Arc::new(HealthMonitor::with_defaults(policy)?);
//! monitor.initialize().await?;
//!
//! tokio::spawn(monitor.clone().run());
//! # Ok(())
//! # }
//! ```

pub mod daemon;
pub mod error;
pub mod events;
pub mod history;
pub mod medic;
pub mod metrics;
pub mod policy;
pub mod probe;
pub mod system;

pub use daemon::HealthMonitor;
pub use error::SentinelError;
pub use events::HealthEvent;
pub use history::{HealthHistory, HistoryRecord};
pub use metrics::{CheckReport, CycleSummary, RecoveryReport};
pub use policy::HealthPolicy;
pub use probe::{ComponentProbe, HttpProbe};
pub use system::{SysinfoSampler, SystemSampler};
