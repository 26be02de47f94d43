//! Host resource sampling

use async_trait::async_trait;
use slotline_core_resilience::SystemHealth;
use sysinfo::{Disks, System};

/// Source of host resource samples
#[async_trait]
pub trait SystemSampler: Send + Sync {
    /// Sample CPU, memory and disk usage. Network latency is filled in by the caller.
    async fn sample(&self) -> anyhow::Result<SystemHealth>;
}

/// Samples the local host through sysinfo
#[derive(Debug, Clone, Copy, Default)]
pub struct SysinfoSampler;

impl SysinfoSampler {
    fn sample_blocking() -> SystemHealth {
        let mut sys = System::new();

        // CPU usage needs two refreshes separated by the minimum interval
        sys.refresh_cpu_usage();
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        sys.refresh_cpu_usage();
        sys.refresh_memory();

        let cpu_usage = (sys.global_cpu_usage() as f64 / 100.0).clamp(0.0, 1.0);
        let memory_usage = ratio(sys.used_memory(), sys.total_memory());

        let disks = Disks::new_with_refreshed_list();
        let root = disks
            .list()
            .iter()
            .find(|disk| disk.mount_point() == std::path::Path::new("/"))
            .or_else(|| disks.list().iter().max_by_key(|disk| disk.total_space()));
        let disk_usage = root
            .map(|disk| {
                ratio(
                    disk.total_space().saturating_sub(disk.available_space()),
                    disk.total_space(),
                )
            })
            .unwrap_or(0.0);

        SystemHealth {
            cpu_usage,
            memory_usage,
            disk_usage,
            network_latency: None,
            uptime_secs: System::uptime(),
        }
    }
}

fn ratio(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (used as f64 / total as f64).clamp(0.0, 1.0)
    }
}

#[async_trait]
impl SystemSampler for SysinfoSampler {
    async fn sample(&self) -> anyhow::Result<SystemHealth> {
        let sample = tokio::task::spawn_blocking(Self::sample_blocking).await?;
        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_guards_zero_total() {
        assert_eq!(ratio(10, 0), 0.0);
        assert_eq!(ratio(1, 4), 0.25);
        assert_eq!(ratio(8, 4), 1.0);
    }

    #[tokio::test]
    async fn test_sysinfo_sample_in_range() {
        let sample = SysinfoSampler.sample().await.unwrap();
        for value in [sample.cpu_usage, sample.memory_usage, sample.disk_usage] {
            assert!((0.0..=1.0).contains(&value));
        }
        assert!(sample.network_latency.is_none());
    }
}
