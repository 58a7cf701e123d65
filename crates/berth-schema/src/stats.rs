use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One sample from the engine's stats endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContainerStats {
    #[serde(default)]
    pub read: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cpu_stats: CpuStats,
    #[serde(default)]
    pub precpu_stats: CpuStats,
    #[serde(default)]
    pub memory_stats: MemoryStats,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CpuStats {
    #[serde(default)]
    pub cpu_usage: CpuUsage,
    #[serde(default)]
    pub system_cpu_usage: u64,
    #[serde(default)]
    pub online_cpus: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CpuUsage {
    #[serde(default)]
    pub total_usage: u64,
    #[serde(default, deserialize_with = "crate::nullable")]
    pub percpu_usage: Vec<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemoryStats {
    #[serde(default)]
    pub usage: u64,
    #[serde(default)]
    pub limit: u64,
    #[serde(default, deserialize_with = "crate::nullable")]
    pub stats: BTreeMap<String, u64>,
}

impl ContainerStats {
    /// CPU usage relative to one core, as `docker stats` reports it.
    pub fn cpu_percent(&self) -> f64 {
        let cpu_delta = self.cpu_stats.cpu_usage.total_usage as f64
            - self.precpu_stats.cpu_usage.total_usage as f64;
        let system_delta =
            self.cpu_stats.system_cpu_usage as f64 - self.precpu_stats.system_cpu_usage as f64;

        if system_delta == 0.0 || cpu_delta == 0.0 {
            return 0.0;
        }

        let mut cpus = self.cpu_stats.cpu_usage.percpu_usage.len() as f64;
        if cpus == 0.0 {
            cpus = f64::from(self.cpu_stats.online_cpus.max(1));
        }

        (cpu_delta / system_delta) * cpus * 100.0
    }

    /// Memory in use (page cache excluded) as a share of the limit.
    pub fn memory_percent(&self) -> f64 {
        let limit = self.memory_stats.limit as f64;
        if limit == 0.0 {
            return 0.0;
        }
        let cache = self.memory_stats.stats.get("cache").copied().unwrap_or(0);
        let used = self.memory_stats.usage.saturating_sub(cache) as f64;
        (used / limit) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(total: u64, pre_total: u64, system: u64, pre_system: u64, cpus: usize) -> ContainerStats {
        ContainerStats {
            cpu_stats: CpuStats {
                cpu_usage: CpuUsage {
                    total_usage: total,
                    percpu_usage: vec![0; cpus],
                },
                system_cpu_usage: system,
                online_cpus: 0,
            },
            precpu_stats: CpuStats {
                cpu_usage: CpuUsage {
                    total_usage: pre_total,
                    percpu_usage: Vec::new(),
                },
                system_cpu_usage: pre_system,
                online_cpus: 0,
            },
            ..Default::default()
        }
    }

    #[test]
    fn cpu_percent_scales_by_cpu_count() {
        let s = sample(200, 100, 2000, 1000, 4);
        assert!((s.cpu_percent() - 40.0).abs() < 1e-9);
    }

    #[test]
    fn cpu_percent_zero_deltas() {
        assert_eq!(sample(100, 100, 2000, 1000, 2).cpu_percent(), 0.0);
        assert_eq!(sample(200, 100, 1000, 1000, 2).cpu_percent(), 0.0);
    }

    #[test]
    fn cpu_percent_defaults_to_one_cpu() {
        let s = sample(150, 100, 1100, 1000, 0);
        assert!((s.cpu_percent() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn memory_percent_excludes_cache() {
        let mut s = ContainerStats::default();
        s.memory_stats.usage = 600;
        s.memory_stats.limit = 1000;
        s.memory_stats.stats.insert("cache".to_owned(), 100);
        assert!((s.memory_percent() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn memory_percent_without_limit() {
        let mut s = ContainerStats::default();
        s.memory_stats.usage = 600;
        assert_eq!(s.memory_percent(), 0.0);
    }

    #[test]
    fn parses_engine_sample() {
        let json = r#"{
            "read": "2024-05-01T12:00:00Z",
            "cpu_stats": {"cpu_usage": {"total_usage": 10, "percpu_usage": null}, "system_cpu_usage": 100, "online_cpus": 2},
            "precpu_stats": {"cpu_usage": {"total_usage": 5}, "system_cpu_usage": 50},
            "memory_stats": {"usage": 10, "limit": 100}
        }"#;
        let s: ContainerStats = serde_json::from_str(json).unwrap();
        assert!(s.read.is_some());
        assert_eq!(s.cpu_stats.online_cpus, 2);
        assert!((s.cpu_percent() - 20.0).abs() < 1e-9);
    }
}
