use async_trait::async_trait;
use helmsman_core::error::HelmsmanResult;
use helmsman_core::types::{CpuUsage, MemoryUsage};
use sysinfo::System;
use tokio::sync::Mutex;

/// One typed snapshot from a collector.
#[derive(Debug, Clone, Copy)]
pub enum ResourceSample {
    Cpu(CpuUsage),
    Memory(MemoryUsage),
}

/// A pluggable source of host telemetry, polled once per reporting cycle.
#[async_trait]
pub trait Collector: Send + Sync {
    fn kind(&self) -> &'static str;
    async fn collect(&self) -> HelmsmanResult<ResourceSample>;
}

/// CPU usage, load averages and core count. Usage is computed from the
/// delta since the previous refresh, so the first cycle reads low.
pub struct CpuCollector {
    system: Mutex<System>,
}

impl CpuCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        // Prime the counters so the first real sample has a delta.
        system.refresh_cpu_all();
        Self {
            system: Mutex::new(system),
        }
    }
}

impl Default for CpuCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Collector for CpuCollector {
    fn kind(&self) -> &'static str {
        "cpu"
    }

    async fn collect(&self) -> HelmsmanResult<ResourceSample> {
        let mut system = self.system.lock().await;
        system.refresh_cpu_all();

        let load = System::load_average();
        Ok(ResourceSample::Cpu(CpuUsage {
            usage_percent: system.global_cpu_usage() as f64,
            load_avg_1m: load.one,
            load_avg_5m: load.five,
            load_avg_15m: load.fifteen,
            core_count: system.cpus().len() as i64,
        }))
    }
}

/// Total/used/free memory in bytes plus a usage percentage.
pub struct MemoryCollector {
    system: Mutex<System>,
}

impl MemoryCollector {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for MemoryCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Collector for MemoryCollector {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn collect(&self) -> HelmsmanResult<ResourceSample> {
        let mut system = self.system.lock().await;
        system.refresh_memory();

        let total = system.total_memory();
        let used = system.used_memory();
        let free = system.free_memory();
        let usage_percent = if total > 0 {
            100.0 * used as f64 / total as f64
        } else {
            0.0
        };

        Ok(ResourceSample::Memory(MemoryUsage {
            total: total as i64,
            used: used as i64,
            free: free as i64,
            usage_percent,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cpu_collector_reports_plausible_values() {
        let collector = CpuCollector::new();
        let ResourceSample::Cpu(cpu) = collector.collect().await.unwrap() else {
            panic!("cpu collector produced a non-cpu sample");
        };

        assert!(cpu.core_count >= 1);
        assert!(cpu.usage_percent >= 0.0);
        assert!(cpu.usage_percent <= 100.0 * cpu.core_count as f64);
        assert!(cpu.load_avg_1m >= 0.0);
        assert_eq!(collector.kind(), "cpu");
    }

    #[tokio::test]
    async fn memory_collector_adds_up() {
        let collector = MemoryCollector::new();
        let ResourceSample::Memory(memory) = collector.collect().await.unwrap() else {
            panic!("memory collector produced a non-memory sample");
        };

        assert!(memory.total > 0);
        assert!(memory.used <= memory.total);
        assert!(memory.usage_percent >= 0.0 && memory.usage_percent <= 100.0);
        assert_eq!(collector.kind(), "memory");
    }
}
