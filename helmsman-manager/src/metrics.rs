use helmsman_core::types::{CpuUsage, MemoryUsage, Stamped};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Latest resource sample per node, kept only in memory. One lock per
/// metric kind; writes overwrite, reads return a copy. Entries are never
/// evicted — callers use the timestamp to detect staleness.
#[derive(Default)]
pub struct MetricsCache {
    cpu: RwLock<HashMap<String, Stamped<CpuUsage>>>,
    memory: RwLock<HashMap<String, Stamped<MemoryUsage>>>,
}

/// The slice of the cache the scheduler scores against.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeLoad {
    pub cpu_usage_percent: Option<f64>,
    pub memory_usage_percent: Option<f64>,
}

impl MetricsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a CPU sample. The newest source timestamp wins, so a
    /// delayed sample cannot regress a read.
    pub async fn put_cpu(&self, node_id: &str, sample: Stamped<CpuUsage>) {
        let mut map = self.cpu.write().await;
        match map.get(node_id) {
            Some(existing) if existing.timestamp > sample.timestamp => {}
            _ => {
                map.insert(node_id.to_string(), sample);
            }
        }
    }

    pub async fn put_memory(&self, node_id: &str, sample: Stamped<MemoryUsage>) {
        let mut map = self.memory.write().await;
        match map.get(node_id) {
            Some(existing) if existing.timestamp > sample.timestamp => {}
            _ => {
                map.insert(node_id.to_string(), sample);
            }
        }
    }

    pub async fn latest_cpu(&self, node_id: &str) -> Option<Stamped<CpuUsage>> {
        self.cpu.read().await.get(node_id).copied()
    }

    pub async fn latest_memory(&self, node_id: &str) -> Option<Stamped<MemoryUsage>> {
        self.memory.read().await.get(node_id).copied()
    }

    /// Usage percentages for one node, for placement scoring.
    pub async fn node_load(&self, node_id: &str) -> NodeLoad {
        NodeLoad {
            cpu_usage_percent: self.latest_cpu(node_id).await.map(|s| s.data.usage_percent),
            memory_usage_percent: self
                .latest_memory(node_id)
                .await
                .map(|s| s.data.usage_percent),
        }
    }

    /// Load snapshot for a set of nodes, taken once per scheduling call.
    pub async fn load_snapshot(&self, node_ids: &[String]) -> HashMap<String, NodeLoad> {
        let mut snapshot = HashMap::with_capacity(node_ids.len());
        for node_id in node_ids {
            snapshot.insert(node_id.clone(), self.node_load(node_id).await);
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpu(ts: i64, usage: f64) -> Stamped<CpuUsage> {
        Stamped {
            timestamp: ts,
            data: CpuUsage {
                usage_percent: usage,
                load_avg_1m: 0.1,
                load_avg_5m: 0.1,
                load_avg_15m: 0.1,
                core_count: 4,
            },
        }
    }

    fn memory(ts: i64, usage: f64) -> Stamped<MemoryUsage> {
        Stamped {
            timestamp: ts,
            data: MemoryUsage {
                total: 1000,
                used: 250,
                free: 750,
                usage_percent: usage,
            },
        }
    }

    #[tokio::test]
    async fn writes_overwrite_and_reads_copy() {
        let cache = MetricsCache::new();
        cache.put_cpu("node-1", cpu(1, 10.0)).await;
        cache.put_cpu("node-1", cpu(2, 50.0)).await;

        let latest = cache.latest_cpu("node-1").await.unwrap();
        assert_eq!(latest.timestamp, 2);
        assert_eq!(latest.data.usage_percent, 50.0);
        assert!(cache.latest_cpu("node-2").await.is_none());
    }

    #[tokio::test]
    async fn newest_timestamp_wins_regardless_of_arrival_order() {
        let cache = MetricsCache::new();
        cache.put_memory("node-1", memory(200, 80.0)).await;
        // A sample from earlier arrives late and is discarded.
        cache.put_memory("node-1", memory(100, 20.0)).await;

        let latest = cache.latest_memory("node-1").await.unwrap();
        assert_eq!(latest.timestamp, 200);
        assert_eq!(latest.data.usage_percent, 80.0);
    }

    #[tokio::test]
    async fn node_load_reports_missing_kinds_as_none() {
        let cache = MetricsCache::new();
        cache.put_cpu("node-1", cpu(1, 30.0)).await;

        let load = cache.node_load("node-1").await;
        assert_eq!(load.cpu_usage_percent, Some(30.0));
        assert_eq!(load.memory_usage_percent, None);

        let snapshot = cache
            .load_snapshot(&["node-1".to_string(), "node-2".to_string()])
            .await;
        assert!(snapshot["node-2"].cpu_usage_percent.is_none());
    }
}
