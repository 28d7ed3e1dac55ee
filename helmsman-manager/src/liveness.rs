use crate::store::Store;
use helmsman_core::types::{now_ts, NodeStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

/// Background sweeper that marks nodes offline once they stop reporting.
/// Transitions back to online happen only on inbound register, heartbeat
/// or telemetry — never here. Component statuses are untouched: a silent
/// node may still be running its workloads.
pub struct LivenessMonitor {
    store: Arc<Store>,
    threshold_secs: i64,
    scan_interval: Duration,
    is_running: Arc<RwLock<bool>>,
}

impl LivenessMonitor {
    pub fn new(store: Arc<Store>, threshold_secs: i64) -> Self {
        Self {
            store,
            threshold_secs,
            scan_interval: Duration::from_secs(1),
            is_running: Arc::new(RwLock::new(false)),
        }
    }

    /// Spawn the scan loop. Idempotent: a second start is a no-op.
    pub async fn start(&self) {
        {
            let mut running = self.is_running.write().await;
            if *running {
                return;
            }
            *running = true;
        }

        let store = Arc::clone(&self.store);
        let threshold = self.threshold_secs;
        let scan_interval = self.scan_interval;
        let is_running = Arc::clone(&self.is_running);

        info!("Starting liveness monitor (threshold: {}s)", threshold);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(scan_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            while *is_running.read().await {
                interval.tick().await;
                if let Err(e) = sweep_once(&store, threshold).await {
                    error!("Liveness sweep failed: {}", e);
                }
            }
            debug!("Liveness monitor stopped");
        });
    }

    pub async fn stop(&self) {
        *self.is_running.write().await = false;
    }
}

/// One scan: every node that is not offline yet and has been silent for
/// longer than the threshold is flipped offline.
pub async fn sweep_once(store: &Store, threshold_secs: i64) -> helmsman_core::HelmsmanResult<()> {
    let stale = store.stale_online_nodes(now_ts(), threshold_secs).await?;
    for node_id in stale {
        info!("Node {} exceeded liveness threshold, marking offline", node_id);
        store.set_node_status(&node_id, NodeStatus::Offline).await?;
    }
    Ok(())
}
