use crate::client::ManagerClient;
use crate::collectors::{Collector, ResourceSample};
use crate::components::ComponentSupervisor;
use helmsman_core::types::{now_ts, ReportRequest, ResourceReport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

/// Telemetry loop: poll collectors, reconcile component state, push one
/// batch to the manager. Strictly periodic — a slow push never triggers a
/// catch-up burst — and the interval is slept in one-second steps so
/// shutdown stays responsive.
pub struct Reporter {
    client: Arc<ManagerClient>,
    supervisor: Arc<ComponentSupervisor>,
    collectors: Vec<Arc<dyn Collector>>,
    interval_secs: u64,
    is_running: Arc<RwLock<bool>>,
}

impl Reporter {
    pub fn new(
        client: Arc<ManagerClient>,
        supervisor: Arc<ComponentSupervisor>,
        collectors: Vec<Arc<dyn Collector>>,
        interval_secs: u64,
    ) -> Self {
        Self {
            client,
            supervisor,
            collectors,
            interval_secs: interval_secs.max(1),
            is_running: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn start(&self, node_id: String) {
        {
            let mut running = self.is_running.write().await;
            if *running {
                return;
            }
            *running = true;
        }

        let client = Arc::clone(&self.client);
        let supervisor = Arc::clone(&self.supervisor);
        let collectors = self.collectors.clone();
        let interval_secs = self.interval_secs;
        let is_running = Arc::clone(&self.is_running);

        info!("Starting telemetry loop (every {}s)", interval_secs);
        tokio::spawn(async move {
            while *is_running.read().await {
                run_cycle(&client, &supervisor, &collectors, &node_id).await;

                for _ in 0..interval_secs {
                    if !*is_running.read().await {
                        break;
                    }
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
            debug!("Telemetry loop stopped");
        });
    }

    pub async fn stop(&self) {
        *self.is_running.write().await = false;
    }
}

async fn run_cycle(
    client: &ManagerClient,
    supervisor: &ComponentSupervisor,
    collectors: &[Arc<dyn Collector>],
    node_id: &str,
) {
    supervisor.refresh().await;

    let mut resource = ResourceReport::default();
    for collector in collectors {
        match collector.collect().await {
            Ok(ResourceSample::Cpu(cpu)) => resource.cpu = Some(cpu),
            Ok(ResourceSample::Memory(memory)) => resource.memory = Some(memory),
            Err(e) => error!("Collector {} failed: {}", collector.kind(), e),
        }
    }

    let request = ReportRequest {
        node_id: node_id.to_string(),
        timestamp: now_ts(),
        resource,
        components: supervisor.snapshot().await,
    };

    if let Err(e) = client.report(&request).await {
        error!("Failed to report telemetry to manager: {}", e);
    }
}
