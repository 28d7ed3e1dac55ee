//! Helmsman per-node agent: registers the host with the manager, pushes
//! periodic telemetry, and realises components through the container and
//! process executors.

use anyhow::{Context, Result};
use helmsman_core::types::RegisterRequest;
use helmsman_core::AgentConfig;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

pub mod api;
pub mod client;
pub mod collectors;
pub mod components;
pub mod docker;
pub mod executor;
pub mod identity;
pub mod probes;
pub mod process;
pub mod reporter;

use client::ManagerClient;
use collectors::{Collector, CpuCollector, MemoryCollector};
use components::ComponentSupervisor;
use docker::DockerExecutor;
use process::ProcessExecutor;
use reporter::Reporter;

/// Agent process wiring: identity, probes, collectors, executors and the
/// inbound command listener.
pub struct Agent {
    config: AgentConfig,
    client: Arc<ManagerClient>,
    supervisor: Arc<ComponentSupervisor>,
    reporter: Reporter,
}

impl Agent {
    pub fn new(config: AgentConfig) -> Result<Self> {
        let client = Arc::new(
            ManagerClient::new(&config.manager_url).context("Failed to build manager client")?,
        );

        let docker_executor =
            Arc::new(DockerExecutor::new().context("Failed to initialize docker executor")?);
        let process_executor =
            Arc::new(ProcessExecutor::new().context("Failed to initialize process executor")?);
        let supervisor = Arc::new(ComponentSupervisor::new(
            docker_executor,
            process_executor,
            PathBuf::from(&config.work_dir),
        ));

        let collector_set: Vec<Arc<dyn Collector>> = vec![
            Arc::new(CpuCollector::new()),
            Arc::new(MemoryCollector::new()),
        ];
        let reporter = Reporter::new(
            Arc::clone(&client),
            Arc::clone(&supervisor),
            collector_set,
            config.interval,
        );

        Ok(Self {
            config,
            client,
            supervisor,
            reporter,
        })
    }

    /// Register with the manager: present the persisted identity when one
    /// exists, adopt the assigned node id, and ingest the components the
    /// manager believes this node runs.
    pub async fn register(&self) -> Result<String> {
        let known_id = identity::read_node_id(&self.config.identity_file).await;

        let request = RegisterRequest {
            node_id: known_id,
            hostname: probes::probe_hostname(self.config.hostname.as_deref()),
            ip_address: probes::probe_ip_address(
                self.config.network_interface.as_deref(),
                &self.config.manager_url,
            ),
            os_info: probes::probe_os_info(),
            cpu_model: probes::probe_cpu_model(),
            gpu_count: probes::probe_gpu_count(),
            port: self.config.port,
            parent_chassis_id: None,
            slot_index: None,
        };

        let response = self
            .client
            .register(&request)
            .await
            .context("Failed to register with manager")?;

        let node_id = response
            .node_id
            .filter(|id| !id.is_empty())
            .context("Manager did not assign a node id")?;
        identity::write_node_id(&self.config.identity_file, &node_id)
            .await
            .context("Failed to persist node id")?;

        for component in &response.components {
            self.supervisor.adopt(component).await;
        }
        info!(
            "Registered as {} ({} components recovered)",
            node_id,
            response.components.len()
        );

        Ok(node_id)
    }

    pub fn router(&self) -> axum::Router {
        api::create_router(api::AgentApiState {
            supervisor: Arc::clone(&self.supervisor),
        })
    }

    /// Register, start the telemetry loop, and serve the command listener
    /// until the shutdown future resolves.
    pub async fn serve(&self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let node_id = self.register().await?;
        self.reporter.start(node_id).await;

        let addr = format!("0.0.0.0:{}", self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind agent port {}", self.config.port))?;
        info!("Agent listening on {}", addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .context("Agent HTTP server failed")?;

        self.reporter.stop().await;
        info!("Agent shutdown complete");
        Ok(())
    }
}
