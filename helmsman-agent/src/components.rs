use crate::executor::{ComponentHandle, Executor};
use helmsman_core::error::{HelmsmanError, HelmsmanResult};
use helmsman_core::types::{
    ComponentRecord, ComponentStatus, ComponentStatusReport, ComponentUsage, DeployCommand,
    StopCommand,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Local view of one component the agent supervises.
#[derive(Debug, Clone)]
pub struct ComponentEntry {
    pub command: DeployCommand,
    pub status: ComponentStatus,
    pub handle: Option<ComponentHandle>,
    pub usage: Option<ComponentUsage>,
}

/// Owns the agent's component table and drives the per-component state
/// machine. Deploy/stop run on detached workers; the table lock is only
/// held for status mutation, never across an executor call.
pub struct ComponentSupervisor {
    components: Mutex<HashMap<String, ComponentEntry>>,
    docker: Arc<dyn Executor>,
    process: Arc<dyn Executor>,
    work_dir: PathBuf,
}

impl ComponentSupervisor {
    pub fn new(docker: Arc<dyn Executor>, process: Arc<dyn Executor>, work_dir: PathBuf) -> Self {
        Self {
            components: Mutex::new(HashMap::new()),
            docker,
            process,
            work_dir,
        }
    }

    fn executor_for(&self, command: &DeployCommand) -> Arc<dyn Executor> {
        match command.spec.kind {
            helmsman_core::types::ComponentType::Docker => Arc::clone(&self.docker),
            helmsman_core::types::ComponentType::Binary => Arc::clone(&self.process),
        }
    }

    fn scratch_dir(&self, component_id: &str) -> PathBuf {
        self.work_dir.join(component_id)
    }

    /// Ingest a component the manager believes lives here (register
    /// recovery). An existing handle is adopted; the next refresh
    /// reconciles its real state.
    pub async fn adopt(&self, record: &ComponentRecord) {
        let handle = record
            .container_id
            .as_ref()
            .map(|id| ComponentHandle::Container(id.clone()))
            .or_else(|| {
                record
                    .process_id
                    .as_ref()
                    .and_then(|pid| pid.parse::<u32>().ok())
                    .map(ComponentHandle::Process)
            });

        let entry = ComponentEntry {
            command: DeployCommand {
                business_id: record.business_id.clone(),
                spec: record.spec.clone(),
            },
            status: record.status,
            handle,
            usage: None,
        };

        let mut components = self.components.lock().await;
        components.insert(record.spec.component_id.clone(), entry);
    }

    /// Deploy worker body: `absent/stopped -> starting -> running`, or
    /// `-> error` on any setup failure. The result travels to the manager
    /// with the next telemetry push.
    pub async fn deploy(&self, command: DeployCommand) {
        let component_id = command.spec.component_id.clone();
        info!(
            "Deploying component {} ({})",
            command.spec.component_name, component_id
        );

        {
            let mut components = self.components.lock().await;
            components.insert(
                component_id.clone(),
                ComponentEntry {
                    command: command.clone(),
                    status: ComponentStatus::Starting,
                    handle: None,
                    usage: None,
                },
            );
        }

        match self.run_deploy(&command).await {
            Ok(handle) => {
                let mut components = self.components.lock().await;
                if let Some(entry) = components.get_mut(&component_id) {
                    entry.status = ComponentStatus::Running;
                    entry.handle = Some(handle);
                }
                info!("Component {} is running", component_id);
            }
            Err(e) => {
                error!("Deploy of component {} failed: {}", component_id, e);
                let mut components = self.components.lock().await;
                if let Some(entry) = components.get_mut(&component_id) {
                    entry.status = ComponentStatus::Error;
                    entry.handle = None;
                }
            }
        }
    }

    async fn run_deploy(&self, command: &DeployCommand) -> HelmsmanResult<ComponentHandle> {
        let scratch = self.scratch_dir(&command.spec.component_id);
        tokio::fs::create_dir_all(&scratch).await?;
        materialise_config_files(command, &scratch).await?;

        let executor = self.executor_for(command);
        executor.prepare(command, &scratch).await?;
        executor.start(command, &scratch).await
    }

    /// Stop worker body: `running -> stopping -> stopped`. With
    /// `permanently` the component also leaves the local table.
    pub async fn stop(&self, command: StopCommand) {
        let component_id = command.component_id.clone();
        info!("Stopping component {}", component_id);

        let (executor, handle) = {
            let mut components = self.components.lock().await;
            match components.get_mut(&component_id) {
                Some(entry) => {
                    entry.status = ComponentStatus::Stopping;
                    (
                        self.executor_for(&entry.command),
                        entry.handle.clone().or_else(|| handle_from_stop(&command)),
                    )
                }
                None => {
                    // Unknown locally; the manager may still hold a
                    // handle worth acting on.
                    match handle_from_stop(&command) {
                        Some(handle) => {
                            let executor = match &handle {
                                ComponentHandle::Container(_) => Arc::clone(&self.docker),
                                ComponentHandle::Process(_) => Arc::clone(&self.process),
                            };
                            (executor, Some(handle))
                        }
                        None => {
                            warn!("Stop for unknown component {} without handle", component_id);
                            return;
                        }
                    }
                }
            }
        };

        if let Some(handle) = handle {
            if let Err(e) = executor.stop(&handle).await {
                warn!("Stop of component {} reported: {}", component_id, e);
            }
        }

        let mut components = self.components.lock().await;
        if command.permanently {
            components.remove(&component_id);
            info!("Component {} removed from local state", component_id);
        } else if let Some(entry) = components.get_mut(&component_id) {
            entry.status = ComponentStatus::Stopped;
            entry.handle = None;
            entry.usage = None;
        }
    }

    /// Reconcile every supervised handle against the runtime. Queries run
    /// outside the table lock. A transient query failure of a running
    /// component reads as `unknown`, not as a stop.
    pub async fn refresh(&self) {
        let targets: Vec<(String, Arc<dyn Executor>, ComponentHandle)> = {
            let components = self.components.lock().await;
            components
                .iter()
                .filter_map(|(id, entry)| {
                    entry.handle.clone().map(|handle| {
                        (id.clone(), self.executor_for(&entry.command), handle)
                    })
                })
                .collect()
        };

        for (component_id, executor, handle) in targets {
            let probe = match executor.query(&handle).await {
                Ok(probe) => probe,
                Err(e) => {
                    warn!("Query of component {} failed: {}", component_id, e);
                    continue;
                }
            };

            let mut components = self.components.lock().await;
            let Some(entry) = components.get_mut(&component_id) else { continue };
            match probe.status {
                ComponentStatus::Running => {
                    entry.status = ComponentStatus::Running;
                    entry.usage = probe.usage;
                }
                ComponentStatus::Stopped => {
                    entry.status = ComponentStatus::Stopped;
                    entry.handle = None;
                    entry.usage = None;
                }
                ComponentStatus::Unknown => {
                    if entry.status == ComponentStatus::Running {
                        entry.status = ComponentStatus::Unknown;
                    }
                    entry.usage = None;
                }
                _ => {}
            }
        }
    }

    /// Current table as a telemetry batch.
    pub async fn snapshot(&self) -> Vec<ComponentStatusReport> {
        let components = self.components.lock().await;
        components
            .values()
            .map(|entry| ComponentStatusReport {
                component_id: entry.command.spec.component_id.clone(),
                business_id: Some(entry.command.business_id.clone()),
                kind: entry.command.spec.kind,
                status: entry.status,
                container_id: entry.handle.as_ref().and_then(|h| h.container_id()),
                process_id: entry.handle.as_ref().and_then(|h| h.process_id()),
                resource_usage: entry.usage,
            })
            .collect()
    }

    pub async fn component_count(&self) -> usize {
        self.components.lock().await.len()
    }
}

fn handle_from_stop(command: &StopCommand) -> Option<ComponentHandle> {
    if let Some(container_id) = command.container_id.as_ref().filter(|s| !s.is_empty()) {
        return Some(ComponentHandle::Container(container_id.clone()));
    }
    command
        .process_id
        .as_ref()
        .and_then(|pid| pid.parse::<u32>().ok())
        .map(ComponentHandle::Process)
}

/// Write each declared config file under the component's scratch
/// directory, mirroring its absolute path.
async fn materialise_config_files(command: &DeployCommand, scratch: &Path) -> HelmsmanResult<()> {
    for file in &command.spec.config_files {
        if file.path.is_empty() {
            return Err(HelmsmanError::Validation(
                "Config file with empty path".to_string(),
            ));
        }
        let target = scratch.join(file.path.trim_start_matches('/'));
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, &file.content).await?;
    }
    Ok(())
}
