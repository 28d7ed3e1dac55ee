use crate::executor::{ComponentHandle, ComponentProbe, Executor};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, RemoveContainerOptions, StartContainerOptions, Stats,
    StatsOptions, StopContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use bollard::Docker;
use futures_util::StreamExt;
use helmsman_core::error::{HelmsmanError, HelmsmanResult};
use helmsman_core::types::{ComponentStatus, ComponentUsage, DeployCommand};
use std::path::Path;
use tracing::{debug, info, warn};

/// Seconds a container gets between TERM and KILL on stop.
const STOP_GRACE_SECS: i64 = 5;

/// Container runtime capability backed by the local Docker daemon.
pub struct DockerExecutor {
    docker: Docker,
}

impl DockerExecutor {
    pub fn new() -> HelmsmanResult<Self> {
        let docker = Docker::connect_with_local_defaults().map_err(docker_err)?;
        Ok(Self { docker })
    }

    fn image_reference(command: &DeployCommand) -> HelmsmanResult<String> {
        let reference = command
            .spec
            .image_url
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(command.spec.image_name.as_deref().filter(|s| !s.is_empty()))
            .ok_or_else(|| {
                HelmsmanError::Validation("Missing docker image information".to_string())
            })?;
        // Bare repository names pull :latest.
        if reference.contains(':') {
            Ok(reference.to_string())
        } else {
            Ok(format!("{}:latest", reference))
        }
    }

    fn container_name(command: &DeployCommand) -> String {
        format!(
            "hm_{}_{}",
            short_id(&command.business_id),
            short_id(&command.spec.component_id)
        )
    }

    async fn container_stats(&self, container_id: &str) -> Option<ComponentUsage> {
        let options = StatsOptions {
            stream: false,
            one_shot: true,
        };
        let mut stream = self.docker.stats(container_id, Some(options));
        match stream.next().await {
            Some(Ok(stats)) => Some(usage_from_stats(&stats)),
            Some(Err(e)) => {
                debug!("Stats for {} unavailable: {}", container_id, e);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl Executor for DockerExecutor {
    async fn prepare(&self, command: &DeployCommand, _scratch: &Path) -> HelmsmanResult<()> {
        let reference = Self::image_reference(command)?;
        info!("Pulling image {}", reference);

        let options = CreateImageOptions {
            from_image: reference.clone(),
            ..Default::default()
        };
        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = stream.next().await {
            progress.map_err(docker_err)?;
        }
        Ok(())
    }

    async fn start(
        &self,
        command: &DeployCommand,
        scratch: &Path,
    ) -> HelmsmanResult<ComponentHandle> {
        let reference = Self::image_reference(command)?;
        let name = Self::container_name(command);

        let env: Vec<String> = command
            .spec
            .environment_variables
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        // Config files written to the scratch directory are bind-mounted
        // at the path the component expects.
        let binds: Vec<String> = command
            .spec
            .config_files
            .iter()
            .map(|file| {
                let host_path = scratch.join(file.path.trim_start_matches('/'));
                format!("{}:{}", host_path.display(), file.path)
            })
            .collect();

        let requirements = &command.spec.resource_requirements;
        let memory = requirements
            .get("memory_mb")
            .and_then(|v| v.as_i64())
            .map(|mb| mb * 1024 * 1024);
        let nano_cpus = requirements
            .get("cpu_cores")
            .and_then(|v| v.as_f64())
            .map(|cores| (cores * 1_000_000_000.0) as i64);

        let config = Config {
            image: Some(reference),
            env: if env.is_empty() { None } else { Some(env) },
            host_config: Some(HostConfig {
                binds: if binds.is_empty() { None } else { Some(binds) },
                memory,
                nano_cpus,
                ..Default::default()
            }),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.clone(),
                    ..Default::default()
                }),
                config,
            )
            .await
            .map_err(docker_err)?;

        self.docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(docker_err)?;

        info!("Started container {} ({})", name, created.id);
        Ok(ComponentHandle::Container(created.id))
    }

    async fn stop(&self, handle: &ComponentHandle) -> HelmsmanResult<()> {
        let ComponentHandle::Container(container_id) = handle else {
            return Err(HelmsmanError::Validation(
                "Docker executor received a process handle".to_string(),
            ));
        };

        // Docker delivers TERM, waits out the grace period, then KILLs.
        if let Err(e) = self
            .docker
            .stop_container(container_id, Some(StopContainerOptions { t: STOP_GRACE_SECS }))
            .await
        {
            warn!("Stop of container {} reported: {}", container_id, e);
        }

        self.docker
            .remove_container(
                container_id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(docker_err)?;

        info!("Removed container {}", container_id);
        Ok(())
    }

    async fn query(&self, handle: &ComponentHandle) -> HelmsmanResult<ComponentProbe> {
        let ComponentHandle::Container(container_id) = handle else {
            return Err(HelmsmanError::Validation(
                "Docker executor received a process handle".to_string(),
            ));
        };

        let inspected = match self.docker.inspect_container(container_id, None).await {
            Ok(inspected) => inspected,
            Err(e) => {
                debug!("Inspect of {} failed: {}", container_id, e);
                return Ok(ComponentProbe {
                    status: ComponentStatus::Unknown,
                    usage: None,
                });
            }
        };

        let running = inspected
            .state
            .as_ref()
            .and_then(|s| s.running)
            .unwrap_or(false);

        if running {
            let usage = self.container_stats(container_id).await;
            Ok(ComponentProbe {
                status: ComponentStatus::Running,
                usage,
            })
        } else {
            Ok(ComponentProbe {
                status: ComponentStatus::Stopped,
                usage: None,
            })
        }
    }
}

fn docker_err(err: bollard::errors::Error) -> HelmsmanError {
    HelmsmanError::System(format!("Docker error: {}", err))
}

fn short_id(id: &str) -> &str {
    &id[..id.len().min(8)]
}

/// Container usage from a one-shot stats sample, following Docker's own
/// cpu-percent formula.
fn usage_from_stats(stats: &Stats) -> ComponentUsage {
    let cpu_delta = stats
        .cpu_stats
        .cpu_usage
        .total_usage
        .saturating_sub(stats.precpu_stats.cpu_usage.total_usage);
    let system_delta = stats
        .cpu_stats
        .system_cpu_usage
        .unwrap_or(0)
        .saturating_sub(stats.precpu_stats.system_cpu_usage.unwrap_or(0));
    let online_cpus = stats.cpu_stats.online_cpus.unwrap_or(1).max(1);

    let cpu_percent = if system_delta > 0 {
        (cpu_delta as f64 / system_delta as f64) * online_cpus as f64 * 100.0
    } else {
        0.0
    };

    let memory_mb = (stats.memory_stats.usage.unwrap_or(0) / (1024 * 1024)) as i64;

    ComponentUsage {
        cpu_percent,
        memory_mb,
        gpu_percent: None,
    }
}
