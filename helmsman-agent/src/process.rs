use crate::executor::{ComponentHandle, ComponentProbe, Executor};
use async_trait::async_trait;
use helmsman_core::error::{HelmsmanError, HelmsmanResult};
use helmsman_core::types::{ComponentStatus, DeployCommand};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Seconds a process gets to exit after TERM before KILL.
const STOP_GRACE_SECS: u64 = 5;

/// Native-binary capability: downloads or reuses a binary, launches it as
/// a child process, and supervises it by pid.
pub struct ProcessExecutor {
    http: reqwest::Client,
}

impl ProcessExecutor {
    pub fn new() -> HelmsmanResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()?;
        Ok(Self { http })
    }

    /// Where the runnable binary lives for this component: a download
    /// lands in the scratch directory, a pre-provisioned path is used
    /// as-is.
    fn binary_location(command: &DeployCommand, scratch: &Path) -> HelmsmanResult<PathBuf> {
        if let Some(url) = command.spec.binary_url.as_deref().filter(|s| !s.is_empty()) {
            let file_name = url
                .rsplit('/')
                .next()
                .filter(|s| !s.is_empty())
                .unwrap_or("component.bin");
            return Ok(scratch.join("bin").join(file_name));
        }
        command
            .spec
            .binary_path
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| HelmsmanError::Validation("Missing binary information".to_string()))
    }
}

#[async_trait]
impl Executor for ProcessExecutor {
    async fn prepare(&self, command: &DeployCommand, scratch: &Path) -> HelmsmanResult<()> {
        let Some(url) = command.spec.binary_url.as_deref().filter(|s| !s.is_empty()) else {
            // Pre-provisioned binary; nothing to fetch.
            return Ok(());
        };

        let target = Self::binary_location(command, scratch)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        info!("Downloading binary from {} to {}", url, target.display());
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(HelmsmanError::Network(format!(
                "Binary download failed: HTTP {}",
                response.status().as_u16()
            )));
        }
        let bytes = response.bytes().await?;
        tokio::fs::write(&target, &bytes).await?;

        let mut permissions = tokio::fs::metadata(&target).await?.permissions();
        permissions.set_mode(0o755);
        tokio::fs::set_permissions(&target, permissions).await?;

        Ok(())
    }

    async fn start(
        &self,
        command: &DeployCommand,
        scratch: &Path,
    ) -> HelmsmanResult<ComponentHandle> {
        let binary = Self::binary_location(command, scratch)?;
        if !binary.exists() {
            return Err(HelmsmanError::System(format!(
                "Binary not found: {}",
                binary.display()
            )));
        }

        let child = tokio::process::Command::new(&binary)
            .envs(&command.spec.environment_variables)
            .current_dir(scratch)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| HelmsmanError::System(format!("Failed to start {}: {}", binary.display(), e)))?;

        let pid = child
            .id()
            .ok_or_else(|| HelmsmanError::System("Spawned process has no pid".to_string()))?;

        // The child is supervised by pid from here on; dropping the
        // handle must not kill it.
        drop(child);

        info!("Started process {} ({})", binary.display(), pid);
        Ok(ComponentHandle::Process(pid))
    }

    async fn stop(&self, handle: &ComponentHandle) -> HelmsmanResult<()> {
        let ComponentHandle::Process(pid) = handle else {
            return Err(HelmsmanError::Validation(
                "Process executor received a container handle".to_string(),
            ));
        };
        let pid = Pid::from_raw(*pid as i32);

        if let Err(e) = kill(pid, Signal::SIGTERM) {
            debug!("TERM to {} reported: {} (already gone?)", pid, e);
            return Ok(());
        }

        for _ in 0..STOP_GRACE_SECS {
            match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => {}
                Ok(_) => return Ok(()),
                // Not our child (adopted after an agent restart); probe
                // with signal 0 instead.
                Err(_) => {
                    if kill(pid, None).is_err() {
                        return Ok(());
                    }
                }
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        warn!("Process {} survived TERM, sending KILL", pid);
        let _ = kill(pid, Signal::SIGKILL);
        let _ = waitpid(pid, None);
        Ok(())
    }

    async fn query(&self, handle: &ComponentHandle) -> HelmsmanResult<ComponentProbe> {
        let ComponentHandle::Process(pid) = handle else {
            return Err(HelmsmanError::Validation(
                "Process executor received a container handle".to_string(),
            ));
        };
        let pid = Pid::from_raw(*pid as i32);

        // Reap if our child has exited; otherwise probe with signal 0.
        let status = match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => ComponentStatus::Running,
            Ok(_) => ComponentStatus::Stopped,
            Err(_) => {
                if kill(pid, None).is_ok() {
                    ComponentStatus::Running
                } else {
                    ComponentStatus::Stopped
                }
            }
        };

        Ok(ComponentProbe {
            status,
            usage: None,
        })
    }
}
