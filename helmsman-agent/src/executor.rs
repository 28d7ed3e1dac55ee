use async_trait::async_trait;
use helmsman_core::error::HelmsmanResult;
use helmsman_core::types::{ComponentStatus, ComponentUsage, DeployCommand};
use std::path::Path;

/// On-node handle to a realised component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentHandle {
    Container(String),
    Process(u32),
}

impl ComponentHandle {
    pub fn container_id(&self) -> Option<String> {
        match self {
            ComponentHandle::Container(id) => Some(id.clone()),
            ComponentHandle::Process(_) => None,
        }
    }

    pub fn process_id(&self) -> Option<String> {
        match self {
            ComponentHandle::Process(pid) => Some(pid.to_string()),
            ComponentHandle::Container(_) => None,
        }
    }
}

/// Result of probing a handle: observed lifecycle state plus resource
/// usage when the runtime exposes it.
#[derive(Debug, Clone)]
pub struct ComponentProbe {
    pub status: ComponentStatus,
    pub usage: Option<ComponentUsage>,
}

/// The capability that realises a component on a node. One implementation
/// per component type, selected at runtime by the supervisor.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Fetch what the workload needs (image pull, binary download) into
    /// the component's scratch directory.
    async fn prepare(&self, command: &DeployCommand, scratch: &Path) -> HelmsmanResult<()>;

    /// Start the workload and return its handle.
    async fn start(&self, command: &DeployCommand, scratch: &Path)
        -> HelmsmanResult<ComponentHandle>;

    /// Graceful stop: TERM first, KILL after the grace period.
    async fn stop(&self, handle: &ComponentHandle) -> HelmsmanResult<()>;

    /// Probe whether the handle is still live and what it consumes.
    async fn query(&self, handle: &ComponentHandle) -> HelmsmanResult<ComponentProbe>;
}
