use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Current wall-clock time as unix seconds, the unit used for every
/// persisted and wire-level timestamp.
pub fn now_ts() -> i64 {
    Utc::now().timestamp()
}

pub fn new_node_id() -> String {
    format!("node-{}", Uuid::new_v4())
}

pub fn new_component_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn new_business_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn new_component_template_id() -> String {
    format!("ct-{}", Uuid::new_v4())
}

pub fn new_business_template_id() -> String {
    format!("bt-{}", Uuid::new_v4())
}

/// Node liveness as tracked by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Online,
    Offline,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Online => "online",
            NodeStatus::Offline => "offline",
        }
    }

    pub fn parse(s: &str) -> NodeStatus {
        match s {
            "offline" => NodeStatus::Offline,
            _ => NodeStatus::Online,
        }
    }
}

/// What realises a component on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentType {
    Docker,
    Binary,
}

impl ComponentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentType::Docker => "docker",
            ComponentType::Binary => "binary",
        }
    }

    pub fn parse(s: &str) -> Option<ComponentType> {
        match s {
            "docker" => Some(ComponentType::Docker),
            "binary" => Some(ComponentType::Binary),
            _ => None,
        }
    }
}

/// Lifecycle state of a component instance. The manager persists whatever
/// the owning agent last reported; the agent-side worker walks the full
/// machine (starting/stopping are transient agent states).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Scheduled,
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
    Unknown,
}

impl ComponentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentStatus::Scheduled => "scheduled",
            ComponentStatus::Starting => "starting",
            ComponentStatus::Running => "running",
            ComponentStatus::Stopping => "stopping",
            ComponentStatus::Stopped => "stopped",
            ComponentStatus::Error => "error",
            ComponentStatus::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> ComponentStatus {
        match s {
            "scheduled" => ComponentStatus::Scheduled,
            "starting" => ComponentStatus::Starting,
            "running" => ComponentStatus::Running,
            "stopping" => ComponentStatus::Stopping,
            "stopped" => ComponentStatus::Stopped,
            "error" => ComponentStatus::Error,
            _ => ComponentStatus::Unknown,
        }
    }
}

/// Stored business status: the last lifecycle command. Reads overlay
/// `Error` whenever any component is not running (derive-on-read).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusinessStatus {
    Running,
    Stopped,
    Error,
}

impl BusinessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusinessStatus::Running => "running",
            BusinessStatus::Stopped => "stopped",
            BusinessStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> BusinessStatus {
        match s {
            "stopped" => BusinessStatus::Stopped,
            "error" => BusinessStatus::Error,
            _ => BusinessStatus::Running,
        }
    }
}

/// A node row: one registered host (or board-slot folded into the node
/// abstraction via `parent_chassis_id`/`slot_index`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub node_id: String,
    pub hostname: String,
    pub ip_address: String,
    pub os_info: String,
    #[serde(default)]
    pub cpu_model: String,
    #[serde(default)]
    pub gpu_count: i64,
    #[serde(default = "default_agent_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_chassis_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_index: Option<i64>,
    pub created_at: i64,
    pub last_seen_at: i64,
    pub status: NodeStatus,
}

pub fn default_agent_port() -> u16 {
    8081
}

/// Registration payload sent by an agent on startup and on descriptor
/// refresh. `node_id` is absent on first contact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    pub hostname: String,
    pub ip_address: String,
    pub os_info: String,
    #[serde(default)]
    pub cpu_model: String,
    #[serde(default)]
    pub gpu_count: i64,
    #[serde(default = "default_agent_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_chassis_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_index: Option<i64>,
}

/// Manager reply to a registration: the assigned node id plus the
/// components currently placed on the node, for agent-side recovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default)]
    pub components: Vec<ComponentRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// One config file materialised on the node before a component starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    pub path: String,
    pub content: String,
}

/// A component as described in a deploy request or inlined from a
/// template. Config is copied in at expansion time; the scheduler and the
/// agent both work off this record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentSpec {
    pub component_id: String,
    pub component_name: String,
    #[serde(rename = "type")]
    pub kind: ComponentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_url: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub environment_variables: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub resource_requirements: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config_files: Vec<ConfigFile>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub affinity: HashMap<String, serde_json::Value>,
}

/// A persisted component instance: the spec plus placement, handle and
/// lifecycle fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentRecord {
    #[serde(flatten)]
    pub spec: ComponentSpec,
    pub business_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<String>,
    pub status: ComponentStatus,
    pub started_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessRecord {
    pub business_id: String,
    pub business_name: String,
    pub status: BusinessStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Deploy request body: name plus the components to instantiate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_id: Option<String>,
    #[serde(default)]
    pub business_name: String,
    #[serde(default)]
    pub components: Vec<ComponentSpec>,
}

/// Reusable component blueprint. `config` is copied into component
/// instances at expansion time and never consulted afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_template_id: Option<String>,
    pub template_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: ComponentType,
    pub config: TemplateConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_url: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub environment_variables: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub resource_requirements: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config_files: Vec<ConfigFile>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub affinity: HashMap<String, serde_json::Value>,
}

/// Reference from a business template to a component template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateRef {
    pub component_template_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_template_id: Option<String>,
    pub template_name: String,
    #[serde(default)]
    pub description: String,
    pub components: Vec<TemplateRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

/// CPU snapshot as collected on a node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CpuUsage {
    pub usage_percent: f64,
    pub load_avg_1m: f64,
    pub load_avg_5m: f64,
    pub load_avg_15m: f64,
    pub core_count: i64,
}

/// Memory snapshot as collected on a node, byte quantities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub total: i64,
    pub used: i64,
    pub free: i64,
    pub usage_percent: f64,
}

/// A sample with its source timestamp attached, as served from the
/// latest-value cache.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Stamped<T> {
    pub timestamp: i64,
    #[serde(flatten)]
    pub data: T,
}

/// Per-component resource usage sampled by the executors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentUsage {
    pub cpu_percent: f64,
    pub memory_mb: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_percent: Option<f64>,
}

/// One durable row of the per-component metric history.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ComponentMetric {
    pub timestamp: i64,
    pub cpu_percent: f64,
    pub memory_mb: i64,
    pub gpu_percent: f64,
}

/// The `resource` section of a telemetry push, one entry per collector
/// kind that produced a snapshot this cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<CpuUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryUsage>,
}

/// Component status as pushed inside the telemetry batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentStatusReport {
    pub component_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: ComponentType,
    pub status: ComponentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_usage: Option<ComponentUsage>,
}

/// Telemetry push body (`POST /api/report`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRequest {
    pub node_id: String,
    pub timestamp: i64,
    #[serde(default)]
    pub resource: ResourceReport,
    #[serde(default)]
    pub components: Vec<ComponentStatusReport>,
}

/// Deploy command sent from manager to agent: the component spec plus the
/// owning business.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployCommand {
    pub business_id: String,
    #[serde(flatten)]
    pub spec: ComponentSpec,
}

/// Stop command sent from manager to agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopCommand {
    pub component_id: String,
    pub business_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_type: Option<ComponentType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<String>,
    #[serde(default)]
    pub permanently: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_spec_roundtrip_with_type_tag() {
        let raw = serde_json::json!({
            "component_id": "c1",
            "component_name": "web",
            "type": "docker",
            "image_name": "nginx",
            "environment_variables": {"PORT": "80"},
            "affinity": {"ip_address": "10.0.0.2"}
        });
        let spec: ComponentSpec = serde_json::from_value(raw).unwrap();
        assert_eq!(spec.kind, ComponentType::Docker);
        assert_eq!(spec.image_name.as_deref(), Some("nginx"));
        assert_eq!(spec.environment_variables["PORT"], "80");
        assert_eq!(spec.affinity["ip_address"], "10.0.0.2");
        assert!(spec.binary_path.is_none());

        let back = serde_json::to_value(&spec).unwrap();
        assert_eq!(back["type"], "docker");
        // Empty optional bags stay off the wire.
        assert!(back.get("config_files").is_none());
    }

    #[test]
    fn report_request_accepts_partial_resources() {
        let raw = serde_json::json!({
            "node_id": "node-1",
            "timestamp": 1000,
            "resource": {
                "cpu": {
                    "usage_percent": 12.5,
                    "load_avg_1m": 0.1,
                    "load_avg_5m": 0.1,
                    "load_avg_15m": 0.1,
                    "core_count": 4
                }
            }
        });
        let report: ReportRequest = serde_json::from_value(raw).unwrap();
        assert!(report.resource.cpu.is_some());
        assert!(report.resource.memory.is_none());
        assert!(report.components.is_empty());
    }

    #[test]
    fn stamped_sample_flattens_fields() {
        let sample = Stamped {
            timestamp: 42,
            data: MemoryUsage {
                total: 1000,
                used: 250,
                free: 750,
                usage_percent: 25.0,
            },
        };
        let v = serde_json::to_value(sample).unwrap();
        assert_eq!(v["timestamp"], 42);
        assert_eq!(v["usage_percent"], 25.0);
    }

    #[test]
    fn status_strings_roundtrip() {
        for s in [
            ComponentStatus::Scheduled,
            ComponentStatus::Starting,
            ComponentStatus::Running,
            ComponentStatus::Stopping,
            ComponentStatus::Stopped,
            ComponentStatus::Error,
            ComponentStatus::Unknown,
        ] {
            assert_eq!(ComponentStatus::parse(s.as_str()), s);
        }
        assert_eq!(NodeStatus::parse("offline"), NodeStatus::Offline);
        assert_eq!(BusinessStatus::parse("stopped"), BusinessStatus::Stopped);
    }

    #[test]
    fn generated_ids_carry_prefixes() {
        assert!(new_node_id().starts_with("node-"));
        assert!(new_component_template_id().starts_with("ct-"));
        assert!(new_business_template_id().starts_with("bt-"));
    }
}
