use crate::metrics::NodeLoad;
use helmsman_core::types::{ComponentSpec, NodeRecord, NodeStatus};
use std::collections::HashMap;

/// One placement decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub component_id: String,
    pub node_id: String,
}

/// A component the scheduler could not place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementFailure {
    pub component_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ScheduleOutcome {
    pub assignments: Vec<Assignment>,
    pub failures: Vec<PlacementFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    NoAvailableNodes,
}

impl std::fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleError::NoAvailableNodes => write!(f, "No available nodes"),
        }
    }
}

/// Pure placement function: no state across calls, no writes. Per
/// component, in order: affinity filter, spread over nodes assigned in
/// this call, then a load tiebreak from the latest cached samples. When
/// affinity is present the spread step is skipped — affinity wins.
pub fn schedule_components(
    components: &[ComponentSpec],
    nodes: &[NodeRecord],
    loads: &HashMap<String, NodeLoad>,
) -> Result<ScheduleOutcome, ScheduleError> {
    let online: Vec<&NodeRecord> = nodes
        .iter()
        .filter(|n| n.status == NodeStatus::Online)
        .collect();
    if online.is_empty() {
        return Err(ScheduleError::NoAvailableNodes);
    }

    let mut assign_count: HashMap<&str, usize> =
        online.iter().map(|n| (n.node_id.as_str(), 0)).collect();
    let mut outcome = ScheduleOutcome::default();

    for component in components {
        match select_node(component, &online, &assign_count, loads) {
            Some(node_id) => {
                *assign_count.get_mut(node_id.as_str()).unwrap() += 1;
                outcome.assignments.push(Assignment {
                    component_id: component.component_id.clone(),
                    node_id,
                });
            }
            None => outcome.failures.push(PlacementFailure {
                component_id: component.component_id.clone(),
                reason: format!(
                    "No suitable node for component {}",
                    component.component_id
                ),
            }),
        }
    }

    Ok(outcome)
}

fn select_node(
    component: &ComponentSpec,
    online: &[&NodeRecord],
    assign_count: &HashMap<&str, usize>,
    loads: &HashMap<String, NodeLoad>,
) -> Option<String> {
    if !component.affinity.is_empty() {
        // Affinity wins: pick the highest-scoring node among the affine
        // ones without spreading.
        return best_by_score(
            online
                .iter()
                .filter(|n| matches_affinity(n, &component.affinity))
                .copied(),
            loads,
        );
    }

    let unused: Vec<&NodeRecord> = online
        .iter()
        .filter(|n| assign_count[n.node_id.as_str()] == 0)
        .copied()
        .collect();

    let candidates: Vec<&NodeRecord> = if !unused.is_empty() {
        unused
    } else {
        let min = online
            .iter()
            .map(|n| assign_count[n.node_id.as_str()])
            .min()
            .unwrap_or(0);
        online
            .iter()
            .filter(|n| assign_count[n.node_id.as_str()] == min)
            .copied()
            .collect()
    };

    best_by_score(candidates.into_iter(), loads)
}

fn best_by_score<'a>(
    candidates: impl Iterator<Item = &'a NodeRecord>,
    loads: &HashMap<String, NodeLoad>,
) -> Option<String> {
    let mut best: Option<(&'a NodeRecord, f64)> = None;
    for node in candidates {
        let score = node_score(loads.get(&node.node_id).copied().unwrap_or_default());
        match best {
            Some((_, s)) if s >= score => {}
            _ => best = Some((node, score)),
        }
    }
    best.map(|(node, _)| node.node_id.clone())
}

/// Headroom score. A missing sample contributes 0 to its term: the node
/// scores as fully loaded but stays eligible.
fn node_score(load: NodeLoad) -> f64 {
    let cpu_free = load.cpu_usage_percent.map(|u| 100.0 - u).unwrap_or(0.0);
    let memory_free = load.memory_usage_percent.map(|u| 100.0 - u).unwrap_or(0.0);
    0.5 * cpu_free + 0.5 * memory_free
}

/// Every affinity key must equal-match a descriptor attribute. `ip` is an
/// alias for `ip_address`; unknown keys never match.
fn matches_affinity(
    node: &NodeRecord,
    affinity: &HashMap<String, serde_json::Value>,
) -> bool {
    affinity.iter().all(|(key, required)| {
        let actual = descriptor_value(node, key);
        match actual {
            Some(value) => &value == required,
            None => false,
        }
    })
}

fn descriptor_value(node: &NodeRecord, key: &str) -> Option<serde_json::Value> {
    match key {
        "ip" | "ip_address" => Some(serde_json::json!(node.ip_address)),
        "hostname" => Some(serde_json::json!(node.hostname)),
        "os_info" => Some(serde_json::json!(node.os_info)),
        "cpu_model" => Some(serde_json::json!(node.cpu_model)),
        "gpu_count" => Some(serde_json::json!(node.gpu_count)),
        "node_id" => Some(serde_json::json!(node.node_id)),
        "parent_chassis_id" => node
            .parent_chassis_id
            .as_ref()
            .map(|v| serde_json::json!(v)),
        "slot_index" => node.slot_index.map(|v| serde_json::json!(v)),
        _ => None,
    }
}
