//! Shared test fixtures.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Node, NodeCondition, NodeSpec, NodeStatus};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

/// Build a real node reporting the given CPU/memory capacity, readiness, and
/// schedulability.
pub fn real_node(name: &str, cpu: &str, memory: &str, ready: bool, unschedulable: bool) -> Node {
    let mut capacity = BTreeMap::new();
    capacity.insert("cpu".to_string(), Quantity(cpu.to_string()));
    capacity.insert("memory".to_string(), Quantity(memory.to_string()));

    let mut node = Node::default();
    node.metadata.name = Some(name.to_string());
    node.spec = Some(NodeSpec {
        unschedulable: Some(unschedulable),
        ..NodeSpec::default()
    });
    node.status = Some(NodeStatus {
        capacity: Some(capacity),
        conditions: Some(vec![NodeCondition {
            type_: "Ready".to_string(),
            status: if ready { "True" } else { "False" }.to_string(),
            ..NodeCondition::default()
        }]),
        ..NodeStatus::default()
    });
    node
}
