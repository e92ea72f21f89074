//! Real-node classification and synthetic node construction.
//!
//! The classifier predicates are pure and evaluated fresh on every event; no
//! per-node readiness state is cached, so out-of-band condition changes
//! cannot drift from what the aggregate saw.

use k8s_openapi::api::core::v1::{Node, NodeAddress, NodeCondition, NodeSystemInfo};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

use vnode_core::Resources;

use crate::config::ProviderConfig;

/// Label key marking a node's type.
pub const LABEL_NODE_TYPE: &str = "type";
/// Node type label value for virtual nodes.
pub const NODE_TYPE_VIRTUAL: &str = "virtual-kubelet";

const LABEL_OS: &str = "kubernetes.io/os";
const LABEL_OS_BETA: &str = "beta.kubernetes.io/os";
const LABEL_ARCH: &str = "kubernetes.io/arch";
const LABEL_HOSTNAME: &str = "kubernetes.io/hostname";

/// Check whether a node reports a `Ready` condition with status `"True"`.
///
/// A missing condition list, a missing `Ready` entry, or any status other
/// than `"True"` (including `"Unknown"`) all count as not ready.
#[must_use]
pub fn is_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
}

/// Check whether a node contributes to the aggregate: schedulable and ready.
#[must_use]
pub fn is_eligible(node: &Node) -> bool {
    let unschedulable = node
        .spec
        .as_ref()
        .and_then(|s| s.unschedulable)
        .unwrap_or(false);
    !unschedulable && is_ready(node)
}

/// Check whether a node is itself a virtual node.
///
/// Virtual nodes never contribute to the aggregate; counting our own
/// republished capacity would feed back into itself.
#[must_use]
pub fn is_virtual_node(node: &Node) -> bool {
    node.metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(LABEL_NODE_TYPE))
        .is_some_and(|v| v == NODE_TYPE_VIRTUAL)
}

/// The node's name, or an empty string when unset.
#[must_use]
pub fn node_name(node: &Node) -> &str {
    node.metadata.name.as_deref().unwrap_or("")
}

/// Convert a node's reported capacity into aggregate dimensions.
///
/// A node without a status or capacity map contributes zero.
///
/// # Errors
///
/// Returns an error if any consumed quantity string is malformed.
pub fn node_resources(node: &Node) -> vnode_core::Result<Resources> {
    match node.status.as_ref().and_then(|s| s.capacity.as_ref()) {
        Some(capacity) => Resources::from_capacity(capacity),
        None => Ok(Resources::default()),
    }
}

/// Write the aggregate into the node's capacity and allocatable fields.
///
/// Keeps the exposed quantity maps in lockstep with the aggregate; they are
/// rewritten after every successful mutation.
pub fn write_capacity(node: &mut Node, resources: &Resources) {
    let status = node.status.get_or_insert_with(Default::default);
    let capacity = resources.to_capacity();
    status.allocatable = Some(capacity.clone());
    status.capacity = Some(capacity);
}

/// Build the bare initial synthetic node object for this provider.
#[must_use]
pub fn build_virtual_node(config: &ProviderConfig) -> Node {
    let mut node = Node::default();
    node.metadata.name = Some(config.node_name.clone());
    node.metadata.labels = Some(
        [(LABEL_NODE_TYPE.to_string(), NODE_TYPE_VIRTUAL.to_string())]
            .into_iter()
            .collect(),
    );
    node
}

/// Install the derived status fields on the synthetic node at seeding time:
/// OS/arch info and labels, addresses, and uniformly healthy conditions.
pub fn decorate_virtual_node(node: &mut Node, config: &ProviderConfig) {
    let labels = node.metadata.labels.get_or_insert_with(Default::default);
    labels.insert(LABEL_NODE_TYPE.to_string(), NODE_TYPE_VIRTUAL.to_string());
    labels.insert(LABEL_OS.to_string(), "linux".to_string());
    labels.insert(LABEL_OS_BETA.to_string(), "linux".to_string());
    labels.insert(LABEL_ARCH.to_string(), "amd64".to_string());
    labels.insert(LABEL_HOSTNAME.to_string(), config.node_name.clone());

    let status = node.status.get_or_insert_with(Default::default);
    let node_info = status.node_info.get_or_insert_with(NodeSystemInfo::default);
    node_info.operating_system = "linux".to_string();
    node_info.architecture = "amd64".to_string();

    status.conditions = Some(healthy_conditions());
    status.addresses = Some(vec![
        NodeAddress {
            type_: "InternalIP".to_string(),
            address: config.internal_ip.clone(),
        },
        NodeAddress {
            type_: "Hostname".to_string(),
            address: config.node_name.clone(),
        },
    ]);
}

/// Node conditions describing a kubelet in perfect health. These are the
/// conditions a node controller flips to Unknown when liveness probes fail.
#[must_use]
pub fn healthy_conditions() -> Vec<NodeCondition> {
    let now = Time(chrono::Utc::now());
    let condition = |type_: &str, status: &str, reason: &str, message: &str| NodeCondition {
        type_: type_.to_string(),
        status: status.to_string(),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        last_heartbeat_time: Some(now.clone()),
        last_transition_time: Some(now.clone()),
    };
    vec![
        condition(
            "Ready",
            "True",
            "KubeletReady",
            "kubelet is posting ready status",
        ),
        condition(
            "MemoryPressure",
            "False",
            "KubeletHasSufficientMemory",
            "kubelet has sufficient memory available",
        ),
        condition(
            "DiskPressure",
            "False",
            "KubeletHasNoDiskPressure",
            "kubelet has no disk pressure",
        ),
        condition(
            "PIDPressure",
            "False",
            "KubeletHasSufficientPID",
            "kubelet has sufficient PID available",
        ),
    ]
}
