//! The capacity reconciler.
//!
//! Consumes the real-node change feed, classifies each event against the
//! eligibility predicate, mutates the protected aggregate, and pushes a
//! synthetic node snapshot onto the notification channel whenever a mutation
//! actually changed the aggregate.
//!
//! Events are delivered serially by the watch feed; the only concurrency the
//! reconciler must tolerate is external readers taking snapshots, which the
//! `RwLock` plus copy-on-read discipline covers.

use std::sync::Arc;

use k8s_openapi::api::core::v1::Node;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use vnode_core::Resources;

use crate::node::{is_eligible, is_virtual_node, node_name, node_resources};
use crate::state::VirtualNodeState;

/// A change observed on a real node.
#[derive(Debug, Clone)]
pub enum NodeEvent {
    /// A node joined the cluster.
    Added(Node),
    /// A node surfaced by a listing diff rather than a live add; unlike
    /// [`Added`](Self::Added) it may already be eligible.
    Discovered(Node),
    /// A node changed; both the previous and the current object are carried
    /// so eligibility transitions can be classified.
    Updated {
        /// The node as last observed.
        old: Node,
        /// The node as currently reported.
        new: Node,
    },
    /// A node left the cluster; carries its final observed state.
    Deleted(Node),
}

impl NodeEvent {
    fn name(&self) -> &str {
        match self {
            Self::Added(node) | Self::Discovered(node) | Self::Deleted(node) => node_name(node),
            Self::Updated { new, .. } => node_name(new),
        }
    }
}

/// Compute the aggregate that results from applying `event` to `current`.
///
/// Implements the eligibility transition table:
///
/// - `Added`: no-op; a freshly joined node surfaces through the update that
///   flips it not-ready to ready
/// - `Discovered` while eligible: add its capacity (a listing diff can
///   present a node that completed its whole join sequence unobserved)
/// - `Updated` ineligible→eligible: add the new capacity
/// - `Updated` eligible→ineligible: subtract the old capacity
/// - `Updated` eligible→eligible with changed capacity: replace the old
///   contribution with the new one
/// - `Deleted` while eligible: subtract the final capacity
///
/// Returns `Ok(None)` when the event does not touch the aggregate. Staging
/// happens on a scratch copy, so a failure in any step leaves `current`
/// untouched by construction.
///
/// # Errors
///
/// Returns an error if a capacity map is malformed or a mutation would
/// overflow or underflow a dimension.
pub fn next_resources(
    current: &Resources,
    event: &NodeEvent,
) -> vnode_core::Result<Option<Resources>> {
    let mut next = current.clone();
    match event {
        NodeEvent::Added(_) => return Ok(None),
        NodeEvent::Discovered(node) => {
            if !is_eligible(node) {
                return Ok(None);
            }
            next.add(&node_resources(node)?)?;
        }
        NodeEvent::Updated { old, new } => match (is_eligible(old), is_eligible(new)) {
            (false, true) => next.add(&node_resources(new)?)?,
            (true, false) => next.sub(&node_resources(old)?)?,
            (true, true) => {
                let old_res = node_resources(old)?;
                let new_res = node_resources(new)?;
                if old_res == new_res {
                    return Ok(None);
                }
                next.add(&new_res)?;
                next.sub(&old_res)?;
            }
            (false, false) => return Ok(None),
        },
        NodeEvent::Deleted(node) => {
            if !is_eligible(node) {
                return Ok(None);
            }
            next.sub(&node_resources(node)?)?;
        }
    }
    Ok(Some(next))
}

/// Compute the baseline aggregate from the currently known real nodes.
///
/// Filters to eligible nodes and skips virtual nodes; the sum is the
/// synthetic node's seeded capacity.
///
/// # Errors
///
/// Returns an error if any eligible node reports a malformed capacity map
/// or the sum overflows.
pub fn seed_from_nodes(nodes: &[Node]) -> vnode_core::Result<Resources> {
    let mut total = Resources::default();
    for node in nodes {
        if is_virtual_node(node) {
            continue;
        }
        if !is_eligible(node) {
            debug!(node = node_name(node), "skipping ineligible node at seed");
            continue;
        }
        total.add(&node_resources(node)?)?;
    }
    Ok(total)
}

/// Applies node events to the shared synthetic node state and emits change
/// notifications.
#[derive(Clone)]
pub struct CapacityReconciler {
    state: Arc<RwLock<VirtualNodeState>>,
    notify_tx: mpsc::Sender<Node>,
}

impl CapacityReconciler {
    /// Create a reconciler over `state`, emitting snapshots on `notify_tx`.
    pub fn new(state: Arc<RwLock<VirtualNodeState>>, notify_tx: mpsc::Sender<Node>) -> Self {
        Self { state, notify_tx }
    }

    /// Handle one event from the change feed.
    ///
    /// While the state is unseeded the event is dropped. A failed mutation
    /// is abandoned with a warning and no notification; the next event for
    /// the node re-attempts a consistent delta. When the aggregate changed,
    /// the new snapshot is pushed onto the notification channel; that await
    /// is the accepted backpressure point (a full channel stalls the serial
    /// event feed).
    pub async fn handle_event(&self, event: NodeEvent) {
        let snapshot = self.apply(&event);
        if let Some(node) = snapshot {
            if self.notify_tx.send(node).await.is_err() {
                warn!("notification channel closed; dropping snapshot");
            }
        }
    }

    /// Mutate the state under the lock; returns a snapshot if the aggregate
    /// changed. The lock is never held across an await point.
    fn apply(&self, event: &NodeEvent) -> Option<Node> {
        let mut guard = self.state.write();
        let Some(seeded) = guard.seeded_mut() else {
            trace!(node = event.name(), "dropping event before seed");
            return None;
        };

        match next_resources(seeded.resources(), event) {
            Ok(Some(next)) => {
                // A transition of a zero-capacity node nets out to no change.
                if &next == seeded.resources() {
                    trace!(node = event.name(), "mutation did not change aggregate");
                    return None;
                }
                info!(
                    node = event.name(),
                    cpu_millis = next.cpu_millis,
                    memory_bytes = next.memory_bytes,
                    "aggregate capacity changed"
                );
                seeded.install(next);
                Some(seeded.snapshot())
            }
            Ok(None) => {
                trace!(node = event.name(), "event does not affect aggregate");
                None
            }
            Err(err) => {
                warn!(
                    node = event.name(),
                    error = %err,
                    "abandoning capacity mutation"
                );
                None
            }
        }
    }
}
