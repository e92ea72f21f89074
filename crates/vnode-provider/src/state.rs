//! Synthetic node state.
//!
//! The state is an explicit two-state machine: [`VirtualNodeState::Unseeded`]
//! until the bootstrap gate fires, then [`VirtualNodeState::Seeded`] for the
//! rest of the process lifetime. Mutation requests are rejected while
//! unseeded; re-seeding wholesale-replaces the state, never accumulates.

use k8s_openapi::api::core::v1::Node;

use vnode_core::Resources;

use crate::node::write_capacity;

/// The synthetic node and its aggregate, gated behind the bootstrap seed.
#[derive(Debug, Default)]
pub enum VirtualNodeState {
    /// No baseline capacity has been computed yet; all events are dropped.
    #[default]
    Unseeded,
    /// The synthetic node is live and incrementally updated.
    Seeded(Seeded),
}

/// The live synthetic node object plus its current aggregate.
#[derive(Debug)]
pub struct Seeded {
    node: Node,
    resources: Resources,
}

impl VirtualNodeState {
    /// Whether the bootstrap gate has fired.
    #[must_use]
    pub fn is_seeded(&self) -> bool {
        matches!(self, Self::Seeded(_))
    }

    /// Install a freshly computed baseline, replacing any previous state.
    pub fn seed(&mut self, mut node: Node, resources: Resources) {
        write_capacity(&mut node, &resources);
        *self = Self::Seeded(Seeded { node, resources });
    }

    /// Mutable access to the seeded state, or `None` while unseeded.
    pub fn seeded_mut(&mut self) -> Option<&mut Seeded> {
        match self {
            Self::Unseeded => None,
            Self::Seeded(seeded) => Some(seeded),
        }
    }

    /// A fully independent copy of the synthetic node for external readers.
    ///
    /// Callers never see a live reference; the reconciler may mutate the
    /// state immediately after this returns.
    #[must_use]
    pub fn snapshot(&self) -> Option<Node> {
        match self {
            Self::Unseeded => None,
            Self::Seeded(seeded) => Some(seeded.snapshot()),
        }
    }

    /// The current aggregate, or `None` while unseeded.
    #[must_use]
    pub fn resources(&self) -> Option<&Resources> {
        match self {
            Self::Unseeded => None,
            Self::Seeded(seeded) => Some(&seeded.resources),
        }
    }
}

impl Seeded {
    /// The current aggregate.
    #[must_use]
    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    /// Install a successfully mutated aggregate and re-serialize it onto the
    /// node's capacity fields.
    pub fn install(&mut self, next: Resources) {
        write_capacity(&mut self.node, &next);
        self.resources = next;
    }

    /// A fully independent copy of the synthetic node.
    #[must_use]
    pub fn snapshot(&self) -> Node {
        self.node.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::node_resources;

    fn resources(cpu: u64, mem: u64) -> Resources {
        Resources {
            cpu_millis: cpu,
            memory_bytes: mem,
            ..Resources::default()
        }
    }

    #[test]
    fn starts_unseeded() {
        let state = VirtualNodeState::default();
        assert!(!state.is_seeded());
        assert!(state.snapshot().is_none());
        assert!(state.resources().is_none());
    }

    #[test]
    fn seeding_serializes_capacity_onto_node() {
        let mut state = VirtualNodeState::default();
        state.seed(Node::default(), resources(6000, 6 << 30));

        let snap = state.snapshot().unwrap();
        assert_eq!(node_resources(&snap).unwrap(), resources(6000, 6 << 30));
    }

    #[test]
    fn reseed_replaces_rather_than_accumulates() {
        let mut state = VirtualNodeState::default();
        state.seed(Node::default(), resources(6000, 6 << 30));
        state.seed(Node::default(), resources(1000, 1 << 30));

        assert_eq!(state.resources().unwrap(), &resources(1000, 1 << 30));
    }

    #[test]
    fn install_keeps_node_and_aggregate_in_lockstep() {
        let mut state = VirtualNodeState::default();
        state.seed(Node::default(), resources(6000, 6 << 30));

        let seeded = state.seeded_mut().unwrap();
        seeded.install(resources(4000, 4 << 30));

        let snap = state.snapshot().unwrap();
        assert_eq!(node_resources(&snap).unwrap(), resources(4000, 4 << 30));
    }

    #[test]
    fn snapshot_is_independent_of_live_state() {
        let mut state = VirtualNodeState::default();
        state.seed(Node::default(), resources(6000, 6 << 30));
        let snap = state.snapshot().unwrap();

        state.seeded_mut().unwrap().install(resources(0, 0));
        assert_eq!(node_resources(&snap).unwrap(), resources(6000, 6 << 30));
    }
}
