//! The real-node change feed.
//!
//! Wraps `kube`'s node watcher and turns its raw events into [`NodeEvent`]s
//! with old/new pairing. A name-keyed cache of the last observed node objects
//! provides the "old" side of updates; nothing is emitted until the initial
//! list has fully synced, so the reconciler only ever sees events against a
//! baseline-seeded aggregate.
//!
//! Every completed listing is diffed against the previous cache. The first
//! sync diffs against the bootstrap listing the aggregate was seeded from
//! (see [`NodeFeed::with_baseline`]), so a change that lands between the
//! seed listing and the watcher's own initial list still reaches the
//! aggregate. When the watcher reconnects it re-lists, and transitions that
//! happened while disconnected surface the same way: as update and delete
//! events, plus [`NodeEvent::Discovered`] for nodes the cache has never
//! seen.

use std::collections::HashMap;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use kube::api::Api;
use kube::runtime::watcher::{self, watcher, Config as WatcherConfig};
use kube::Client;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use crate::node::{is_virtual_node, node_name};
use crate::reconcile::{CapacityReconciler, NodeEvent};

/// Stateful adapter from watcher events to [`NodeEvent`]s.
#[derive(Debug, Default)]
pub struct NodeFeed {
    /// Last observed object per node name, valid once synced.
    cache: HashMap<String, Node>,
    /// Listing being accumulated during an (initial or re-) sync.
    pending: HashMap<String, Node>,
    synced: bool,
}

impl NodeFeed {
    /// Create an unsynced feed with an empty baseline: every node in the
    /// first listing surfaces as [`NodeEvent::Discovered`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an unsynced feed whose first sync diffs against `baseline`,
    /// the listing the aggregate was seeded from.
    #[must_use]
    pub fn with_baseline(baseline: HashMap<String, Node>) -> Self {
        Self {
            cache: baseline,
            pending: HashMap::new(),
            synced: false,
        }
    }

    /// Whether the initial list has completed.
    #[must_use]
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Fold one watcher event into the feed, returning the node events it
    /// implies. Virtual nodes are ignored entirely.
    pub fn observe(&mut self, event: watcher::Event<Node>) -> Vec<NodeEvent> {
        match event {
            watcher::Event::Init => {
                self.pending.clear();
                Vec::new()
            }
            watcher::Event::InitApply(node) => {
                if !is_virtual_node(&node) {
                    self.pending.insert(node_name(&node).to_string(), node);
                }
                Vec::new()
            }
            watcher::Event::InitDone => self.finish_sync(),
            watcher::Event::Apply(node) => {
                if is_virtual_node(&node) {
                    trace!(node = node_name(&node), "ignoring virtual node event");
                    return Vec::new();
                }
                if !self.synced {
                    // Watchers only deliver Apply after InitDone; tolerate a
                    // violation by folding it into the pending listing.
                    self.pending.insert(node_name(&node).to_string(), node);
                    return Vec::new();
                }
                let name = node_name(&node).to_string();
                match self.cache.insert(name, node.clone()) {
                    Some(old) => vec![NodeEvent::Updated { old, new: node }],
                    None => vec![NodeEvent::Added(node)],
                }
            }
            watcher::Event::Delete(node) => {
                if is_virtual_node(&node) {
                    return Vec::new();
                }
                if !self.synced {
                    self.pending.remove(node_name(&node));
                    return Vec::new();
                }
                self.cache.remove(node_name(&node));
                vec![NodeEvent::Deleted(node)]
            }
        }
    }

    /// Swap the pending listing in and emit the diff against the previous
    /// cache. On the first sync the previous cache is the seed baseline, so
    /// nothing that changed between the two listings is lost.
    fn finish_sync(&mut self) -> Vec<NodeEvent> {
        let fresh = std::mem::take(&mut self.pending);
        let mut previous = std::mem::replace(&mut self.cache, fresh);
        let first = !self.synced;
        self.synced = true;

        let mut events = Vec::new();
        for (name, new) in &self.cache {
            match previous.remove(name) {
                Some(old) => {
                    if old != *new {
                        events.push(NodeEvent::Updated {
                            old,
                            new: new.clone(),
                        });
                    }
                }
                None => events.push(NodeEvent::Discovered(new.clone())),
            }
        }
        for old in previous.into_values() {
            events.push(NodeEvent::Deleted(old));
        }
        if first {
            info!(
                nodes = self.cache.len(),
                events = events.len(),
                "initial node list synced"
            );
        } else {
            debug!(events = events.len(), "node re-list diff applied");
        }
        events
    }
}

/// Watch real nodes and drive the reconciler until shutdown.
///
/// Watch errors are logged and the stream is left to recover itself, the
/// same way the watcher handles transient apiserver failures elsewhere.
pub async fn run_node_watch(
    client: Client,
    reconciler: CapacityReconciler,
    mut feed: NodeFeed,
    mut shutdown: watch::Receiver<bool>,
) {
    let nodes: Api<Node> = Api::all(client);
    let stream = watcher(nodes, WatcherConfig::default());
    futures::pin_mut!(stream);

    info!("starting node watch loop");

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                // A dropped sender counts as shutdown.
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            item = stream.next() => match item {
                Some(Ok(event)) => {
                    for node_event in feed.observe(event) {
                        reconciler.handle_event(node_event).await;
                    }
                }
                Some(Err(e)) => {
                    error!(error = %e, "node watcher error, will retry");
                }
                None => {
                    warn!("node watch stream ended");
                    break;
                }
            },
        }
    }
    info!("node watch loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::real_node;

    fn names(events: &[NodeEvent]) -> Vec<String> {
        events
            .iter()
            .map(|e| match e {
                NodeEvent::Added(n) | NodeEvent::Discovered(n) | NodeEvent::Deleted(n) => {
                    node_name(n).to_string()
                }
                NodeEvent::Updated { new, .. } => node_name(new).to_string(),
            })
            .collect()
    }

    fn baseline(nodes: &[Node]) -> HashMap<String, Node> {
        nodes
            .iter()
            .map(|n| (node_name(n).to_string(), n.clone()))
            .collect()
    }

    #[test]
    fn initial_sync_matching_baseline_emits_nothing() {
        let node = real_node("n1", "2", "2Gi", true, false);
        let mut feed = NodeFeed::with_baseline(baseline(&[node.clone()]));
        assert!(feed.observe(watcher::Event::Init).is_empty());
        assert!(feed.observe(watcher::Event::InitApply(node)).is_empty());
        assert!(feed.observe(watcher::Event::InitDone).is_empty());
        assert!(feed.is_synced());
    }

    #[test]
    fn initial_sync_surfaces_changes_since_baseline() {
        // Seeded from n1 eligible and n2 present; before the watcher's own
        // list, n1 went unschedulable, n2 vanished, and n3 appeared.
        let mut feed = NodeFeed::with_baseline(baseline(&[
            real_node("n1", "2", "2Gi", true, false),
            real_node("n2", "4", "4Gi", true, false),
        ]));
        feed.observe(watcher::Event::Init);
        feed.observe(watcher::Event::InitApply(real_node("n1", "2", "2Gi", true, true)));
        feed.observe(watcher::Event::InitApply(real_node("n3", "8", "8Gi", true, false)));
        let mut events = feed.observe(watcher::Event::InitDone);

        events.sort_by_key(|e| match e {
            NodeEvent::Updated { .. } => 0,
            NodeEvent::Added(_) | NodeEvent::Discovered(_) => 1,
            NodeEvent::Deleted(_) => 2,
        });
        assert_eq!(events.len(), 3);
        match &events[0] {
            NodeEvent::Updated { old, new } => {
                assert!(crate::node::is_eligible(old));
                assert!(!crate::node::is_eligible(new));
            }
            other => panic!("expected an update for n1, got {other:?}"),
        }
        assert!(matches!(&events[1], NodeEvent::Discovered(_)));
        assert!(matches!(&events[2], NodeEvent::Deleted(_)));
        assert_eq!(names(&events[1..]), vec!["n3", "n2"]);
    }

    #[test]
    fn apply_of_unknown_node_is_added() {
        let mut feed = NodeFeed::new();
        feed.observe(watcher::Event::Init);
        feed.observe(watcher::Event::InitDone);

        let events = feed.observe(watcher::Event::Apply(real_node("n1", "2", "2Gi", true, false)));
        assert!(matches!(events.as_slice(), [NodeEvent::Added(_)]));
    }

    #[test]
    fn apply_of_known_node_pairs_old_and_new() {
        let mut feed = NodeFeed::new();
        feed.observe(watcher::Event::Init);
        feed.observe(watcher::Event::InitApply(real_node("n1", "2", "2Gi", false, false)));
        feed.observe(watcher::Event::InitDone);

        let events = feed.observe(watcher::Event::Apply(real_node("n1", "2", "2Gi", true, false)));
        match events.as_slice() {
            [NodeEvent::Updated { old, new }] => {
                assert!(!crate::node::is_ready(old));
                assert!(crate::node::is_ready(new));
            }
            other => panic!("expected one update, got {other:?}"),
        }
    }

    #[test]
    fn delete_emits_final_state_and_evicts() {
        let mut feed = NodeFeed::new();
        feed.observe(watcher::Event::Init);
        feed.observe(watcher::Event::InitApply(real_node("n1", "2", "2Gi", true, false)));
        feed.observe(watcher::Event::InitDone);

        let events = feed.observe(watcher::Event::Delete(real_node("n1", "2", "2Gi", true, false)));
        assert!(matches!(events.as_slice(), [NodeEvent::Deleted(_)]));

        // A later apply for the same name is a fresh add.
        let events = feed.observe(watcher::Event::Apply(real_node("n1", "2", "2Gi", true, false)));
        assert!(matches!(events.as_slice(), [NodeEvent::Added(_)]));
    }

    #[test]
    fn relist_diffs_against_previous_cache() {
        let mut feed = NodeFeed::new();
        feed.observe(watcher::Event::Init);
        feed.observe(watcher::Event::InitApply(real_node("n1", "2", "2Gi", true, false)));
        feed.observe(watcher::Event::InitApply(real_node("n2", "4", "4Gi", true, false)));
        feed.observe(watcher::Event::InitDone);

        // Reconnect: n1 changed, n2 vanished, n3 appeared.
        feed.observe(watcher::Event::Init);
        feed.observe(watcher::Event::InitApply(real_node("n1", "2", "2Gi", false, false)));
        feed.observe(watcher::Event::InitApply(real_node("n3", "8", "8Gi", true, false)));
        let mut events = feed.observe(watcher::Event::InitDone);

        events.sort_by_key(|e| match e {
            NodeEvent::Updated { .. } => 0,
            NodeEvent::Added(_) | NodeEvent::Discovered(_) => 1,
            NodeEvent::Deleted(_) => 2,
        });
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], NodeEvent::Updated { .. }));
        assert!(matches!(&events[1], NodeEvent::Discovered(_)));
        assert_eq!(names(&events[1..]), vec!["n3", "n2"]);
    }

    #[test]
    fn relist_discovery_carries_capacity_of_eligible_node() {
        let mut feed = NodeFeed::with_baseline(baseline(&[real_node(
            "n1", "2", "2Gi", true, false,
        )]));
        feed.observe(watcher::Event::Init);
        feed.observe(watcher::Event::InitApply(real_node("n1", "2", "2Gi", true, false)));
        feed.observe(watcher::Event::InitDone);

        // Reconnect: n2 joined and became eligible while disconnected.
        feed.observe(watcher::Event::Init);
        feed.observe(watcher::Event::InitApply(real_node("n1", "2", "2Gi", true, false)));
        feed.observe(watcher::Event::InitApply(real_node("n2", "4", "4Gi", true, false)));
        let events = feed.observe(watcher::Event::InitDone);

        assert_eq!(events.len(), 1);
        let next = crate::reconcile::next_resources(
            &vnode_core::Resources {
                cpu_millis: 2000,
                memory_bytes: 2 << 30,
                ..vnode_core::Resources::default()
            },
            &events[0],
        )
        .unwrap()
        .expect("discovered eligible node must change the aggregate");
        assert_eq!(next.cpu_millis, 6000);
        assert_eq!(next.memory_bytes, 6 << 30);
    }

    #[test]
    fn relist_with_identical_listing_emits_nothing() {
        let node = real_node("n1", "2", "2Gi", true, false);
        let mut feed = NodeFeed::new();
        feed.observe(watcher::Event::Init);
        feed.observe(watcher::Event::InitApply(node.clone()));
        feed.observe(watcher::Event::InitDone);

        feed.observe(watcher::Event::Init);
        feed.observe(watcher::Event::InitApply(node));
        assert!(feed.observe(watcher::Event::InitDone).is_empty());
    }

    #[test]
    fn virtual_nodes_are_ignored() {
        let mut virtual_node = real_node("vn", "9", "9Gi", true, false);
        virtual_node
            .metadata
            .labels
            .get_or_insert_with(Default::default)
            .insert("type".to_string(), "virtual-kubelet".to_string());

        let mut feed = NodeFeed::new();
        feed.observe(watcher::Event::Init);
        feed.observe(watcher::Event::InitDone);
        assert!(feed.observe(watcher::Event::Apply(virtual_node.clone())).is_empty());
        assert!(feed.observe(watcher::Event::Delete(virtual_node)).is_empty());
    }
}
