//! The provider surface exposed to the hosting system.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, ListParams};
use kube::Client;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::ProviderConfig;
use crate::error::{ProviderError, Result};
use crate::feed::{run_node_watch, NodeFeed};
use crate::node::{decorate_virtual_node, is_virtual_node, node_name};
use crate::publish::{notification_channel, spawn_publisher};
use crate::reconcile::{seed_from_nodes, CapacityReconciler};
use crate::state::VirtualNodeState;

/// The `NodeProvider` trait defines the surface the hosting system calls.
#[async_trait]
pub trait NodeProvider: Send + Sync {
    /// Seed the synthetic node: compute the baseline aggregate from the
    /// currently known real nodes, install it together with the derived
    /// status fields, and unblock event processing. The listing is retained
    /// so the watch feed can diff its own initial list against it.
    ///
    /// Re-invocation wholesale-replaces the state.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::DataSourceUnavailable`] if the real nodes
    /// cannot be listed, or a capacity error if a listed node reports a
    /// malformed capacity map.
    async fn configure(&self, node: Node) -> Result<()>;

    /// Probe liveness of the cluster data source.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::DataSourceUnavailable`] if the apiserver
    /// cannot be reached. No internal retry; retry policy belongs to the
    /// caller.
    async fn ping(&self) -> Result<()>;
}

/// Virtual node provider backed by a Kubernetes cluster.
pub struct KubeNodeProvider {
    client: Client,
    config: ProviderConfig,
    state: Arc<RwLock<VirtualNodeState>>,
    reconciler: CapacityReconciler,
    /// Taken by the first (and only) subscriber.
    notify_rx: Mutex<Option<mpsc::Receiver<Node>>>,
    /// Listing `configure` seeded from; taken by the watch as its feed
    /// baseline.
    seed_listing: Mutex<HashMap<String, Node>>,
}

impl KubeNodeProvider {
    /// Create a provider over an existing Kubernetes client.
    #[must_use]
    pub fn new(client: Client, config: ProviderConfig) -> Self {
        let (notify_tx, notify_rx) = notification_channel(config.notify_buffer);
        let state = Arc::new(RwLock::new(VirtualNodeState::default()));
        let reconciler = CapacityReconciler::new(Arc::clone(&state), notify_tx);
        Self {
            client,
            config,
            state,
            reconciler,
            notify_rx: Mutex::new(Some(notify_rx)),
            seed_listing: Mutex::new(HashMap::new()),
        }
    }

    /// Get a reference to the provider config.
    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn nodes_api(&self) -> Api<Node> {
        Api::all(self.client.clone())
    }

    /// A defensive full copy of the current synthetic node.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NotConfigured`] before the bootstrap gate
    /// has fired.
    pub fn virtual_node(&self) -> Result<Node> {
        self.state
            .read()
            .snapshot()
            .ok_or(ProviderError::NotConfigured)
    }

    /// Register the subscriber callback and start the publisher loop.
    ///
    /// At most one subscriber is supported; later calls return `None`.
    pub fn subscribe<F>(
        &self,
        shutdown: watch::Receiver<bool>,
        callback: F,
    ) -> Option<JoinHandle<()>>
    where
        F: FnMut(Node) + Send + 'static,
    {
        let rx = self.notify_rx.lock().take()?;
        info!("subscriber registered, starting publisher loop");
        Some(spawn_publisher(rx, shutdown, callback))
    }

    /// Drive the real-node watch into the reconciler until shutdown.
    ///
    /// The feed's first sync is diffed against the listing
    /// [`configure`](NodeProvider::configure) seeded from, so a change
    /// landing between the two listings still reaches the aggregate.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        let feed = NodeFeed::with_baseline(std::mem::take(&mut *self.seed_listing.lock()));
        run_node_watch(self.client.clone(), self.reconciler.clone(), feed, shutdown).await;
    }
}

#[async_trait]
impl NodeProvider for KubeNodeProvider {
    async fn configure(&self, mut node: Node) -> Result<()> {
        let listing = self
            .nodes_api()
            .list(&ListParams::default())
            .await
            .map_err(|e| ProviderError::DataSourceUnavailable {
                context: "listing real nodes",
                source: e,
            })?;

        let resources = seed_from_nodes(&listing.items)?;
        decorate_virtual_node(&mut node, &self.config);

        info!(
            node = %self.config.node_name,
            real_nodes = listing.items.len(),
            cpu_millis = resources.cpu_millis,
            memory_bytes = resources.memory_bytes,
            pods = resources.pods,
            "seeded virtual node capacity"
        );

        let baseline: HashMap<String, Node> = listing
            .items
            .into_iter()
            .filter(|n| !is_virtual_node(n))
            .map(|n| (node_name(&n).to_string(), n))
            .collect();
        *self.seed_listing.lock() = baseline;
        self.state.write().seed(node, resources);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.client
            .apiserver_version()
            .await
            .map_err(|e| ProviderError::DataSourceUnavailable {
                context: "apiserver version probe",
                source: e,
            })?;
        Ok(())
    }
}
