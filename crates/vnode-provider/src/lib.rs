//! Virtual node capacity aggregation provider.
//!
//! This crate watches the real worker nodes of an underlying Kubernetes
//! cluster, maintains a running aggregate of their schedulable capacity, and
//! republishes that aggregate as the capacity of a single synthetic node, so
//! a scheduler can place against the synthetic node as a proxy for the whole
//! fleet. It handles:
//!
//! - Real-node eligibility classification (schedulable and Ready)
//! - Baseline seeding of the synthetic node from a full listing
//! - Incremental aggregate updates driven by the node watch
//! - Asynchronous snapshot delivery to a single subscriber
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                   Kubernetes API Server                       │
//! └──────────────────────────────────────────────────────────────┘
//!                │ list + watch (nodes)
//!                ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     KubeNodeProvider                          │
//! │  ┌──────────┐   ┌──────────────────────┐   ┌──────────────┐  │
//! │  │ NodeFeed │──▶│ CapacityReconciler   │──▶│ notification │  │
//! │  │ (pairing)│   │ (transition table)   │   │ channel (100)│  │
//! │  └──────────┘   └──────────┬───────────┘   └──────┬───────┘  │
//! │                            ▼                      ▼          │
//! │                 ┌──────────────────┐     ┌────────────────┐  │
//! │                 │ VirtualNodeState │     │ publisher loop │  │
//! │                 │ Unseeded/Seeded  │     └────────┬───────┘  │
//! │                 └──────────────────┘              │          │
//! └───────────────────────────────────────────────────┼──────────┘
//!                                                     ▼
//!                                          subscriber callback
//! ```
//!
//! Events arrive serially from the watch; the publisher loop and any
//! external readers run concurrently with it, so shared state lives behind a
//! lock and every externally visible read is a full copy.
//!
//! # Example
//!
//! ```no_run
//! use vnode_provider::{KubeNodeProvider, NodeProvider, ProviderConfig};
//! use vnode_provider::node::build_virtual_node;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = kube::Client::try_default().await?;
//! let config = ProviderConfig::from_env();
//! let provider = KubeNodeProvider::new(client, config);
//!
//! // Seed the synthetic node from the current fleet.
//! let initial = build_virtual_node(provider.config());
//! provider.configure(initial).await?;
//!
//! // Receive a snapshot whenever aggregate capacity changes.
//! let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! let _publisher = provider.subscribe(shutdown_rx.clone(), |node| {
//!     println!("capacity changed: {:?}", node.status.and_then(|s| s.capacity));
//! });
//!
//! provider.run(shutdown_rx).await;
//! # let _ = shutdown_tx;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod feed;
pub mod node;
pub mod provider;
pub mod publish;
pub mod reconcile;
pub mod state;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::ProviderConfig;
pub use error::{ProviderError, Result};
pub use provider::{KubeNodeProvider, NodeProvider};
pub use reconcile::{CapacityReconciler, NodeEvent};
pub use state::VirtualNodeState;
