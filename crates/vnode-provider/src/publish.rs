//! Change notification channel and publisher loop.
//!
//! Snapshots travel from the reconciler to the single subscriber through a
//! bounded FIFO channel. The publisher loop forwards each snapshot to the
//! subscriber callback in emission order and exits promptly when the
//! shutdown signal fires; snapshots in flight at shutdown may go undelivered.
//!
//! Backpressure is deliberate: if the callback stalls, the channel fills and
//! the reconciler's next push blocks, which in turn stalls real-node event
//! processing.

use k8s_openapi::api::core::v1::Node;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::node::node_name;

/// Create the bounded snapshot channel.
#[must_use]
pub fn notification_channel(capacity: usize) -> (mpsc::Sender<Node>, mpsc::Receiver<Node>) {
    mpsc::channel(capacity)
}

/// Spawn the publisher loop, delivering snapshots to `callback` until the
/// channel closes or `shutdown` flips to `true`.
pub fn spawn_publisher<F>(
    mut rx: mpsc::Receiver<Node>,
    mut shutdown: watch::Receiver<bool>,
    mut callback: F,
) -> JoinHandle<()>
where
    F: FnMut(Node) + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                item = rx.recv() => match item {
                    Some(node) => {
                        debug!(node = node_name(&node), "delivering node snapshot");
                        callback(node);
                    }
                    None => break,
                },
                changed = shutdown.changed() => {
                    // A dropped sender counts as shutdown.
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("publisher loop stopped");
    })
}
