//! Provider configuration.

use serde::{Deserialize, Serialize};

/// Number of pending node snapshots the notification channel holds before
/// the reconciler blocks. A stalled subscriber callback fills this buffer
/// and then stalls real-node event processing.
pub const DEFAULT_NOTIFY_BUFFER: usize = 100;

/// Configuration for the virtual node provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Name of the synthetic node object.
    pub node_name: String,
    /// Internal IP address advertised on the synthetic node.
    pub internal_ip: String,
    /// Listen address for the health endpoints.
    pub listen_addr: String,
    /// Capacity of the change notification channel.
    pub notify_buffer: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            node_name: "virtual-node".to_string(),
            internal_ip: "127.0.0.1".to_string(),
            listen_addr: "0.0.0.0:8080".to_string(),
            notify_buffer: DEFAULT_NOTIFY_BUFFER,
        }
    }
}

impl ProviderConfig {
    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `VNODE_NAME`: name of the synthetic node
    /// - `VNODE_INTERNAL_IP`: internal IP advertised on the synthetic node
    /// - `LISTEN_ADDR`: listen address for the health endpoints
    /// - `VNODE_NOTIFY_BUFFER`: notification channel capacity
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("VNODE_NAME") {
            config.node_name = val;
        }
        if let Ok(val) = std::env::var("VNODE_INTERNAL_IP") {
            config.internal_ip = val;
        }
        if let Ok(val) = std::env::var("LISTEN_ADDR") {
            config.listen_addr = val;
        }
        if let Ok(val) = std::env::var("VNODE_NOTIFY_BUFFER") {
            if let Ok(n) = val.parse() {
                config.notify_buffer = n;
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = ProviderConfig::default();
        assert_eq!(config.node_name, "virtual-node");
        assert_eq!(config.notify_buffer, DEFAULT_NOTIFY_BUFFER);
    }
}
