//! Error types for the provider crate.

use thiserror::Error;

/// Errors that can occur in the virtual node provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The cluster data source could not be reached (liveness probe or
    /// bootstrap listing failed). Retry policy is left to the caller.
    #[error("cluster data source unavailable ({context})")]
    DataSourceUnavailable {
        /// The operation that was being attempted.
        context: &'static str,
        /// The underlying client failure.
        #[source]
        source: kube::Error,
    },

    /// Quantity conversion or aggregate mutation failed.
    #[error("capacity error: {0}")]
    Capacity(#[from] vnode_core::CoreError),

    /// The synthetic node has not been seeded yet.
    #[error("virtual node not configured")]
    NotConfigured,
}

/// A specialized Result type for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;
