//! Virtual Node Provider Service
//!
//! Entry point for the provider: seeds the synthetic node from the current
//! fleet, watches real nodes to keep the aggregate current, and exposes
//! health endpoints.
//!
//! # HTTP Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /ready` - Readiness check (probes the cluster data source)

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vnode_provider::node::{build_virtual_node, node_name};
use vnode_provider::{KubeNodeProvider, NodeProvider, ProviderConfig};

/// Application state shared across handlers.
struct AppState {
    provider: Arc<KubeNodeProvider>,
}

impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        service: "vnode-provider",
    })
}

async fn ready_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.provider.ping().await {
        Ok(()) => (StatusCode::OK, "ready"),
        Err(e) => {
            tracing::warn!(error = %e, "readiness probe failed");
            (StatusCode::SERVICE_UNAVAILABLE, "cluster unreachable")
        }
    }
}

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,vnode_provider=debug,vnode_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting vnode provider");

    let config = ProviderConfig::from_env();
    tracing::info!(
        node_name = %config.node_name,
        listen_addr = %config.listen_addr,
        "Loaded provider configuration"
    );

    let client = kube::Client::try_default().await?;
    let provider = Arc::new(KubeNodeProvider::new(client, config));
    tracing::info!("Connected to Kubernetes cluster");

    // Seed the synthetic node before any event processing.
    let initial = build_virtual_node(provider.config());
    provider.configure(initial).await?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    // The external publisher would patch the node object upstream; here the
    // subscriber just reports the new capacity.
    let _publisher = provider.subscribe(shutdown_rx.clone(), |node| {
        tracing::info!(
            node = node_name(&node),
            capacity = ?node.status.as_ref().and_then(|s| s.capacity.as_ref()),
            "virtual node capacity updated"
        );
    });

    // Start the watch loop as a background task
    let watch_provider = Arc::clone(&provider);
    let watch_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        watch_provider.run(watch_shutdown).await;
    });
    tracing::info!("Started node watch loop");

    let listen_addr = provider.config().listen_addr.clone();
    let state = AppState { provider };
    let app = create_router(state);

    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    Ok(())
}
