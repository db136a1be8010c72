//! # Scene Mirror Server Library
//!
//! Host process pieces for the scene mirror: the tick loop, the demo
//! simulation and the HTTP surface (health, metrics, snapshots).
//! This library is used by both the binary and integration tests.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use mirror_core::{LocalBus, SnapshotStore};

pub mod cli;
pub mod health;
pub mod metrics;
pub mod routes;
pub mod runtime;
pub mod simulation;

pub use cli::CliArgs;
pub use runtime::TickLoop;

/// First id handed out to requests injected over HTTP.
const FIRST_API_REQUEST_ID: u64 = 1 << 32;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Bus the mirror listens on; HTTP injections are published here.
    pub bus: Arc<LocalBus>,
    /// Latest reconciled snapshot.
    pub snapshots: SnapshotStore,
    /// Set once the bootstrap scene has been received.
    pub scene_received: Arc<AtomicBool>,
    next_request_id: Arc<AtomicU64>,
}

impl AppState {
    /// Create state around a bus and a snapshot store.
    #[must_use]
    pub fn new(bus: Arc<LocalBus>, snapshots: SnapshotStore) -> Self {
        Self {
            bus,
            snapshots,
            scene_received: Arc::new(AtomicBool::new(false)),
            next_request_id: Arc::new(AtomicU64::new(FIRST_API_REQUEST_ID)),
        }
    }

    /// Whether the bootstrap scene has been reconciled.
    #[must_use]
    pub fn scene_received(&self) -> bool {
        self.scene_received.load(Ordering::Acquire)
    }

    /// Allocate an id for a request injected over HTTP.
    pub fn next_request_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Build the HTTP router without the metrics endpoint.
pub fn app(state: AppState) -> Router {
    Router::new()
        // Health check endpoints (Kubernetes probes)
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/health", get(health::readiness))
        .route("/api/scene", get(routes::get_scene))
        .route("/api/scene/pending", get(routes::get_pending))
        .route("/api/entities/{name}", get(routes::get_entity))
        .route("/api/messages", post(routes::post_message))
        .route("/api/requests", post(routes::post_request))
        .with_state(state)
}
