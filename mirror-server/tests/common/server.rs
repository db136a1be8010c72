//! Test server harness for integration tests.
//!
//! Spins up the real router on a random port. The tick loop is not spawned;
//! tests call [`TestServer::step`] to reconcile deterministically.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mirror_core::{LocalBus, MessageIntake, Reconciler, SceneClient, SnapshotStore, SyncConfig};
use mirror_server::{app, simulation, AppState, TickLoop};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// A test server instance with control handles.
pub struct TestServer {
    addr: SocketAddr,
    tick_loop: TickLoop,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Start a server whose bus answers `scene_info` with the demo world.
    ///
    /// # Panics
    ///
    /// Panics if no port is available or the server fails to bind.
    pub async fn start() -> Self {
        let port = portpicker::pick_unused_port().expect("no available port");
        let addr = SocketAddr::from(([127, 0, 0, 1], port));

        let bus = Arc::new(LocalBus::new());
        simulation::install_responder(&bus, "default");

        let snapshots = SnapshotStore::new();
        let intake = MessageIntake::new();
        let client = SceneClient::connect(bus.clone(), intake.clone(), "default");
        let state = AppState::new(bus, snapshots.clone());
        let tick_loop = TickLoop::new(
            Reconciler::new(SyncConfig::default()),
            intake,
            client,
            snapshots,
            state.scene_received.clone(),
            Duration::from_millis(10),
        );

        let listener = TcpListener::bind(addr).await.expect("failed to bind");
        let actual_addr = listener.local_addr().expect("failed to get local addr");
        let router = app(state);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("server error");
        });

        // Give the server a moment to start
        tokio::time::sleep(Duration::from_millis(10)).await;

        Self {
            addr: actual_addr,
            tick_loop,
            shutdown_tx: Some(shutdown_tx),
            handle,
        }
    }

    /// URL for a path on this server.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Request the bootstrap scene.
    pub fn bootstrap(&self) {
        self.tick_loop.bootstrap();
    }

    /// Run one reconciliation tick.
    pub fn step(&mut self) {
        self.tick_loop.step();
    }

    /// Gracefully shut down the server.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = tokio::time::timeout(Duration::from_secs(5), self.handle).await;
    }
}
