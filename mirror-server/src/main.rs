//! # Scene Mirror
//!
//! Host process for the scene mirror. Listens on the local bus, reconciles
//! incoming scene traffic on a fixed tick and serves snapshots over HTTP.
//! Binds to localhost only.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, routing::get, Router};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use mirror_core::{LocalBus, MessageIntake, Reconciler, SceneClient, SnapshotStore};
use tokio::sync::watch;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mirror_server::{app, metrics, simulation, AppState, CliArgs, TickLoop};

/// Initialize structured tracing with optional JSON format.
///
/// Set `RUST_LOG` to control log levels
/// (default: info,mirror_server=debug,mirror_core=debug,tower_http=debug).
/// Set `RUST_LOG_FORMAT=json` for JSON output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,mirror_server=debug,mirror_core=debug,tower_http=debug")
    });

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true);

    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = CliArgs::parse();
    let config = args
        .sync_config()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {e}"))?;
    tracing::info!(
        "Mirroring world {} at {} Hz (visualizations: {}, pending expiry: {:?})",
        config.world_name,
        args.tick_hz,
        config.enable_visualizations,
        config.max_pending_ticks
    );

    let metrics_handle = metrics::init_metrics()
        .map_err(|e| anyhow::anyhow!("Failed to initialize Prometheus metrics: {e}"))?;
    tracing::info!("Prometheus metrics initialized");

    let bus = Arc::new(LocalBus::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let simulation_task = if args.demo {
        simulation::install_responder(&bus, &config.world_name);
        tracing::info!("Demo simulation enabled");
        Some(tokio::spawn(simulation::run(
            bus.clone(),
            args.tick_period(),
            shutdown_rx.clone(),
        )))
    } else {
        None
    };

    let snapshots = match &args.data_dir {
        Some(dir) => SnapshotStore::with_data_dir(dir)
            .map_err(|e| anyhow::anyhow!("Failed to open data dir {}: {e}", dir.display()))?,
        None => SnapshotStore::new(),
    };

    let intake = MessageIntake::new();
    let client = SceneClient::connect(bus.clone(), intake.clone(), &config.world_name);
    let state = AppState::new(bus.clone(), snapshots.clone());
    let tick_loop = TickLoop::new(
        Reconciler::new(config),
        intake,
        client,
        snapshots,
        state.scene_received.clone(),
        args.tick_period(),
    );
    let tick_task = tokio::spawn(tick_loop.run(shutdown_rx));

    // Metrics endpoint (separate state)
    let metrics_router = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics_handle);

    let router = app(state)
        .merge(metrics_router)
        // Request ID for tracing correlation
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    // Bind to localhost ONLY
    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Scene mirror listening on http://{addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down");
    let _ = shutdown_tx.send(true);
    if let Err(err) = tick_task.await {
        tracing::error!("Tick loop task failed: {err}");
    }
    if let Some(task) = simulation_task {
        if let Err(err) = task.await {
            tracing::error!("Demo simulation task failed: {err}");
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {err}");
    }
}

/// Prometheus metrics endpoint.
#[tracing::instrument(name = "metrics", skip(handle))]
async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}
