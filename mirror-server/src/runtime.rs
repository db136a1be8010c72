//! The reconciliation tick loop.
//!
//! The loop task owns the [`Reconciler`]. Transport callbacks only touch the
//! intake; everything else sees the snapshots published here.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mirror_core::{MessageIntake, Reconciler, SceneClient, SnapshotStore, TickReport};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::metrics;

/// Drives a [`Reconciler`] at a fixed rate.
pub struct TickLoop {
    reconciler: Reconciler,
    intake: MessageIntake,
    client: SceneClient,
    snapshots: SnapshotStore,
    scene_received: Arc<AtomicBool>,
    period: Duration,
}

impl TickLoop {
    /// Create a tick loop.
    #[must_use]
    pub fn new(
        reconciler: Reconciler,
        intake: MessageIntake,
        client: SceneClient,
        snapshots: SnapshotStore,
        scene_received: Arc<AtomicBool>,
        period: Duration,
    ) -> Self {
        Self {
            reconciler,
            intake,
            client,
            snapshots,
            scene_received,
            period,
        }
    }

    /// The reconciler being driven.
    #[must_use]
    pub const fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Ask the simulation for the full scene.
    pub fn bootstrap(&self) {
        let id = self.client.request_scene();
        tracing::info!(
            "Requested scene for world {} (request {id})",
            self.reconciler.config().world_name
        );
    }

    /// Run one tick: reconcile, publish responses, publish a snapshot.
    pub fn step(&mut self) -> TickReport {
        let started = Instant::now();
        let report = self.reconciler.tick(&self.intake);
        self.client.publish_outbound(&report.outbound);

        if !self.client.awaiting_scene() && !self.scene_received.swap(true, Ordering::AcqRel) {
            tracing::info!("Scene received at tick {}", report.tick);
        }

        let changed = report.drained > 0
            || !report.removed.is_empty()
            || report.expired > 0
            || self.snapshots.latest().is_none();
        if changed {
            self.snapshots.publish(self.reconciler.document());
        }

        metrics::record_tick(&report, started.elapsed().as_secs_f64());
        metrics::set_pending(&self.reconciler.pending_counts());
        metrics::set_entities(self.reconciler.registry().len());
        report
    }

    /// Tick until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// Requests the scene first and writes a final snapshot on exit.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.bootstrap();

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.step();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!(
            "Tick loop stopped after {} ticks",
            self.reconciler.tick_count()
        );
        self.snapshots.publish(self.reconciler.document());
        match self.snapshots.persist() {
            Ok(Some(path)) => tracing::info!("Snapshot written to {}", path.display()),
            Ok(None) => {}
            Err(err) => tracing::warn!("Failed to write snapshot: {err}"),
        }
    }
}
