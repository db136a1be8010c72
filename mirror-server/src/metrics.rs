//! Prometheus metrics for the scene mirror.
//!
//! Provides metrics collection and a Prometheus-compatible `/metrics` endpoint.

use std::collections::BTreeMap;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use mirror_core::{MessageKind, TickReport};

// Metric names as constants for consistency
const TICKS_TOTAL: &str = "scene_mirror_ticks_total";
const TICK_DURATION: &str = "scene_mirror_tick_duration_seconds";
const MESSAGES_TOTAL: &str = "scene_mirror_messages_total";
const PENDING_MESSAGES: &str = "scene_mirror_pending_messages";
const ENTITIES_TOTAL: &str = "scene_mirror_entities_total";
const REMOVED_TOTAL: &str = "scene_mirror_removed_entities_total";
const EXPIRED_TOTAL: &str = "scene_mirror_expired_messages_total";
const INJECTED_TOTAL: &str = "scene_mirror_injected_messages_total";

/// Initialize metrics and return the Prometheus handle.
///
/// # Errors
///
/// Returns an error if the Prometheus recorder cannot be installed
/// (e.g., if another recorder is already installed).
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Record one reconciliation tick.
///
/// # Arguments
///
/// * `report` - What the tick did
/// * `duration_secs` - Wall time spent in the tick
pub fn record_tick(report: &TickReport, duration_secs: f64) {
    counter!(TICKS_TOTAL).increment(1);
    histogram!(TICK_DURATION).record(duration_secs);

    for (kind, stats) in &report.stats {
        if stats.applied > 0 {
            counter!(MESSAGES_TOTAL, "kind" => kind.as_str(), "outcome" => "applied")
                .increment(stats.applied as u64);
        }
        if stats.deferred > 0 {
            counter!(MESSAGES_TOTAL, "kind" => kind.as_str(), "outcome" => "deferred")
                .increment(stats.deferred as u64);
        }
    }
    if !report.removed.is_empty() {
        counter!(REMOVED_TOTAL).increment(report.removed.len() as u64);
    }
    if report.expired > 0 {
        counter!(EXPIRED_TOTAL).increment(report.expired as u64);
    }
}

/// Update pending message gauges.
#[allow(clippy::cast_precision_loss)]
pub fn set_pending(counts: &BTreeMap<MessageKind, usize>) {
    for (kind, count) in counts {
        gauge!(PENDING_MESSAGES, "kind" => kind.as_str()).set(*count as f64);
    }
}

/// Update mirrored entity count.
#[allow(clippy::cast_precision_loss)]
pub fn set_entities(count: usize) {
    gauge!(ENTITIES_TOTAL).set(count as f64);
}

/// Record a message injected over HTTP.
///
/// # Arguments
///
/// * `kind` - Message kind
/// * `delivered` - Number of subscribers that received it
pub fn record_injected(kind: MessageKind, delivered: usize) {
    counter!(
        INJECTED_TOTAL,
        "kind" => kind.as_str(),
        "delivered" => (delivered > 0).to_string()
    )
    .increment(1);
}
