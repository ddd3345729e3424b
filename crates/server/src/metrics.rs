//! Prometheus metrics for the file sync loop.
//!
//! Served unauthenticated at `/metrics` when `file_sync.metrics_enabled` is
//! set. Keep the listener on a private network.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static CYCLES_RUN: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "konakore_file_sync_cycles_total",
        "Total number of file sync cycles run",
    )
    .expect("metric creation failed")
});

pub static DOWNLOADS_SUBMITTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "konakore_file_sync_downloads_submitted_total",
        "Downloads accepted by the download daemon",
    )
    .expect("metric creation failed")
});

pub static DOWNLOADS_FAILED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "konakore_file_sync_downloads_failed_total",
        "Liked posts that could not be submitted for download",
    )
    .expect("metric creation failed")
});

pub static DOWNLOADS_COMPLETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "konakore_file_sync_downloads_completed_total",
        "Downloads observed complete on disk",
    )
    .expect("metric creation failed")
});

pub static FILES_RECLAIMED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "konakore_file_sync_files_reclaimed_total",
        "Files removed after their post was unliked",
    )
    .expect("metric creation failed")
});

pub static RECONCILE_REMOVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "konakore_file_sync_reconcile_removed_total",
        "Files removed by deep reconciliation",
    )
    .expect("metric creation failed")
});

pub static FILES_ADOPTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "konakore_file_sync_files_adopted_total",
        "Existing library files recorded without downloading",
    )
    .expect("metric creation failed")
});

pub static LOOP_RUNNING: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "konakore_file_sync_loop_running",
        "1 while the adaptive sync loop is active",
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry. Safe to call repeatedly.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(CYCLES_RUN.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(DOWNLOADS_SUBMITTED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(DOWNLOADS_FAILED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(DOWNLOADS_COMPLETED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(FILES_RECLAIMED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(RECONCILE_REMOVED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(FILES_ADOPTED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(LOOP_RUNNING.clone()))
            .expect("metric registration failed");
    });
}

/// Handler for `GET /metrics`.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}
