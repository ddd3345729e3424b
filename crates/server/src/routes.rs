//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Create the listener router.
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/trigger", post(handlers::trigger))
        .route("/health", get(handlers::health))
        .route("/reconcile", post(handlers::reconcile));

    if state.config.file_sync.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
