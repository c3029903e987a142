//! HTTP route definitions

use crate::api::handlers;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Create the main application router
pub fn create_router(state: Arc<crate::AppState>) -> Router {
    let body_limit = state.settings.server.max_upload_bytes;

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .route("/generate-raw-obj", post(handlers::generate_raw_obj))
        .route("/generate-obj", post(handlers::generate_obj))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
