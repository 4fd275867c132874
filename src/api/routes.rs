use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let request_limit = state.config.node.max_request_size as usize;

    Router::new()
        // Uploads
        .route(
            "/uploads",
            post(handlers::upload_file).layer(DefaultBodyLimit::max(request_limit)),
        )
        .route("/uploads/done", post(handlers::combine_upload))
        .route("/uploads/:uuid", delete(handlers::delete_upload))
        // Internal
        .route("/_internal/chunks/sweep", post(handlers::sweep_chunks))
        .route("/_internal/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
