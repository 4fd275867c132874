use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::api::response::JSend;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub upload_dir_writable: bool,
}

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub scanned: u64,
    pub removed: u64,
    pub failed: u64,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn health(State(state): State<Arc<AppState>>) -> Json<JSend<HealthResponse>> {
    let upload_dir_writable = state
        .uploads
        .policy()
        .check_directory(state.uploads.upload_dir())
        .is_ok();

    JSend::success(HealthResponse {
        status: if upload_dir_writable { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        upload_dir_writable,
    })
}

/// Run a full chunk cleanup now, regardless of the configured probability.
pub async fn sweep_chunks(State(state): State<Arc<AppState>>) -> Json<JSend<SweepResponse>> {
    let stats = state.uploads.garbage_collector().sweep().await;

    tracing::info!(removed = stats.removed, "Manual chunk cleanup");

    JSend::success(SweepResponse {
        scanned: stats.scanned,
        removed: stats.removed,
        failed: stats.failed,
    })
}
