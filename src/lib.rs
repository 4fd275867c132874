//! upload-assembler - Chunked-upload assembly engine for resumable upload clients
//!
//! This crate accepts whole files and file fragments from browser upload
//! widgets and turns them into finished artifacts:
//! - Fragments stored per upload id until a finalize call assembles them
//! - Extension, MIME type and size policy checked before bytes are kept
//! - At most one assembly per upload id at a time
//! - Probabilistic (or periodic) cleanup of abandoned fragment sets

pub mod api;
pub mod chunk_store;
pub mod config;
#[cfg(test)]
pub mod testutil;
pub mod upload;

use config::Config;
use upload::UploadCoordinator;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub uploads: UploadCoordinator,
}
