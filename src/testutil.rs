//! Shared test helpers for upload-assembler unit tests.

use std::sync::Arc;

use crate::config::{ChunkConfig, Config, NodeConfig, UploadConfig};
use crate::upload::UploadCoordinator;
use crate::AppState;

/// Configuration rooted in a temporary directory. The cleanup probability is
/// tiny so tests trigger sweeps explicitly.
pub fn test_config(temp_dir: &tempfile::TempDir) -> Config {
    let upload_dir = temp_dir.path().join("uploads");
    let chunks_dir = temp_dir.path().join("chunks");

    Config {
        node: NodeConfig {
            bind_address: "127.0.0.1:0".to_string(),
            max_request_size: 10 * 1024 * 1024, // 10MB for tests
        },
        upload: UploadConfig {
            upload_dir: upload_dir.to_string_lossy().to_string(),
            ..Default::default()
        },
        chunks: ChunkConfig {
            chunks_dir: chunks_dir.to_string_lossy().to_string(),
            cleanup_probability: f64::MIN_POSITIVE,
            ..Default::default()
        },
    }
}

/// Create a test AppState over temporary upload and chunk directories.
pub fn test_state(temp_dir: &tempfile::TempDir) -> Arc<AppState> {
    test_state_with(test_config(temp_dir))
}

pub fn test_state_with(config: Config) -> Arc<AppState> {
    let uploads = UploadCoordinator::new(&config).expect("Failed to create upload coordinator");
    Arc::new(AppState { config, uploads })
}
