//! Shared helpers for upload-assembler integration tests.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use upload_assembler::config::{ChunkConfig, Config, NodeConfig, UploadConfig};
use upload_assembler::upload::{FilePart, UploadCoordinator, UploadRequest};
use upload_assembler::AppState;

pub const MULTIPART: Option<&str> = Some("multipart/form-data; boundary=test-boundary");
pub const BOUNDARY: &str = "test-boundary";

pub fn test_config(dir: &tempfile::TempDir) -> Config {
    Config {
        node: NodeConfig {
            bind_address: "127.0.0.1:0".to_string(),
            max_request_size: 10 * 1024 * 1024,
        },
        upload: UploadConfig {
            upload_dir: dir.path().join("uploads").to_string_lossy().to_string(),
            ..Default::default()
        },
        chunks: ChunkConfig {
            chunks_dir: dir.path().join("chunks").to_string_lossy().to_string(),
            cleanup_probability: f64::MIN_POSITIVE,
            ..Default::default()
        },
    }
}

pub fn coordinator(config: &Config) -> UploadCoordinator {
    UploadCoordinator::new(config).expect("coordinator")
}

pub fn app_state(config: Config) -> Arc<AppState> {
    let uploads = coordinator(&config);
    Arc::new(AppState { config, uploads })
}

pub fn upload_dir(config: &Config) -> PathBuf {
    PathBuf::from(&config.upload.upload_dir)
}

pub fn chunks_dir(config: &Config) -> PathBuf {
    PathBuf::from(&config.chunks.chunks_dir)
}

/// A whole-file upload request.
pub fn whole_file(uuid: &str, filename: &str, data: &[u8]) -> UploadRequest {
    UploadRequest {
        filename: Some(filename.to_string()),
        uuid: uuid.to_string(),
        total_parts: 1,
        part_index: 0,
        total_file_size: Some(data.len() as u64),
        file: Some(FilePart {
            file_name: Some("blob".to_string()),
            content_type: None,
            data: Bytes::copy_from_slice(data),
        }),
    }
}

/// One fragment of a chunked upload.
pub fn fragment(
    uuid: &str,
    filename: &str,
    part_index: u32,
    total_parts: u32,
    data: &[u8],
) -> UploadRequest {
    UploadRequest {
        filename: Some(filename.to_string()),
        uuid: uuid.to_string(),
        total_parts,
        part_index,
        total_file_size: None,
        file: Some(FilePart {
            file_name: Some("blob".to_string()),
            content_type: Some("application/octet-stream".to_string()),
            data: Bytes::copy_from_slice(data),
        }),
    }
}

/// Encode text fields and an optional file part as a multipart/form-data body.
pub fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    if let Some((field, filename, data)) = file {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}
