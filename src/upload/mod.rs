//! Chunked-upload assembly engine.
//!
//! Requests follow the "traditional server" convention of browser upload
//! widgets: a whole file or one fragment per multipart request, plus a
//! separate finalize call that concatenates fragments into the artifact.
//!
//! Filesystem layout:
//! - `<chunks_dir>/<uuid>/<part index>` for in-flight fragments
//! - `<upload_dir>/<uuid>/<filename>` for finished artifacts

mod assembler;
mod coordinator;
mod gc;
mod locks;
mod namer;
mod policy;
mod types;

pub use assembler::{AssembleOutcome, Assembler};
pub use coordinator::{UploadCoordinator, UploadReceipt};
pub use gc::{GarbageCollector, SweepStats};
pub use locks::{UploadLockGuard, UploadLocks};
pub use namer::UniqueNamer;
pub use policy::{is_accessible, sanitize_filename, validate_upload_id, ValidationPolicy};
pub use types::{CombineRequest, FilePart, UploadRequest, UploadResponse};

use axum::http::StatusCode;
use thiserror::Error;

/// Outcome of a policy check: `Ok` is accepted, `Err` carries the rejection.
pub type ValidationOutcome = Result<(), UploadError>;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Server error. Increase the request size limit to {required}")]
    ServerMisconfigured { required: String },
    #[error("Server error. Uploads directory isn't writable")]
    DirectoryInaccessible,
    #[error("Server error. Not a multipart request. Please set forceMultipart to default value (true).")]
    NotMultipart,
    #[error("No files were uploaded.")]
    NoFileProvided,
    #[error("File name empty.")]
    EmptyName,
    #[error("File is empty.")]
    EmptyFile,
    #[error("File is too large. The limit is {limit} bytes.")]
    TooLarge { limit: u64 },
    #[error("File is too large after assembly. The limit is {limit} bytes.")]
    TooLargeAfterAssembly { limit: u64 },
    #[error("File has an invalid extension, it should be one of {allowed}.")]
    InvalidExtension { allowed: String },
    #[error("File has an invalid mime type, it should be one of {allowed}.")]
    InvalidMimeType { allowed: String },
    #[error("Invalid upload id: {0:?}")]
    InvalidUploadId(String),
    #[error("Part index {index} is out of range for {total} parts")]
    InvalidPartIndex { index: u32, total: u32 },
    #[error("Server error. Chunks directory isn't writable or executable.")]
    ChunksDirNotWritable,
    #[error("Could not save uploaded file: {0}")]
    Fragment(String),
    #[error("Could not assemble uploaded file: {0}")]
    Assemble(String),
    #[error("Could not allocate a unique file name: {0}")]
    Allocation(String),
    #[error("Could not delete upload: {0}")]
    Delete(String),
}

impl UploadError {
    /// Size violations cannot succeed on resubmission without a smaller file.
    pub fn prevent_retry(&self) -> bool {
        matches!(
            self,
            UploadError::TooLarge { .. } | UploadError::TooLargeAfterAssembly { .. }
        )
    }

    /// Transient I/O failures the client may resubmit under the same upload id.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UploadError::Fragment(_)
                | UploadError::Assemble(_)
                | UploadError::Allocation(_)
                | UploadError::Delete(_)
        )
    }

    /// Failures caused by the server's environment rather than the request.
    pub fn is_server_side(&self) -> bool {
        matches!(
            self,
            UploadError::ServerMisconfigured { .. }
                | UploadError::DirectoryInaccessible
                | UploadError::ChunksDirNotWritable
        ) || self.is_retryable()
    }

    /// Transport status: 413 for size violations, 500 for server-side and
    /// I/O failures, 400 for everything the client got wrong.
    pub fn status_code(&self) -> StatusCode {
        if self.prevent_retry() {
            StatusCode::PAYLOAD_TOO_LARGE
        } else if self.is_server_side() {
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            StatusCode::BAD_REQUEST
        }
    }
}
