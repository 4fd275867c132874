mod local;

pub use local::LocalChunkStore;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::io::AsyncRead;

#[derive(Debug, Error)]
pub enum ChunkStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Fragment not found: {upload_id}/{part_index}")]
    NotFound { upload_id: String, part_index: u32 },
}

/// Boxed reader over one stored fragment.
pub type FragmentReader = Box<dyn AsyncRead + Send + Unpin>;

/// Storage for the fragments of in-progress uploads.
///
/// Fragments are keyed by `(upload_id, part_index)`. Callers are expected to
/// hand in upload ids that are already validated as a single path component.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Persist one fragment. Saving the same part twice keeps the last write.
    async fn save_fragment(
        &self,
        upload_id: &str,
        part_index: u32,
        data: Bytes,
    ) -> Result<(), ChunkStoreError>;

    async fn open_fragment(
        &self,
        upload_id: &str,
        part_index: u32,
    ) -> Result<FragmentReader, ChunkStoreError>;

    /// Part indexes currently stored for an upload, ascending.
    async fn list_fragments(&self, upload_id: &str) -> Result<Vec<u32>, ChunkStoreError>;

    /// Delete parts `0..total_parts`, then the upload's fragment directory.
    /// Missing parts are not an error.
    async fn remove_fragments(
        &self,
        upload_id: &str,
        total_parts: u32,
    ) -> Result<(), ChunkStoreError>;

    /// Drop everything stored for an upload. Missing uploads are not an error.
    async fn discard(&self, upload_id: &str) -> Result<(), ChunkStoreError>;
}
