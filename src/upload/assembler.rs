use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::locks::{UploadLockGuard, UploadLocks};
use super::namer::{Placeholder, UniqueNamer};
use super::UploadError;
use crate::chunk_store::{ChunkStore, ChunkStoreError};

/// A finished artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembleOutcome {
    pub path: PathBuf,
    pub byte_size: u64,
    /// Final file name, which differs from the requested one after renaming.
    pub upload_name: String,
}

/// Concatenates the fragments of an upload, in part order, into one file.
///
/// At most one assembly (or delete) runs per upload id at a time.
pub struct Assembler {
    store: Arc<dyn ChunkStore>,
    locks: UploadLocks,
    namer: UniqueNamer,
}

impl Assembler {
    pub fn new(store: Arc<dyn ChunkStore>) -> Self {
        Self {
            store,
            locks: UploadLocks::new(),
            namer: UniqueNamer::default(),
        }
    }

    /// Exclusive access to an upload id, shared with `combine`.
    pub async fn lock(&self, upload_id: &str) -> UploadLockGuard<'_> {
        self.locks.acquire(upload_id).await
    }

    pub fn locks(&self) -> &UploadLocks {
        &self.locks
    }

    /// Assemble `total_parts` fragments into `<destination_dir>/<upload_id>/<filename>`.
    ///
    /// The artifact is streamed into a hidden sibling and renamed into place,
    /// so the target never holds a partial file. On an I/O failure the
    /// temporary file and all fragments are left for diagnosis or retry.
    pub async fn combine(
        &self,
        upload_id: &str,
        destination_dir: &Path,
        filename: &str,
        total_parts: u32,
        size_limit: Option<u64>,
        rename_on_conflict: bool,
    ) -> Result<AssembleOutcome, UploadError> {
        let _guard = self.lock(upload_id).await;

        if total_parts == 0 {
            return Err(UploadError::Assemble(format!(
                "upload {upload_id} declares no parts"
            )));
        }
        let stored = self.store.list_fragments(upload_id).await.map_err(assemble_error)?;
        if let Some(missing) = first_missing_part(&stored, total_parts) {
            return Err(UploadError::Assemble(format!(
                "upload {upload_id} is missing part {missing} of {total_parts} ({} stored)",
                stored.len()
            )));
        }

        let target_dir = destination_dir.join(upload_id);
        fs::create_dir_all(&target_dir)
            .await
            .map_err(|e| UploadError::Assemble(e.to_string()))?;

        // Dropping the placeholder on any early return (or cancellation)
        // removes it, so the final path never shows an empty file.
        let placeholder = if rename_on_conflict {
            Some(Placeholder::new(
                self.namer.allocate(&target_dir, filename).await?,
            ))
        } else {
            None
        };
        let target = match &placeholder {
            Some(placeholder) => placeholder.path().to_path_buf(),
            None => target_dir.join(filename),
        };

        let temp_path = temp_sibling(&target_dir);
        let written = self
            .concatenate(upload_id, total_parts, &temp_path, size_limit)
            .await?;

        // Leftovers are reclaimed by the garbage collector.
        if let Err(e) = self.store.remove_fragments(upload_id, total_parts).await {
            tracing::warn!(upload_id, error = %e, "Failed to remove fragments after assembly");
        }

        if let Some(limit) = size_limit.filter(|limit| written > *limit) {
            let _ = fs::remove_file(&temp_path).await;
            tracing::warn!(upload_id, limit, "Assembled file exceeds size limit, discarded");
            return Err(UploadError::TooLargeAfterAssembly { limit });
        }

        fs::rename(&temp_path, &target)
            .await
            .map_err(|e| UploadError::Assemble(e.to_string()))?;
        if let Some(placeholder) = placeholder {
            placeholder.keep();
        }

        let upload_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| filename.to_string());

        tracing::debug!(
            upload_id,
            path = %target.display(),
            byte_size = written,
            total_parts,
            "Assembled upload"
        );

        Ok(AssembleOutcome {
            path: target,
            byte_size: written,
            upload_name,
        })
    }

    /// Append parts `0..total_parts` to `temp_path`, in order. Stops early once
    /// the size limit is exceeded and returns the bytes written so far.
    async fn concatenate(
        &self,
        upload_id: &str,
        total_parts: u32,
        temp_path: &Path,
        size_limit: Option<u64>,
    ) -> Result<u64, UploadError> {
        let mut target = fs::File::create(temp_path)
            .await
            .map_err(|e| UploadError::Assemble(e.to_string()))?;

        let mut written: u64 = 0;
        for part_index in 0..total_parts {
            let fragment = self
                .store
                .open_fragment(upload_id, part_index)
                .await
                .map_err(assemble_error)?;

            // Read one byte past the remaining budget so overage is detected
            // without copying the rest of an oversized fragment.
            let mut reader = match size_limit {
                Some(limit) => fragment.take(limit.saturating_sub(written).saturating_add(1)),
                None => fragment.take(u64::MAX),
            };
            written += tokio::io::copy(&mut reader, &mut target)
                .await
                .map_err(|e| UploadError::Assemble(format!("part {part_index}: {e}")))?;

            if size_limit.is_some_and(|limit| written > limit) {
                break;
            }
        }

        target
            .flush()
            .await
            .map_err(|e| UploadError::Assemble(e.to_string()))?;
        target
            .sync_all()
            .await
            .map_err(|e| UploadError::Assemble(e.to_string()))?;

        Ok(written)
    }
}

/// First index in `0..total_parts` without a stored fragment, or `None` when
/// all are present. `stored` is ascending and duplicate-free, so the work is
/// bounded by what is on disk rather than by the client's part count.
fn first_missing_part(stored: &[u32], total_parts: u32) -> Option<u32> {
    let contiguous = stored
        .iter()
        .zip(0..total_parts)
        .take_while(|(part, index)| *part == index)
        .count() as u32;
    (contiguous < total_parts).then_some(contiguous)
}

/// Hidden temporary name next to the target. Kept short so any name that
/// fits the filesystem as a target also works while being written.
fn temp_sibling(dir: &Path) -> PathBuf {
    dir.join(format!(".{}.part", uuid::Uuid::new_v4().simple()))
}

fn assemble_error(e: ChunkStoreError) -> UploadError {
    UploadError::Assemble(e.to_string())
}

/// Write `data` to `path` through a temporary sibling and an atomic rename.
pub(crate) async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), std::io::Error> {
    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(ErrorKind::InvalidInput, "target path has no parent")
    })?;
    fs::create_dir_all(parent).await?;

    let temp_path = temp_sibling(parent);
    {
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
    }
    if let Err(e) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(e);
    }
    Ok(())
}
