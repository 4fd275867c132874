use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::fs;

use super::assembler::{write_atomic, Assembler};
use super::gc::GarbageCollector;
use super::namer::{Placeholder, UniqueNamer};
use super::policy::{is_accessible, sanitize_filename, validate_upload_id, ValidationPolicy};
use super::types::{CombineRequest, UploadRequest};
use super::UploadError;
use crate::chunk_store::{ChunkStore, LocalChunkStore};
use crate::config::Config;

/// What a successful request produced.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadReceipt {
    pub uuid: String,
    /// Name of the stored artifact. `None` for a saved fragment.
    pub upload_name: Option<String>,
}

/// Entry point for upload requests: validation, fragment storage, whole-file
/// writes, assembly and deletion.
pub struct UploadCoordinator {
    upload_dir: PathBuf,
    chunks_dir: PathBuf,
    policy: ValidationPolicy,
    store: Arc<dyn ChunkStore>,
    assembler: Assembler,
    gc: Arc<GarbageCollector>,
    namer: UniqueNamer,
    rename_on_conflict: bool,
    io_timeout: Duration,
}

impl UploadCoordinator {
    /// Build a coordinator over the local filesystem, creating both directories.
    pub fn new(config: &Config) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&config.upload.upload_dir)?;
        let store = LocalChunkStore::new(&config.chunks.chunks_dir)?;
        Ok(Self::with_store(config, Arc::new(store)))
    }

    pub fn with_store(config: &Config, store: Arc<dyn ChunkStore>) -> Self {
        let chunks_dir = PathBuf::from(&config.chunks.chunks_dir);
        Self {
            upload_dir: PathBuf::from(&config.upload.upload_dir),
            gc: Arc::new(GarbageCollector::new(
                chunks_dir.clone(),
                config.chunks.cleanup_probability,
                config.chunks.expire_in,
            )),
            chunks_dir,
            policy: ValidationPolicy::from_config(config),
            assembler: Assembler::new(Arc::clone(&store)),
            store,
            namer: UniqueNamer::default(),
            rename_on_conflict: config.upload.rename_on_conflict,
            io_timeout: config.upload.io_timeout,
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    pub fn garbage_collector(&self) -> Arc<GarbageCollector> {
        Arc::clone(&self.gc)
    }

    pub fn assembler(&self) -> &Assembler {
        &self.assembler
    }

    /// Handle one multipart request: a whole file or a single fragment.
    pub async fn handle_upload(
        &self,
        content_type: Option<&str>,
        request: UploadRequest,
    ) -> Result<UploadReceipt, UploadError> {
        // Maintenance only; its outcome never affects this request.
        self.gc.maybe_run().await;

        self.policy.check_server()?;
        self.policy.check_directory(&self.upload_dir)?;
        self.policy.check_encoding(content_type)?;

        let name = request.name();
        let mime_type = request.mime_type();
        let file = request.file.ok_or(UploadError::NoFileProvided)?;
        let uuid = validate_upload_id(&request.uuid)?.to_string();

        if request.total_parts > 1 {
            let declared = request
                .total_file_size
                .unwrap_or(file.data.len() as u64);
            self.policy
                .check_file(name.as_deref(), declared, mime_type.as_deref())?;

            if request.part_index >= request.total_parts {
                return Err(UploadError::InvalidPartIndex {
                    index: request.part_index,
                    total: request.total_parts,
                });
            }
            if !is_accessible(&self.chunks_dir) || !is_accessible(&self.upload_dir) {
                return Err(UploadError::ChunksDirNotWritable);
            }

            let byte_size = file.data.len();
            self.bounded(
                self.store
                    .save_fragment(&uuid, request.part_index, file.data),
                UploadError::Fragment,
            )
            .await?
            .map_err(|e| UploadError::Fragment(e.to_string()))?;

            tracing::debug!(
                uuid = %uuid,
                part_index = request.part_index,
                total_parts = request.total_parts,
                byte_size,
                "Saved fragment"
            );
            return Ok(UploadReceipt {
                uuid,
                upload_name: None,
            });
        }

        // Whole-file upload: the body is the complete file. A declared size
        // takes part in the rules, but the body itself must fit too.
        let body_len = file.data.len() as u64;
        let declared = request.total_file_size.unwrap_or(body_len);
        self.policy
            .check_file(name.as_deref(), declared, mime_type.as_deref())?;
        if body_len == 0 {
            return Err(UploadError::EmptyFile);
        }
        self.policy.check_size(body_len)?;
        let name = name.ok_or(UploadError::EmptyName)?;

        let target_dir = self.upload_dir.join(&uuid);
        let placeholder = if self.rename_on_conflict {
            fs::create_dir_all(&target_dir)
                .await
                .map_err(|e| UploadError::Allocation(e.to_string()))?;
            Some(Placeholder::new(
                self.namer.allocate(&target_dir, &name).await?,
            ))
        } else {
            None
        };
        let target = match &placeholder {
            Some(placeholder) => placeholder.path().to_path_buf(),
            None => target_dir.join(&name),
        };

        self.bounded(write_atomic(&target, &file.data), UploadError::Fragment)
            .await?
            .map_err(|e| UploadError::Fragment(e.to_string()))?;
        if let Some(placeholder) = placeholder {
            placeholder.keep();
        }

        let upload_name = file_name_of(&target, &name);
        tracing::debug!(uuid = %uuid, path = %target.display(), byte_size = file.data.len(), "Stored upload");

        Ok(UploadReceipt {
            uuid,
            upload_name: Some(upload_name),
        })
    }

    /// Finalize a chunked upload by assembling its fragments.
    pub async fn combine(&self, request: CombineRequest) -> Result<UploadReceipt, UploadError> {
        let uuid = validate_upload_id(&request.uuid)?.to_string();
        self.policy.check_directory(&self.upload_dir)?;

        let name = request
            .filename
            .as_deref()
            .and_then(sanitize_filename)
            .ok_or(UploadError::EmptyName)?;
        // The finalize call may name the file differently from its fragments.
        self.policy.check_extension(&name)?;

        if let Some(declared) = request.total_file_size {
            if let Err(e) = self.policy.check_size(declared) {
                let _guard = self.assembler.lock(&uuid).await;
                self.discard_fragments(&uuid).await;
                return Err(e);
            }
        }

        let outcome = self
            .bounded(
                self.assembler.combine(
                    &uuid,
                    &self.upload_dir,
                    &name,
                    request.total_parts,
                    self.policy.size_limit(),
                    self.rename_on_conflict,
                ),
                UploadError::Assemble,
            )
            .await??;

        Ok(UploadReceipt {
            uuid,
            upload_name: Some(outcome.upload_name),
        })
    }

    /// Remove an upload's artifact directory and any fragments. Idempotent.
    pub async fn delete(&self, uuid: &str) -> Result<(), UploadError> {
        let uuid = validate_upload_id(uuid)?;
        let _guard = self.assembler.lock(uuid).await;

        match fs::remove_dir_all(self.upload_dir.join(uuid)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(UploadError::Delete(e.to_string())),
        }
        self.store
            .discard(uuid)
            .await
            .map_err(|e| UploadError::Delete(e.to_string()))?;

        tracing::debug!(uuid = %uuid, "Deleted upload");
        Ok(())
    }

    async fn discard_fragments(&self, uuid: &str) {
        if let Err(e) = self.store.discard(uuid).await {
            tracing::warn!(uuid = %uuid, error = %e, "Failed to discard fragments");
        }
    }

    /// Run `op` under the configured I/O timeout. Expiry is reported through `wrap`.
    async fn bounded<F: Future>(
        &self,
        op: F,
        wrap: fn(String) -> UploadError,
    ) -> Result<F::Output, UploadError> {
        tokio::time::timeout(self.io_timeout, op)
            .await
            .map_err(|_| wrap(format!("timed out after {:?}", self.io_timeout)))
    }
}

fn file_name_of(path: &Path, fallback: &str) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::testutil::{test_config, test_state, test_state_with};
    use crate::upload::FilePart;

    const MULTIPART: Option<&str> = Some("multipart/form-data; boundary=x");

    fn fragment(uuid: &str, index: u32, total: u32, data: &'static str) -> UploadRequest {
        UploadRequest {
            filename: Some("notes.txt".to_string()),
            uuid: uuid.to_string(),
            total_parts: total,
            part_index: index,
            total_file_size: None,
            file: Some(FilePart {
                file_name: Some("blob".to_string()),
                content_type: Some("application/octet-stream".to_string()),
                data: Bytes::from_static(data.as_bytes()),
            }),
        }
    }

    #[tokio::test]
    async fn test_fragment_out_of_range_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let err = state
            .uploads
            .handle_upload(MULTIPART, fragment("u-range", 3, 3, "abc"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            UploadError::InvalidPartIndex { index: 3, total: 3 }
        ));
    }

    #[tokio::test]
    async fn test_missing_chunks_dir_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        std::fs::remove_dir_all(&state.config.chunks.chunks_dir).unwrap();

        let err = state
            .uploads
            .handle_upload(MULTIPART, fragment("u-nochunks", 0, 2, "abc"))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::ChunksDirNotWritable));
    }

    #[tokio::test]
    async fn test_combine_rejects_declared_oversize_and_discards_fragments() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.upload.size_limit = Some(4);
        let state = test_state_with(config);

        let mut part = fragment("u-declared", 0, 2, "abc");
        part.total_file_size = Some(4);
        state.uploads.handle_upload(MULTIPART, part).await.unwrap();

        let err = state
            .uploads
            .combine(CombineRequest {
                uuid: "u-declared".to_string(),
                filename: Some("notes.txt".to_string()),
                total_parts: 2,
                total_file_size: Some(400),
            })
            .await
            .unwrap_err();

        assert!(err.prevent_retry());
        assert!(!Path::new(&state.config.chunks.chunks_dir)
            .join("u-declared")
            .exists());
    }

    #[tokio::test]
    async fn test_combine_checks_extension_of_final_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.upload.allowed_extensions = vec!["txt".to_string()];
        let state = test_state_with(config);

        let err = state
            .uploads
            .combine(CombineRequest {
                uuid: "u-ext".to_string(),
                filename: Some("payload.exe".to_string()),
                total_parts: 2,
                total_file_size: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::InvalidExtension { .. }));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        state
            .uploads
            .handle_upload(MULTIPART, fragment("u-del", 0, 1, "whole"))
            .await
            .unwrap();
        let artifact_dir = state.uploads.upload_dir().join("u-del");
        assert!(artifact_dir.join("notes.txt").exists());

        state.uploads.delete("u-del").await.unwrap();
        assert!(!artifact_dir.exists());
        state.uploads.delete("u-del").await.unwrap();
        assert!(state.uploads.assembler().locks().is_empty());
    }
}
