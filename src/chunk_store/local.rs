use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{ChunkStore, ChunkStoreError, FragmentReader};

/// Filesystem fragment store laid out as `<root>/<upload_id>/<part_index>`.
pub struct LocalChunkStore {
    root: PathBuf,
}

impl LocalChunkStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, std::io::Error> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn upload_dir(&self, upload_id: &str) -> PathBuf {
        self.root.join(upload_id)
    }

    fn fragment_path(&self, upload_id: &str, part_index: u32) -> PathBuf {
        self.upload_dir(upload_id).join(part_index.to_string())
    }
}

#[async_trait]
impl ChunkStore for LocalChunkStore {
    async fn save_fragment(
        &self,
        upload_id: &str,
        part_index: u32,
        data: Bytes,
    ) -> Result<(), ChunkStoreError> {
        // create_dir_all succeeds when the directory already exists, so
        // concurrent first fragments of one upload do not trip over each other.
        fs::create_dir_all(self.upload_dir(upload_id)).await?;

        let path = self.fragment_path(upload_id, part_index);
        let temp_path = self
            .upload_dir(upload_id)
            .join(format!(".{part_index}.tmp.{}", uuid::Uuid::new_v4()));
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
        }
        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        Ok(())
    }

    async fn open_fragment(
        &self,
        upload_id: &str,
        part_index: u32,
    ) -> Result<FragmentReader, ChunkStoreError> {
        let path = self.fragment_path(upload_id, part_index);
        match fs::File::open(&path).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(ChunkStoreError::NotFound {
                upload_id: upload_id.to_string(),
                part_index,
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_fragments(&self, upload_id: &str) -> Result<Vec<u32>, ChunkStoreError> {
        let mut entries = match fs::read_dir(self.upload_dir(upload_id)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut parts = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            // In-flight temp files and anything foreign do not parse as an
            // index; non-canonical spellings like `01` are not ours either.
            if let Some(index) = entry.file_name().to_str().and_then(|name| {
                name.parse::<u32>()
                    .ok()
                    .filter(|index| index.to_string() == name)
            }) {
                parts.push(index);
            }
        }
        parts.sort_unstable();
        Ok(parts)
    }

    async fn remove_fragments(
        &self,
        upload_id: &str,
        total_parts: u32,
    ) -> Result<(), ChunkStoreError> {
        for part_index in 0..total_parts {
            match fs::remove_file(self.fragment_path(upload_id, part_index)).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        // remove_dir_all also clears temp files left by interrupted saves.
        match fs::remove_dir_all(self.upload_dir(upload_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn discard(&self, upload_id: &str) -> Result<(), ChunkStoreError> {
        match fs::remove_dir_all(self.upload_dir(upload_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
