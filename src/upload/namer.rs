use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use rand::Rng;
use tokio::fs::OpenOptions;
use tokio::sync::Mutex;

use super::UploadError;

/// Serializes name allocation across the whole process. `create_new` makes the
/// placeholder itself atomic, which covers other processes sharing the store.
static NAME_LOCK: Mutex<()> = Mutex::const_new(());

const DEFAULT_MAX_ATTEMPTS: u32 = 10_000;

/// Allocates collision-free file names inside a directory.
#[derive(Debug, Clone)]
pub struct UniqueNamer {
    max_attempts: u32,
}

impl Default for UniqueNamer {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl UniqueNamer {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Return a path in `dir` that did not exist, holding an empty placeholder.
    ///
    /// `report.pdf` becomes `report-<n>.pdf` when taken, where `n` grows by a
    /// random step in `1..=999` per collision.
    pub async fn allocate(&self, dir: &Path, filename: &str) -> Result<PathBuf, UploadError> {
        let _guard = NAME_LOCK.lock().await;

        let (base, ext) = split_name(filename);
        let mut candidate = dir.join(filename);
        let mut suffix: u64 = 0;

        for _ in 0..self.max_attempts {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
                .await
            {
                Ok(_) => {
                    tracing::debug!(path = %candidate.display(), "Allocated unique name");
                    return Ok(candidate);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    suffix += rand::thread_rng().gen_range(1..=999);
                    candidate = dir.join(format!("{base}-{suffix}{ext}"));
                }
                Err(e) => {
                    return Err(UploadError::Allocation(format!(
                        "cannot create {}: {e}",
                        candidate.display()
                    )))
                }
            }
        }

        Err(UploadError::Allocation(format!(
            "no free name for {filename:?} after {} attempts",
            self.max_attempts
        )))
    }
}

/// An allocated name whose placeholder is deleted on drop unless `keep` is
/// called, so failed writes do not leave an empty file at the final path.
pub(crate) struct Placeholder {
    path: PathBuf,
    armed: bool,
}

impl Placeholder {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// The real content is in place; stop guarding the path.
    pub(crate) fn keep(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for Placeholder {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        // Drop cannot await; the placeholder is empty so this is quick.
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove name placeholder");
            }
        }
    }
}

/// Split `name.ext` into (`name`, `.ext`). Dotfiles keep their whole name as base.
fn split_name(filename: &str) -> (&str, &str) {
    match filename.rfind('.') {
        Some(0) | None => (filename, ""),
        Some(i) => filename.split_at(i),
    }
}
