use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::fs;
use tokio::task::JoinHandle;

use super::policy::is_accessible;

/// Results of one sweep over the fragment root.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    /// Upload directories inspected
    pub scanned: u64,
    /// Expired upload directories deleted
    pub removed: u64,
    /// Entries that could not be inspected or deleted
    pub failed: u64,
}

/// Reclaims fragment directories of abandoned uploads.
///
/// Failures are logged and never surface to the request that triggered a sweep.
pub struct GarbageCollector {
    root: PathBuf,
    probability: f64,
    expire_in: Duration,
}

impl GarbageCollector {
    pub fn new(root: impl Into<PathBuf>, probability: f64, expire_in: Duration) -> Self {
        Self {
            root: root.into(),
            probability: probability.clamp(0.0, 1.0),
            expire_in,
        }
    }

    /// Sweep with the configured probability. Returns `None` when skipped.
    pub async fn maybe_run(&self) -> Option<SweepStats> {
        let run = rand::thread_rng().gen_bool(self.probability);
        if !run {
            return None;
        }
        if !is_accessible(&self.root) {
            tracing::warn!(root = %self.root.display(), "Chunks directory not writable, skipping cleanup");
            return None;
        }
        Some(self.sweep().await)
    }

    pub async fn sweep(&self) -> SweepStats {
        self.sweep_at(SystemTime::now()).await
    }

    /// Delete every upload directory whose modification time is more than
    /// `expire_in` before `now`. Plain files in the root are left alone.
    pub async fn sweep_at(&self, now: SystemTime) -> SweepStats {
        let mut stats = SweepStats::default();

        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(root = %self.root.display(), error = %e, "Failed to read chunks directory");
                stats.failed += 1;
                return stats;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to list chunks directory");
                    stats.failed += 1;
                    break;
                }
            };

            let path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "Skipping unreadable entry");
                    stats.failed += 1;
                    continue;
                }
            };
            if !metadata.is_dir() {
                continue;
            }
            stats.scanned += 1;

            let Ok(modified) = metadata.modified() else {
                stats.failed += 1;
                continue;
            };
            // A modification time after `now` means the directory is fresh.
            let expired = now
                .duration_since(modified)
                .map(|age| age > self.expire_in)
                .unwrap_or(false);
            if !expired {
                continue;
            }

            match fs::remove_dir_all(&path).await {
                Ok(()) => {
                    stats.removed += 1;
                    tracing::debug!(
                        path = %path.display(),
                        modified = %DateTime::<Utc>::from(modified).to_rfc3339(),
                        "Removed expired fragment directory"
                    );
                }
                // Removed concurrently by another sweep.
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove expired fragments");
                    stats.failed += 1;
                }
            }
        }

        if stats.removed > 0 || stats.failed > 0 {
            let cutoff = now
                .checked_sub(self.expire_in)
                .unwrap_or(SystemTime::UNIX_EPOCH);
            tracing::info!(
                scanned = stats.scanned,
                removed = stats.removed,
                failed = stats.failed,
                cutoff = %DateTime::<Utc>::from(cutoff).to_rfc3339(),
                "Chunk cleanup finished"
            );
        }

        stats
    }

    /// Sweep on a fixed interval, independent of request volume.
    pub fn spawn_periodic(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; skip it so startup stays quiet.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.sweep().await;
            }
        })
    }
}
