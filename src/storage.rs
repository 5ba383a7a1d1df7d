use crate::config::StorageConfig;
use std::{
    io,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};
use tokio::{sync::broadcast, time::interval};

pub fn ensure_dirs(storage_cfg: &StorageConfig) -> io::Result<()> {
    for dir in [&storage_cfg.upload_dir, &storage_cfg.output_dir] {
        std::fs::create_dir_all(dir)?;
        tracing::debug!("Storage directory ready: {:?}", dir);
    }
    Ok(())
}

/// Deletes regular files in `dir` last modified more than `max_age` before
/// `now`. Returns how many files were removed. Entries that cannot be
/// inspected or removed are logged and skipped.
pub fn purge_expired(dir: &Path, max_age: Duration, now: SystemTime) -> io::Result<usize> {
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry in {:?}: {}", dir, e);
                continue;
            }
        };
        let path = entry.path();
        let modified = match entry.metadata().and_then(|metadata| {
            if metadata.is_file() {
                metadata.modified().map(Some)
            } else {
                Ok(None)
            }
        }) {
            Ok(Some(modified)) => modified,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!("Skipping {:?}: {}", path, e);
                continue;
            }
        };

        let age = now.duration_since(modified).unwrap_or_default();
        if age > max_age {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Failed to remove {:?}: {}", path, e),
            }
        }
    }
    Ok(removed)
}

#[derive(Debug, Clone)]
pub struct StoragePurger {
    dirs: Vec<PathBuf>,
    retention: Duration,
    purge_interval: Duration,
}

impl StoragePurger {
    pub fn new(storage_cfg: &StorageConfig) -> Self {
        Self {
            dirs: vec![
                storage_cfg.upload_dir.clone(),
                storage_cfg.output_dir.clone(),
            ],
            retention: Duration::from_secs(storage_cfg.retention_secs),
            purge_interval: Duration::from_secs(storage_cfg.purge_interval_secs.max(1)),
        }
    }

    pub fn purge_once(&self) -> usize {
        let now = SystemTime::now();
        self.dirs
            .iter()
            .map(|dir| match purge_expired(dir, self.retention, now) {
                Ok(removed) => removed,
                Err(e) => {
                    tracing::error!("Failed to purge {:?}: {}", dir, e);
                    0
                }
            })
            .sum()
    }

    pub fn spawn(
        self,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Option<tokio::task::JoinHandle<()>> {
        if self.retention.is_zero() {
            tracing::info!("Storage retention disabled");
            return None;
        }

        Some(tokio::spawn(async move {
            let mut ticker = interval(self.purge_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let purger = self.clone();
                        let removed = tokio::task::spawn_blocking(move || purger.purge_once())
                            .await
                            .unwrap_or_default();
                        if removed > 0 {
                            tracing::info!("Purged {} expired files", removed);
                        }
                    },
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Storage purger received shutdown signal");
                        break;
                    }
                }
            }
        }))
    }
}
