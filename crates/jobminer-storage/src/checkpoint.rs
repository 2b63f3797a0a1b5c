//! Durable checkpoint documents plus a single-runner lease per source.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobminer_core::CheckpointState;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint io on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("checkpoint document for {source_id} is unreadable: {error}")]
    Corrupt {
        source_id: String,
        #[source]
        error: serde_json::Error,
    },
    #[error("another run holds the lease for {source_id}")]
    LeaseHeld { source_id: String },
    #[error("lease for {source_id} was taken over by another run")]
    LeaseLost { source_id: String },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CheckpointError + '_ {
    move |source| CheckpointError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self, source: &str) -> Result<Option<CheckpointState>, CheckpointError>;

    async fn save(&self, state: &CheckpointState) -> Result<(), CheckpointError>;

    /// Forgets all progress for `source`. Returns whether anything was stored.
    async fn reset(&self, source: &str) -> Result<bool, CheckpointError>;

    async fn acquire_lease(&self, source: &str) -> Result<Lease, CheckpointError>;

    /// Pushes the lease's expiry forward. Fails with `LeaseLost` once another
    /// run has taken it over.
    async fn renew_lease(&self, lease: &Lease) -> Result<(), CheckpointError>;
}

/// Exclusive right to advance one source's checkpoint. Released on drop.
#[derive(Debug)]
pub struct Lease {
    source: String,
    acquired_at: DateTime<Utc>,
    release: LeaseRelease,
}

#[derive(Debug)]
enum LeaseRelease {
    File { path: PathBuf, holder: String },
    Memory(Arc<StdMutex<HashSet<String>>>),
}

impl Lease {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        match &self.release {
            LeaseRelease::File { path, holder } => {
                if !lease_file_holder(path).is_some_and(|current| current == *holder) {
                    debug!(path = %path.display(), "lease no longer ours; leaving file in place");
                    return;
                }
                if let Err(err) = std::fs::remove_file(path) {
                    if err.kind() != std::io::ErrorKind::NotFound {
                        warn!(path = %path.display(), error = %err, "failed to release lease file");
                    }
                }
            }
            LeaseRelease::Memory(held) => {
                if let Ok(mut held) = held.lock() {
                    held.remove(&self.source);
                }
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LeaseRecord {
    holder: String,
    pid: u32,
    acquired_at: DateTime<Utc>,
    #[serde(default)]
    renewed_at: Option<DateTime<Utc>>,
}

/// Holder token currently written in a lease file, if it is readable.
fn lease_file_holder(path: &Path) -> Option<String> {
    let bytes = std::fs::read(path).ok()?;
    serde_json::from_slice::<LeaseRecord>(&bytes)
        .ok()
        .map(|record| record.holder)
}

/// One JSON document per source under a state directory.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    root: PathBuf,
    lease_ttl: Duration,
}

impl FileCheckpointStore {
    pub fn new(root: impl Into<PathBuf>, lease_ttl: Duration) -> Self {
        Self {
            root: root.into(),
            lease_ttl,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_stem(source: &str) -> String {
        source
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect()
    }

    pub fn checkpoint_path(&self, source: &str) -> PathBuf {
        self.root
            .join(format!("{}.checkpoint.json", Self::file_stem(source)))
    }

    pub fn lease_path(&self, source: &str) -> PathBuf {
        self.root.join(format!("{}.lock", Self::file_stem(source)))
    }

    async fn ensure_root(&self) -> Result<(), CheckpointError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(io_error(&self.root))
    }

    async fn lease_is_stale(&self, path: &Path) -> bool {
        let modified = match fs::metadata(path).await.and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(_) => return true,
        };
        SystemTime::now()
            .duration_since(modified)
            .map(|age| age > self.lease_ttl)
            .unwrap_or(false)
    }

    async fn try_create_lease(&self, path: &Path, record: &LeaseRecord) -> std::io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(path)
            .await?;
        let bytes = serde_json::to_vec(record).map_err(std::io::Error::other)?;
        file.write_all(&bytes).await?;
        file.flush().await
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self, source: &str) -> Result<Option<CheckpointState>, CheckpointError> {
        let path = self.checkpoint_path(source);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_error(&path)(err)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|error| CheckpointError::Corrupt {
                source_id: source.to_string(),
                error,
            })
    }

    /// Writes to a temp file in the same directory, then renames over the
    /// previous document so readers never see a partial checkpoint.
    async fn save(&self, state: &CheckpointState) -> Result<(), CheckpointError> {
        self.ensure_root().await?;
        let path = self.checkpoint_path(&state.source);
        let bytes = serde_json::to_vec_pretty(state).map_err(|error| CheckpointError::Corrupt {
            source_id: state.source.clone(),
            error,
        })?;

        let temp_path = self.root.join(format!(".{}.tmp", Uuid::new_v4()));
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .map_err(io_error(&temp_path))?;
        file.write_all(&bytes).await.map_err(io_error(&temp_path))?;
        file.sync_all().await.map_err(io_error(&temp_path))?;
        drop(file);

        if let Err(err) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(io_error(&path)(err));
        }
        debug!(source = %state.source, page = ?state.last_page_index, "checkpoint saved");
        Ok(())
    }

    async fn reset(&self, source: &str) -> Result<bool, CheckpointError> {
        let path = self.checkpoint_path(source);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(io_error(&path)(err)),
        }
    }

    async fn acquire_lease(&self, source: &str) -> Result<Lease, CheckpointError> {
        self.ensure_root().await?;
        let path = self.lease_path(source);
        let acquired_at = Utc::now();
        let record = LeaseRecord {
            holder: Uuid::new_v4().to_string(),
            pid: std::process::id(),
            acquired_at,
            renewed_at: None,
        };

        for attempt in 0..2 {
            match self.try_create_lease(&path, &record).await {
                Ok(()) => {
                    debug!(source, path = %path.display(), "lease acquired");
                    return Ok(Lease {
                        source: source.to_string(),
                        acquired_at,
                        release: LeaseRelease::File {
                            path,
                            holder: record.holder.clone(),
                        },
                    });
                }
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    if attempt == 0 && self.lease_is_stale(&path).await {
                        warn!(source, path = %path.display(), "taking over stale lease");
                        let _ = fs::remove_file(&path).await;
                        continue;
                    }
                    return Err(CheckpointError::LeaseHeld {
                        source_id: source.to_string(),
                    });
                }
                Err(err) => return Err(io_error(&path)(err)),
            }
        }
        Err(CheckpointError::LeaseHeld {
            source_id: source.to_string(),
        })
    }

    /// Rewrites the lease file, which also refreshes the mtime used for the
    /// staleness check.
    async fn renew_lease(&self, lease: &Lease) -> Result<(), CheckpointError> {
        let LeaseRelease::File { path, holder } = &lease.release else {
            return Err(CheckpointError::LeaseLost {
                source_id: lease.source.clone(),
            });
        };
        let lost = || CheckpointError::LeaseLost {
            source_id: lease.source.clone(),
        };
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Err(lost()),
            Err(err) => return Err(io_error(path)(err)),
        };
        let mut record: LeaseRecord = serde_json::from_slice(&bytes).map_err(|_| lost())?;
        if record.holder != *holder {
            return Err(lost());
        }
        record.renewed_at = Some(Utc::now());
        let bytes = serde_json::to_vec(&record).map_err(|error| CheckpointError::Corrupt {
            source_id: lease.source.clone(),
            error,
        })?;
        fs::write(path, bytes).await.map_err(io_error(path))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointStore {
    states: Arc<Mutex<HashMap<String, CheckpointState>>>,
    saves: Arc<Mutex<usize>>,
    leases: Arc<StdMutex<HashSet<String>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `save` calls, across all sources.
    pub async fn save_count(&self) -> usize {
        *self.saves.lock().await
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, source: &str) -> Result<Option<CheckpointState>, CheckpointError> {
        Ok(self.states.lock().await.get(source).cloned())
    }

    async fn save(&self, state: &CheckpointState) -> Result<(), CheckpointError> {
        self.states
            .lock()
            .await
            .insert(state.source.clone(), state.clone());
        *self.saves.lock().await += 1;
        Ok(())
    }

    async fn reset(&self, source: &str) -> Result<bool, CheckpointError> {
        Ok(self.states.lock().await.remove(source).is_some())
    }

    async fn acquire_lease(&self, source: &str) -> Result<Lease, CheckpointError> {
        let inserted = self
            .leases
            .lock()
            .map(|mut held| held.insert(source.to_string()))
            .unwrap_or(false);
        if !inserted {
            return Err(CheckpointError::LeaseHeld {
                source_id: source.to_string(),
            });
        }
        Ok(Lease {
            source: source.to_string(),
            acquired_at: Utc::now(),
            release: LeaseRelease::Memory(Arc::clone(&self.leases)),
        })
    }

    async fn renew_lease(&self, lease: &Lease) -> Result<(), CheckpointError> {
        let held = self
            .leases
            .lock()
            .map(|held| held.contains(&lease.source))
            .unwrap_or(false);
        if held {
            Ok(())
        } else {
            Err(CheckpointError::LeaseLost {
                source_id: lease.source.clone(),
            })
        }
    }
}
