//! File-backed Store implementation

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;
use tokio::sync::{Mutex, mpsc};

use super::memory::MemoryStore;
use super::{Store, StoreError};

/// How long mutations are coalesced before the file is rewritten
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(250);

/// Key-value store mirrored to a single JSON file.
///
/// Reads and writes are served from memory. Mutations mark the store dirty
/// and a background task rewrites the file at most once per flush interval,
/// through a temporary sibling and a rename. Dropping the store flushes what
/// is left.
pub struct JsonFileStore {
    shared: Arc<Shared>,
    flush_tx: mpsc::Sender<()>,
}

struct Shared {
    entries: MemoryStore,
    file_path: PathBuf,
    write_lock: Mutex<()>,
    dirty: AtomicBool,
}

impl JsonFileStore {
    /// Load the store from file or create an empty one
    pub async fn load(file_path: &Path) -> Result<Self, StoreError> {
        Self::load_with_interval(file_path, DEFAULT_FLUSH_INTERVAL).await
    }

    /// Like [`Self::load`] with a custom flush interval.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn load_with_interval(
        file_path: &Path,
        flush_interval: Duration,
    ) -> Result<Self, StoreError> {
        let entries = if fs::try_exists(file_path).await? {
            let content = fs::read_to_string(file_path).await?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str::<BTreeMap<String, Value>>(&content).map_err(|e| {
                    StoreError::Serialization(format!(
                        "failed to parse {}: {}",
                        file_path.display(),
                        e
                    ))
                })?
            }
        } else {
            BTreeMap::new()
        };

        tracing::debug!(path = %file_path.display(), entries = entries.len(), "Loaded state file");

        let shared = Arc::new(Shared {
            entries: MemoryStore::from_entries(entries),
            file_path: file_path.to_path_buf(),
            write_lock: Mutex::new(()),
            dirty: AtomicBool::new(false),
        });
        let (flush_tx, flush_rx) = mpsc::channel(1);
        tokio::spawn(flush_loop(shared.clone(), flush_rx, flush_interval));

        Ok(Self { shared, flush_tx })
    }

    pub fn path(&self) -> &Path {
        &self.shared.file_path
    }

    /// Whether mutations are waiting to be written
    pub fn is_dirty(&self) -> bool {
        self.shared.dirty.load(Ordering::SeqCst)
    }

    fn mark_dirty(&self) {
        self.shared.dirty.store(true, Ordering::SeqCst);
        // a full channel already has a flush pending
        let _ = self.flush_tx.try_send(());
    }
}

impl Shared {
    /// Write the current entries to file if anything changed
    async fn persist(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let result = self.write_file().await;
        if result.is_err() {
            self.dirty.store(true, Ordering::SeqCst);
        }
        result
    }

    async fn write_file(&self) -> Result<(), StoreError> {
        let snapshot = self.entries.snapshot().await;

        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let tmp_path = self.file_path.with_extension("json.tmp");
        fs::write(&tmp_path, content).await?;
        fs::rename(&tmp_path, &self.file_path).await?;
        tracing::trace!(path = %self.file_path.display(), entries = snapshot.len(), "State file written");
        Ok(())
    }
}

/// Coalesce mutation signals into one file write per interval
async fn flush_loop(shared: Arc<Shared>, mut rx: mpsc::Receiver<()>, interval: Duration) {
    while rx.recv().await.is_some() {
        tokio::time::sleep(interval).await;
        while rx.try_recv().is_ok() {}
        if let Err(e) = shared.persist().await {
            tracing::warn!(path = %shared.file_path.display(), error = %e, "Failed to write state file");
        }
    }
    // store dropped
    if let Err(e) = shared.persist().await {
        tracing::warn!(path = %shared.file_path.display(), error = %e, "Failed to write state file on close");
    }
}

#[async_trait]
impl Store for JsonFileStore {
    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.shared.entries.put(key, value).await?;
        self.mark_dirty();
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        self.shared.entries.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let removed = self.shared.entries.delete(key).await?;
        if removed {
            self.mark_dirty();
        }
        Ok(removed)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<(String, Value)>, StoreError> {
        self.shared.entries.list(prefix).await
    }

    async fn flush(&self) -> Result<(), StoreError> {
        self.shared.persist().await
    }
}
