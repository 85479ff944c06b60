//! Arena of open file handles keyed by [`FileId`].
//!
//! The map itself is behind a `tokio::sync::Mutex` held only for
//! insert/lookup/remove. Each entry owns its handle behind a second mutex,
//! so operations on one id are serialized while different ids never contend.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::resource::{File, FileId};

/// Mode a file was opened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Created or truncated, readable and writable.
    Write,
    Read,
    Append,
}

/// A registered file together with its native handle.
pub struct OpenFile {
    file: File,
    mode: OpenMode,
    handle: Mutex<tokio::fs::File>,
}

impl OpenFile {
    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Exclusive access to the handle for the duration of one operation.
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, tokio::fs::File> {
        self.handle.lock().await
    }
}

/// Registry of every currently open file on one driver instance.
pub struct HandleRegistry {
    entries: Mutex<HashMap<FileId, Arc<OpenFile>>>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Register `handle` for `file`.
    ///
    /// Re-opening an id that is already open replaces the old entry; its
    /// handle is released once the last in-flight operation drops it.
    pub async fn insert(&self, file: File, mode: OpenMode, handle: tokio::fs::File) -> Arc<OpenFile> {
        let id = file.id();
        let entry = Arc::new(OpenFile {
            file,
            mode,
            handle: Mutex::new(handle),
        });
        let mut entries = self.entries.lock().await;
        if entries.insert(id, entry.clone()).is_some() {
            debug!("File {} re-opened, replacing previous handle", id);
        }
        entry
    }

    pub async fn get(&self, id: FileId) -> Option<Arc<OpenFile>> {
        let entries = self.entries.lock().await;
        entries.get(&id).cloned()
    }

    pub async fn contains(&self, id: FileId) -> bool {
        let entries = self.entries.lock().await;
        entries.contains_key(&id)
    }

    /// Remove an entry, returning it if it was registered.
    pub async fn remove(&self, id: FileId) -> Option<Arc<OpenFile>> {
        let mut entries = self.entries.lock().await;
        entries.remove(&id)
    }

    /// Remove `id` and release its handle after flushing pending writes.
    ///
    /// The entry leaves the registry before the flush, so a failed flush
    /// never leaves a stale entry behind. Closing an id that is not open is
    /// a no-op.
    pub async fn close(&self, id: FileId) -> std::io::Result<()> {
        let Some(entry) = self.remove(id).await else {
            debug!("Close of file {} ignored, not open", id);
            return Ok(());
        };
        let mut handle = entry.lock().await;
        let result = handle.flush().await;
        if let Err(e) = &result {
            warn!("Flush failed while closing file {}: {}", id, e);
        }
        result
    }

    /// Close every open file. Used on shutdown.
    pub async fn close_all(&self) {
        let drained: Vec<Arc<OpenFile>> = {
            let mut entries = self.entries.lock().await;
            entries.drain().map(|(_, v)| v).collect()
        };
        for entry in drained {
            let mut handle = entry.lock().await;
            if let Err(e) = handle.flush().await {
                warn!("Flush failed while closing file {}: {}", entry.file.id(), e);
            }
        }
    }

    pub async fn len(&self) -> usize {
        let entries = self.entries.lock().await;
        entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
