//! # Side-Car Metadata Store
//!
//! Proxmox LXC has no Docker-style label concept, so the backend keeps an
//! out-of-band table mapping each VMID to its label map, persisted as one
//! JSON document:
//!
//! ```text
//! /var/lib/skiff/proxmox/
//! └── containers.json      {"204": {"skiff-name": "gitea", "env": "prod"}, ...}
//! ```
//!
//! ## Persistence Model
//!
//! The document is loaded wholesale at connect and rewritten wholesale on
//! change. A missing file is the expected first-run state, not an error.
//! No format version is defined; a schema change means discarding the
//! file.
//!
//! Mutations apply under an exclusive lock and then enqueue a snapshot of
//! the whole table to a dedicated writer task. The writer drains its queue
//! in order, coalescing to the newest pending snapshot, so there is at most
//! one in-flight flush and the file never travels backwards in time. A
//! crash between a mutation and its flush can still lose that mutation -
//! callers needing durability rely on the synchronous [`MetadataStore::save`]
//! performed at close.
//!
//! Flush failures are logged and never abort the lifecycle operation that
//! triggered the write: correctness of the live call is never sacrificed
//! for metadata durability.
//!
//! ## Concurrency
//!
//! One read-write lock guards the table. Readers receive owned copies,
//! never references into the live table. Lookups are linear scans, which
//! is fine while the table is bounded by the VMID range.

use crate::constants::{METADATA_FILE, NAME_LABEL};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// The on-disk table shape: VMID to label map.
type LabelTable = HashMap<u32, HashMap<String, String>>;

/// Durable VMID-to-labels table with a queued background flush.
///
/// Owned by, and living exactly as long as, one backend instance: loaded
/// at connect, flushed asynchronously after each mutation, flushed
/// synchronously at close.
pub struct MetadataStore {
    dir: PathBuf,
    table: RwLock<LabelTable>,
    flush_tx: Mutex<Option<mpsc::UnboundedSender<LabelTable>>>,
}

impl MetadataStore {
    /// Creates a store rooted at `dir`. Nothing is read until
    /// [`load`](Self::load).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            table: RwLock::new(HashMap::new()),
            flush_tx: Mutex::new(None),
        }
    }

    /// Returns the path of the backing document.
    pub fn document_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    /// Loads the table from disk and starts the flush writer.
    ///
    /// Ensures the backing directory exists. A missing document is the
    /// first-run state and initializes an empty table. Safe to call again
    /// on reconnect; the previous writer task winds down with its queue.
    pub async fn load(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| Error::MetadataLoad {
            path: self.dir.clone(),
            reason: e.to_string(),
        })?;

        let path = self.document_path();
        let loaded: LabelTable = if path.exists() {
            let raw = fs::read(&path).map_err(|e| Error::MetadataLoad {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            serde_json::from_slice(&raw).map_err(|e| Error::MetadataLoad {
                path: path.clone(),
                reason: e.to_string(),
            })?
        } else {
            HashMap::new()
        };

        let entries = loaded.len();
        *self.write_table()? = loaded;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(flush_writer(path, rx));
        *self
            .flush_tx
            .lock()
            .map_err(|e| Error::Internal(format!("lock poisoned: {}", e)))? = Some(tx);

        info!("Loaded metadata for {} containers from {}", entries, self.dir.display());
        Ok(())
    }

    /// Synchronous, blocking flush of the current table.
    ///
    /// The durability point: called at close, after which the document
    /// reflects every mutation made through this store.
    pub fn save(&self) -> Result<()> {
        let snapshot = self.read_table()?.clone();
        write_document(&self.document_path(), &snapshot)
    }

    // =========================================================================
    // Mutating Accessors
    // =========================================================================

    /// Replaces all labels for a VMID.
    pub fn set(&self, vmid: u32, labels: HashMap<String, String>) -> Result<()> {
        let snapshot = {
            let mut table = self.write_table()?;
            table.insert(vmid, labels);
            table.clone()
        };
        self.schedule_flush(snapshot);
        Ok(())
    }

    /// Sets one label for a VMID, creating its record if absent.
    pub fn set_label(&self, vmid: u32, key: &str, value: &str) -> Result<()> {
        let snapshot = {
            let mut table = self.write_table()?;
            table
                .entry(vmid)
                .or_default()
                .insert(key.to_string(), value.to_string());
            table.clone()
        };
        self.schedule_flush(snapshot);
        Ok(())
    }

    /// Deletes all labels for a VMID.
    pub fn delete(&self, vmid: u32) -> Result<()> {
        let snapshot = {
            let mut table = self.write_table()?;
            table.remove(&vmid);
            table.clone()
        };
        self.schedule_flush(snapshot);
        Ok(())
    }

    // =========================================================================
    // Read Accessors
    // =========================================================================
    //
    // All readers return owned values, so callers can never observe or
    // race an in-progress mutation through a retained reference.
    // =========================================================================

    /// Returns a copy of all labels for a VMID.
    pub fn get(&self, vmid: u32) -> Result<Option<HashMap<String, String>>> {
        Ok(self.read_table()?.get(&vmid).cloned())
    }

    /// Returns one label value for a VMID.
    pub fn get_label(&self, vmid: u32, key: &str) -> Result<Option<String>> {
        Ok(self
            .read_table()?
            .get(&vmid)
            .and_then(|labels| labels.get(key))
            .cloned())
    }

    /// Returns whether a VMID carries the given label key.
    pub fn has_label(&self, vmid: u32, key: &str) -> Result<bool> {
        Ok(self
            .read_table()?
            .get(&vmid)
            .is_some_and(|labels| labels.contains_key(key)))
    }

    /// Returns every VMID whose labels contain `key` with value `value`.
    pub fn find_by_label(&self, key: &str, value: &str) -> Result<Vec<u32>> {
        Ok(self
            .read_table()?
            .iter()
            .filter(|(_, labels)| labels.get(key).is_some_and(|v| v == value))
            .map(|(vmid, _)| *vmid)
            .collect())
    }

    /// Returns the VMID carrying `name` as its synthesized name label.
    pub fn find_by_name(&self, name: &str) -> Result<Option<u32>> {
        Ok(self.find_by_label(NAME_LABEL, name)?.into_iter().next())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn read_table(&self) -> Result<std::sync::RwLockReadGuard<'_, LabelTable>> {
        self.table
            .read()
            .map_err(|e| Error::Internal(format!("lock poisoned: {}", e)))
    }

    fn write_table(&self) -> Result<std::sync::RwLockWriteGuard<'_, LabelTable>> {
        self.table
            .write()
            .map_err(|e| Error::Internal(format!("lock poisoned: {}", e)))
    }

    /// Hands a snapshot to the writer task.
    ///
    /// A missing writer (mutation before `load`, or a wound-down task) is
    /// downgraded to a debug note; the mutation itself already succeeded.
    fn schedule_flush(&self, snapshot: LabelTable) {
        let guard = match self.flush_tx.lock() {
            Ok(guard) => guard,
            Err(e) => {
                warn!("Metadata flush skipped, lock poisoned: {}", e);
                return;
            }
        };
        match guard.as_ref() {
            Some(tx) => {
                if tx.send(snapshot).is_err() {
                    warn!("Metadata flush writer is gone; change persists at close");
                }
            }
            None => debug!("Metadata flush skipped, store not loaded yet"),
        }
    }
}

/// Single-consumer flush loop.
///
/// Snapshots arrive in mutation order; draining to the newest pending one
/// keeps at most one write in flight without ever persisting stale state.
async fn flush_writer(path: PathBuf, mut rx: mpsc::UnboundedReceiver<LabelTable>) {
    while let Some(mut snapshot) = rx.recv().await {
        while let Ok(newer) = rx.try_recv() {
            snapshot = newer;
        }

        let target = path.clone();
        let outcome =
            tokio::task::spawn_blocking(move || write_document(&target, &snapshot)).await;
        match outcome {
            Ok(Ok(())) => debug!("Flushed metadata to {}", path.display()),
            Ok(Err(e)) => warn!("Failed to flush metadata: {}", e),
            Err(e) => warn!("Metadata flush task failed: {}", e),
        }
    }
}

/// Writes the document atomically: unique temp file, then rename.
fn write_document(path: &Path, table: &LabelTable) -> Result<()> {
    let data = serde_json::to_vec_pretty(table).map_err(|e| Error::MetadataSave {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let temp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::now_v7()));
    fs::write(&temp_path, data).map_err(|e| Error::MetadataSave {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        Error::MetadataSave {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    })
}

// =============================================================================
// Name Index
// =============================================================================

/// Bidirectional name-to-VMID cache.
///
/// Bijective by construction: inserting a mapping evicts whatever either
/// side previously pointed at. Populated explicitly by callers that
/// register a name - it is never rebuilt from the metadata table.
#[derive(Debug, Default)]
pub struct NameIndex {
    inner: RwLock<NameIndexInner>,
}

#[derive(Debug, Default)]
struct NameIndexInner {
    by_name: HashMap<String, u32>,
    by_id: HashMap<u32, String>,
}

impl NameIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a name-to-VMID mapping, evicting stale counterparts.
    pub fn insert(&self, name: &str, vmid: u32) {
        let mut inner = match self.inner.write() {
            Ok(inner) => inner,
            Err(e) => e.into_inner(),
        };
        if let Some(old_name) = inner.by_id.remove(&vmid) {
            inner.by_name.remove(&old_name);
        }
        if let Some(old_id) = inner.by_name.remove(name) {
            inner.by_id.remove(&old_id);
        }
        inner.by_name.insert(name.to_string(), vmid);
        inner.by_id.insert(vmid, name.to_string());
    }

    /// Resolves a name to its VMID.
    pub fn id_for(&self, name: &str) -> Option<u32> {
        match self.inner.read() {
            Ok(inner) => inner.by_name.get(name).copied(),
            Err(e) => e.into_inner().by_name.get(name).copied(),
        }
    }

    /// Resolves a VMID to its registered name.
    pub fn name_for(&self, vmid: u32) -> Option<String> {
        match self.inner.read() {
            Ok(inner) => inner.by_id.get(&vmid).cloned(),
            Err(e) => e.into_inner().by_id.get(&vmid).cloned(),
        }
    }

    /// Removes the mapping for a VMID, if any.
    pub fn remove(&self, vmid: u32) {
        let mut inner = match self.inner.write() {
            Ok(inner) => inner,
            Err(e) => e.into_inner(),
        };
        if let Some(name) = inner.by_id.remove(&vmid) {
            inner.by_name.remove(&name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_missing_document_is_first_run() {
        let temp = TempDir::new().unwrap();
        let store = MetadataStore::new(temp.path().join("meta"));

        store.load().await.unwrap();

        assert!(store.get(100).unwrap().is_none());
        assert!(temp.path().join("meta").exists());
    }

    #[tokio::test]
    async fn test_save_then_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = MetadataStore::new(temp.path());
        store.load().await.unwrap();
        store.set_label(7, "env", "prod").unwrap();
        store.save().unwrap();

        let fresh = MetadataStore::new(temp.path());
        fresh.load().await.unwrap();
        assert_eq!(fresh.get_label(7, "env").unwrap().as_deref(), Some("prod"));
    }

    #[test]
    fn test_get_returns_defensive_copy() {
        let store = MetadataStore::new("/nonexistent");
        store.set_label(3, "tier", "web").unwrap();

        let mut copy = store.get(3).unwrap().unwrap();
        copy.insert("tier".into(), "mutated".into());

        assert_eq!(store.get_label(3, "tier").unwrap().as_deref(), Some("web"));
    }

    #[test]
    fn test_find_by_name_uses_name_label() {
        let store = MetadataStore::new("/nonexistent");
        store.set_label(42, NAME_LABEL, "gitea").unwrap();
        store.set_label(42, "env", "prod").unwrap();

        assert_eq!(store.find_by_name("gitea").unwrap(), Some(42));
        assert_eq!(store.find_by_name("missing").unwrap(), None);
        assert_eq!(store.find_by_label("env", "prod").unwrap(), vec![42]);
    }

    #[test]
    fn test_name_index_is_bijective() {
        let index = NameIndex::new();
        index.insert("web", 100);
        index.insert("db", 101);

        // Re-pointing the name evicts the old id, and vice versa.
        index.insert("web", 102);
        assert_eq!(index.id_for("web"), Some(102));
        assert_eq!(index.name_for(100), None);

        index.insert("web-old", 102);
        assert_eq!(index.name_for(102).as_deref(), Some("web-old"));
        assert_eq!(index.id_for("web"), None);

        index.remove(101);
        assert_eq!(index.id_for("db"), None);
    }
}
