//! Incremental index store
//!
//! Single-writer, many-reader. A writer holds a [`CommitBatch`], which owns
//! `write_lock` for its lifetime. Every file is persisted through the backend
//! before it touches the batch's working copy; call edges are relinked and
//! the working copy published as the new snapshot only when the batch
//! publishes. Readers take an `Arc` to whatever snapshot is current and never
//! block on a commit in progress.

use super::{FileRecord, FileShard, IndexBackend, IndexMetadata, ProjectIndex};
use crate::symbol::Symbol;
use crate::types::SymbolId;
use crate::{IndexError, IndexResult};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

pub struct IndexStore {
    backend: Arc<dyn IndexBackend>,
    snapshot: RwLock<Arc<ProjectIndex>>,
    write_lock: Mutex<()>,
    /// Bumped on every published snapshot
    generation: AtomicU64,
}

impl IndexStore {
    /// Load every persisted shard for `project_root` and link call edges
    pub fn open(project_root: &Path, backend: Arc<dyn IndexBackend>) -> IndexResult<Self> {
        let shards = backend.load_all()?;
        let mut index = ProjectIndex::new(project_root);
        let file_count = shards.len();
        for FileShard { record, symbols } in shards {
            index.replace_file(record, symbols);
        }
        index.relink_calls();

        if file_count > 0 {
            info!(
                files = file_count,
                symbols = index.symbol_count(),
                "loaded existing index"
            );
        }

        Ok(Self {
            backend,
            snapshot: RwLock::new(Arc::new(index)),
            write_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        })
    }

    /// Current committed state
    pub fn snapshot(&self) -> Arc<ProjectIndex> {
        self.snapshot.read().clone()
    }

    /// Number of snapshots published since the store was opened
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Start a batch of commits. Blocks while another batch is open.
    pub fn begin(&self) -> CommitBatch<'_> {
        let guard = self.write_lock.lock();
        CommitBatch {
            store: self,
            working: self.snapshot(),
            pending: 0,
            _guard: guard,
        }
    }

    /// Replace one file's record and symbols as a single unit.
    ///
    /// On failure the previously committed state of the file is kept.
    pub fn commit_file(&self, record: FileRecord, symbols: Vec<Symbol>) -> IndexResult<Vec<SymbolId>> {
        let mut batch = self.begin();
        let removed = batch.commit_file(record, symbols)?;
        batch.finish();
        Ok(removed)
    }

    /// Flag a file whose providers all failed. Its previous symbols stay
    /// visible. Returns `false` when the file was never indexed.
    pub fn mark_stale(&self, path: &str) -> IndexResult<bool> {
        let mut batch = self.begin();
        let known = batch.mark_stale(path)?;
        batch.finish();
        Ok(known)
    }

    /// Remove a file and all symbols it owns. Returns the purged ids.
    pub fn purge_file(&self, path: &str) -> IndexResult<Vec<SymbolId>> {
        let mut batch = self.begin();
        let ids = batch.purge_file(path)?;
        batch.finish();
        Ok(ids)
    }

    /// Record counts and the sweep time
    pub fn save_metadata(&self) -> IndexResult<()> {
        let index = self.snapshot();
        let mut metadata = IndexMetadata::new(index.project_root());
        metadata.update_counts(index.symbol_count() as u32, index.file_count() as u32);
        self.backend.put_metadata(&metadata)
    }

    pub fn metadata(&self) -> IndexResult<Option<IndexMetadata>> {
        self.backend.load_metadata()
    }

    fn persist(&self, record: &FileRecord, symbols: &[Symbol]) -> IndexResult<()> {
        self.backend
            .put_file(record, symbols)
            .map_err(|e| IndexError::CommitFailure {
                path: record.path.clone(),
                reason: e.to_string(),
            })
    }
}

/// Pending changes on top of the last published snapshot.
///
/// Dropping the batch publishes whatever is pending, so a cancelled sweep
/// still exposes the files it committed.
pub struct CommitBatch<'a> {
    store: &'a IndexStore,
    working: Arc<ProjectIndex>,
    pending: usize,
    _guard: MutexGuard<'a, ()>,
}

impl CommitBatch<'_> {
    /// Published state plus everything staged so far
    pub fn working(&self) -> Arc<ProjectIndex> {
        self.working.clone()
    }

    /// Files changed since the last publish
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Persist one file and stage it. On failure nothing is staged.
    pub fn commit_file(&mut self, mut record: FileRecord, symbols: Vec<Symbol>) -> IndexResult<Vec<SymbolId>> {
        record.symbol_ids = symbols.iter().map(|s| s.id).collect();
        self.store.persist(&record, &symbols)?;

        let path = record.path.clone();
        let removed = Arc::make_mut(&mut self.working).replace_file(record, symbols);
        self.pending += 1;
        debug!(file = %path, removed = removed.len(), "committed file");
        Ok(removed)
    }

    pub fn mark_stale(&mut self, path: &str) -> IndexResult<bool> {
        let mut record = match self.working.file(path) {
            None => return Ok(false),
            Some(record) if record.stale => return Ok(true),
            Some(record) => record.clone(),
        };
        record.stale = true;
        let symbols: Vec<Symbol> = self.working.file_symbols(path).into_iter().cloned().collect();
        self.store.persist(&record, &symbols)?;

        Arc::make_mut(&mut self.working).set_stale(path, true);
        self.pending += 1;
        warn!(file = path, "every provider failed; keeping previous symbols and marking stale");
        Ok(true)
    }

    pub fn purge_file(&mut self, path: &str) -> IndexResult<Vec<SymbolId>> {
        if self.working.file(path).is_none() {
            return Ok(Vec::new());
        }
        self.store
            .backend
            .delete_file(path)
            .map_err(|e| IndexError::CommitFailure {
                path: path.to_string(),
                reason: e.to_string(),
            })?;

        let ids = Arc::make_mut(&mut self.working)
            .remove_file(path)
            .map(|(_, ids)| ids)
            .unwrap_or_default();
        self.pending += 1;
        debug!(file = path, symbols = ids.len(), "purged file");
        Ok(ids)
    }

    /// Relink call edges and swap the working copy in as the snapshot.
    /// No-op when nothing changed since the last publish.
    pub fn publish(&mut self) {
        if self.pending == 0 {
            return;
        }
        Arc::make_mut(&mut self.working).relink_calls();
        *self.store.snapshot.write() = self.working.clone();
        let generation = self.store.generation.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(files = self.pending, generation, "published snapshot");
        self.pending = 0;
    }

    pub fn finish(mut self) {
        self.publish();
    }
}

impl Drop for CommitBatch<'_> {
    fn drop(&mut self) {
        self.publish();
    }
}

impl std::fmt::Debug for IndexStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let index = self.snapshot();
        f.debug_struct("IndexStore")
            .field("files", &index.file_count())
            .field("symbols", &index.symbol_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{DiskBackend, MemoryBackend};
    use crate::merge::CallRef;
    use crate::types::{Span, SymbolKind};
    use tempfile::TempDir;

    struct FailingBackend;

    impl IndexBackend for FailingBackend {
        fn load_all(&self) -> IndexResult<Vec<FileShard>> {
            Ok(Vec::new())
        }
        fn put_file(&self, _: &FileRecord, _: &[Symbol]) -> IndexResult<()> {
            Err(IndexError::General("disk full".into()))
        }
        fn delete_file(&self, _: &str) -> IndexResult<()> {
            Err(IndexError::General("read-only".into()))
        }
        fn put_metadata(&self, _: &IndexMetadata) -> IndexResult<()> {
            Ok(())
        }
        fn load_metadata(&self) -> IndexResult<Option<IndexMetadata>> {
            Ok(None)
        }
    }

    fn file_with(path: &str, names: &[&str]) -> (FileRecord, Vec<Symbol>) {
        let symbols = names
            .iter()
            .enumerate()
            .map(|(i, n)| {
                let line = i as u32 * 5 + 1;
                Symbol::new(path, n, SymbolKind::Function, None, Span::new(line, 1, line + 3))
            })
            .collect();
        (FileRecord::new(path, format!("fp-{path}")), symbols)
    }

    #[test]
    fn test_commit_and_snapshot_isolation() {
        let store = IndexStore::open(Path::new("/p"), Arc::new(MemoryBackend::new())).unwrap();
        let before = store.snapshot();

        let (record, symbols) = file_with("a.c", &["f", "g"]);
        store.commit_file(record, symbols).unwrap();

        assert!(before.is_empty());
        let after = store.snapshot();
        assert_eq!(after.symbol_count(), 2);
        assert_eq!(after.file("a.c").unwrap().symbol_ids.len(), 2);
    }

    #[test]
    fn test_failed_commit_keeps_previous_state() {
        let store = IndexStore::open(Path::new("/p"), Arc::new(FailingBackend)).unwrap();
        let (record, symbols) = file_with("a.c", &["f"]);
        let err = store.commit_file(record, symbols).unwrap_err();
        assert_eq!(err.status_code(), "COMMIT_FAILURE");
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_mark_stale_keeps_symbols() {
        let store = IndexStore::open(Path::new("/p"), Arc::new(MemoryBackend::new())).unwrap();
        assert!(!store.mark_stale("a.c").unwrap());

        let (record, symbols) = file_with("a.c", &["f"]);
        store.commit_file(record, symbols).unwrap();
        assert!(store.mark_stale("a.c").unwrap());

        let index = store.snapshot();
        let record = index.file("a.c").unwrap();
        assert!(record.stale);
        assert_eq!(record.content_fingerprint, "fp-a.c");
        assert_eq!(index.symbol_count(), 1);
    }

    #[test]
    fn test_reopen_from_disk() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(DiskBackend::new(dir.path()));
        let store = IndexStore::open(Path::new("/p"), backend.clone()).unwrap();
        let (record, symbols) = file_with("a.c", &["f", "g"]);
        store.commit_file(record, symbols).unwrap();
        let (record, symbols) = file_with("b.c", &["h"]);
        store.commit_file(record, symbols).unwrap();
        store.purge_file("b.c").unwrap();
        store.save_metadata().unwrap();

        let reopened = IndexStore::open(Path::new("/p"), backend).unwrap();
        let index = reopened.snapshot();
        assert_eq!(index.file_count(), 1);
        assert_eq!(index.symbol_count(), 2);
        assert_eq!(reopened.metadata().unwrap().unwrap().symbol_count, 2);
    }

    #[test]
    fn test_batch_publishes_once() {
        let store = IndexStore::open(Path::new("/p"), Arc::new(MemoryBackend::new())).unwrap();
        let mut batch = store.begin();
        for i in 0..10 {
            let name = format!("fn_{i}");
            let (mut record, symbols) = file_with(&format!("f{i}.c"), &[name.as_str()]);
            if i > 0 {
                record.call_refs.push(CallRef {
                    caller: symbols[0].id,
                    callee: format!("fn_{}", i - 1),
                    line: 2,
                });
            }
            batch.commit_file(record, symbols).unwrap();
        }
        assert_eq!(batch.pending(), 10);
        assert!(store.snapshot().is_empty(), "nothing is visible before publishing");
        batch.finish();

        assert_eq!(store.generation(), 1);
        let index = store.snapshot();
        assert_eq!(index.file_count(), 10);
        assert_eq!(index.call_edge_count(), 9);
    }

    #[test]
    fn test_dropped_batch_publishes_pending() {
        let store = IndexStore::open(Path::new("/p"), Arc::new(MemoryBackend::new())).unwrap();
        {
            let mut batch = store.begin();
            let (record, symbols) = file_with("a.c", &["f"]);
            batch.commit_file(record, symbols).unwrap();
        }
        assert_eq!(store.generation(), 1);
        assert_eq!(store.snapshot().file_count(), 1);

        // An empty batch publishes nothing
        store.begin().finish();
        assert_eq!(store.generation(), 1);
    }

    #[test]
    fn test_purge_unknown_file_is_noop() {
        let store = IndexStore::open(Path::new("/p"), Arc::new(FailingBackend)).unwrap();
        assert!(store.purge_file("missing.c").unwrap().is_empty());
    }
}
