//! Pluggable persistence for file records and their symbols
//!
//! The store only talks to an [`IndexBackend`]. Two implementations ship:
//! [`MemoryBackend`] for tests and throwaway indices, and [`DiskBackend`],
//! which writes one JSON shard per source file so a crash while writing one
//! file leaves every other shard intact.

use super::{FileRecord, IndexMetadata, write_atomic};
use crate::error::ErrorContext;
use crate::symbol::Symbol;
use crate::{IndexError, IndexResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

const SHARD_DIR: &str = "files";

/// Unit of persistence: one file record with the symbols it owns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileShard {
    pub record: FileRecord,
    pub symbols: Vec<Symbol>,
}

impl FileShard {
    /// Call edges and embeddings are derived state; they are rebuilt on load
    pub fn new(record: &FileRecord, symbols: &[Symbol]) -> Self {
        let symbols = symbols
            .iter()
            .cloned()
            .map(|mut s| {
                s.callers.clear();
                s.callees.clear();
                s.embedding_vector = None;
                s
            })
            .collect();
        Self {
            record: record.clone(),
            symbols,
        }
    }
}

pub trait IndexBackend: Send + Sync {
    /// Every persisted shard, ordered by path
    fn load_all(&self) -> IndexResult<Vec<FileShard>>;

    /// Durably replace the shard for `record.path`
    fn put_file(&self, record: &FileRecord, symbols: &[Symbol]) -> IndexResult<()>;

    /// Remove the shard for `path`. Missing shards are not an error.
    fn delete_file(&self, path: &str) -> IndexResult<()>;

    fn put_metadata(&self, metadata: &IndexMetadata) -> IndexResult<()>;

    fn load_metadata(&self) -> IndexResult<Option<IndexMetadata>>;
}

/// Backend that keeps shards in memory
#[derive(Debug, Default)]
pub struct MemoryBackend {
    shards: Mutex<BTreeMap<String, FileShard>>,
    metadata: Mutex<Option<IndexMetadata>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shard_count(&self) -> usize {
        self.shards.lock().len()
    }
}

impl IndexBackend for MemoryBackend {
    fn load_all(&self) -> IndexResult<Vec<FileShard>> {
        Ok(self.shards.lock().values().cloned().collect())
    }

    fn put_file(&self, record: &FileRecord, symbols: &[Symbol]) -> IndexResult<()> {
        self.shards
            .lock()
            .insert(record.path.clone(), FileShard::new(record, symbols));
        Ok(())
    }

    fn delete_file(&self, path: &str) -> IndexResult<()> {
        self.shards.lock().remove(path);
        Ok(())
    }

    fn put_metadata(&self, metadata: &IndexMetadata) -> IndexResult<()> {
        *self.metadata.lock() = Some(metadata.clone());
        Ok(())
    }

    fn load_metadata(&self) -> IndexResult<Option<IndexMetadata>> {
        Ok(self.metadata.lock().clone())
    }
}

/// Backend writing JSON shards under an index directory:
///
/// ```text
/// <index>/index.meta
/// <index>/files/<sha256(path)[..16]>.json
/// ```
#[derive(Debug, Clone)]
pub struct DiskBackend {
    base_path: PathBuf,
}

impl DiskBackend {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn shard_dir(&self) -> PathBuf {
        self.base_path.join(SHARD_DIR)
    }

    fn shard_path(&self, path: &str) -> PathBuf {
        let digest = Sha256::digest(path.as_bytes());
        let name: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
        self.shard_dir().join(format!("{name}.json"))
    }
}

impl IndexBackend for DiskBackend {
    fn load_all(&self) -> IndexResult<Vec<FileShard>> {
        let dir = self.shard_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&dir).map_err(|e| IndexError::Load {
            path: dir.clone(),
            reason: e.to_string(),
        })?;

        let mut shards = Vec::new();
        for entry in entries.filter_map(Result::ok) {
            let path = entry.path();
            // Leftover temp files from an interrupted write have no extension
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let parsed = fs::read(&path)
                .map_err(|e| e.to_string())
                .and_then(|bytes| {
                    serde_json::from_slice::<FileShard>(&bytes).map_err(|e| e.to_string())
                });
            match parsed {
                Ok(shard) => shards.push(shard),
                // The file will be re-analyzed on the next sweep
                Err(e) => warn!(shard = %path.display(), "skipping unreadable shard: {e}"),
            }
        }

        shards.sort_by(|a, b| a.record.path.cmp(&b.record.path));
        Ok(shards)
    }

    fn put_file(&self, record: &FileRecord, symbols: &[Symbol]) -> IndexResult<()> {
        let shard = FileShard::new(record, symbols);
        let json = serde_json::to_vec(&shard).map_err(|e| IndexError::CommitFailure {
            path: record.path.clone(),
            reason: format!("serialization failed: {e}"),
        })?;
        write_atomic(&self.shard_path(&record.path), &json)
    }

    fn delete_file(&self, path: &str) -> IndexResult<()> {
        let shard = self.shard_path(path);
        match fs::remove_file(&shard) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e).with_path(&shard),
            _ => Ok(()),
        }
    }

    fn put_metadata(&self, metadata: &IndexMetadata) -> IndexResult<()> {
        metadata.save(&self.base_path)
    }

    fn load_metadata(&self) -> IndexResult<Option<IndexMetadata>> {
        IndexMetadata::load(&self.base_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Span, SymbolKind};
    use tempfile::TempDir;

    fn shard_input(path: &str) -> (FileRecord, Vec<Symbol>) {
        let mut sym = Symbol::new(path, "main", SymbolKind::Function, None, Span::new(1, 1, 3));
        sym.callees.insert(sym.id);
        sym.embedding_vector = Some(vec![0.5, 0.5]);
        let mut record = FileRecord::new(path, "abc");
        record.symbol_ids = vec![sym.id];
        (record, vec![sym])
    }

    #[test]
    fn test_disk_backend_roundtrip_strips_derived_state() {
        let dir = TempDir::new().unwrap();
        let backend = DiskBackend::new(dir.path());
        let (record, symbols) = shard_input("src/main.c");
        backend.put_file(&record, &symbols).unwrap();

        let shards = backend.load_all().unwrap();
        assert_eq!(shards.len(), 1);
        assert_eq!(shards[0].record, record);
        assert!(shards[0].symbols[0].callees.is_empty());
        assert!(shards[0].symbols[0].embedding_vector.is_none());
    }

    #[test]
    fn test_disk_backend_delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let backend = DiskBackend::new(dir.path());
        let (record, symbols) = shard_input("a.c");
        backend.put_file(&record, &symbols).unwrap();
        backend.delete_file("a.c").unwrap();
        backend.delete_file("a.c").unwrap();
        assert!(backend.load_all().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_shard_is_skipped() {
        let dir = TempDir::new().unwrap();
        let backend = DiskBackend::new(dir.path());
        let (record, symbols) = shard_input("good.c");
        backend.put_file(&record, &symbols).unwrap();
        fs::write(dir.path().join(SHARD_DIR).join("deadbeefdeadbeef.json"), "{\"record\":").unwrap();
        fs::write(dir.path().join(SHARD_DIR).join(".tmpXYZ"), "partial").unwrap();

        let shards = backend.load_all().unwrap();
        assert_eq!(shards.len(), 1);
        assert_eq!(shards[0].record.path, "good.c");
    }

    #[test]
    fn test_memory_backend_metadata() {
        let backend = MemoryBackend::new();
        assert!(backend.load_metadata().unwrap().is_none());
        backend.put_metadata(&IndexMetadata::new("/p")).unwrap();
        assert_eq!(backend.load_metadata().unwrap().unwrap().project_root, PathBuf::from("/p"));
    }
}
