pub mod backend;
pub mod index;
pub mod metadata;
pub mod store;

pub use backend::{DiskBackend, FileShard, IndexBackend, MemoryBackend};
pub use index::{FileRecord, ProjectIndex};
pub use metadata::IndexMetadata;
pub use store::{CommitBatch, IndexStore};

use crate::IndexResult;
use crate::error::ErrorContext;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Write `bytes` to `path` through a temp file in the same directory and a rename
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> IndexResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).with_path(dir)?;

    let mut tmp = NamedTempFile::new_in(dir).with_path(dir)?;
    tmp.write_all(bytes).with_path(tmp.path())?;
    tmp.as_file().sync_all().with_path(path)?;
    tmp.persist(path).map_err(|e| e.error).with_path(path)?;
    Ok(())
}
