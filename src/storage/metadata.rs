//! Metadata tracking for index state

use super::write_atomic;
use crate::{IndexError, IndexResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const METADATA_FILE: &str = "index.meta";

/// Current on-disk format
pub const FORMAT_VERSION: u32 = 1;

/// Metadata about the index state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    /// Version of the index format
    pub version: u32,

    /// Project the index was built from
    pub project_root: PathBuf,

    /// Number of symbols in the index
    pub symbol_count: u32,

    /// Number of files in the index
    pub file_count: u32,

    /// Last modification timestamp
    pub last_modified: u64,
}

impl IndexMetadata {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            version: FORMAT_VERSION,
            project_root: project_root.into(),
            symbol_count: 0,
            file_count: 0,
            last_modified: crate::indexing::get_utc_timestamp(),
        }
    }

    /// Update counts from the indexer
    pub fn update_counts(&mut self, symbol_count: u32, file_count: u32) {
        self.symbol_count = symbol_count;
        self.file_count = file_count;
        self.last_modified = crate::indexing::get_utc_timestamp();
    }

    /// Save metadata to `base_path/index.meta`
    pub fn save(&self, base_path: &Path) -> IndexResult<()> {
        let json = serde_json::to_vec_pretty(self).map_err(|e| {
            IndexError::General(format!("Failed to serialize metadata: {e}"))
        })?;
        write_atomic(&base_path.join(METADATA_FILE), &json)
    }

    /// Load metadata, `None` when no index was written yet
    pub fn load(base_path: &Path) -> IndexResult<Option<Self>> {
        let metadata_path = base_path.join(METADATA_FILE);

        if !metadata_path.exists() {
            return Ok(None);
        }

        let json = fs::read_to_string(&metadata_path).map_err(|e| IndexError::FileRead {
            path: metadata_path.clone(),
            source: e,
        })?;

        serde_json::from_str(&json).map(Some).map_err(|e| IndexError::Load {
            path: metadata_path,
            reason: format!("Failed to parse metadata: {e}"),
        })
    }
}
