//! Content fingerprints for incremental indexing

use crate::storage::FileRecord;
use chrono::Utc;
use sha2::{Digest, Sha256};

/// What a sweep has to do with one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    /// Never indexed
    New,
    /// Fingerprint matches the committed record
    Unchanged,
    /// Bytes differ from the committed record
    Changed,
}

impl FileState {
    pub fn classify(record: Option<&FileRecord>, fingerprint: &str) -> Self {
        match record {
            None => FileState::New,
            Some(r) if r.content_fingerprint == fingerprint => FileState::Unchanged,
            Some(_) => FileState::Changed,
        }
    }
}

/// SHA-256 of raw file bytes, hex encoded
pub fn calculate_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Get current UTC timestamp in seconds since UNIX_EPOCH
pub fn get_utc_timestamp() -> u64 {
    Utc::now().timestamp() as u64
}
