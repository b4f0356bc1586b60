//! Metadata tracking for vector index persistence.
//!
//! Records which model produced the stored vectors so a model change can be
//! detected on load.

use crate::error::VectorError;
use crate::indexing::get_utc_timestamp;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMetadata {
    /// Embedding model the vectors came from
    pub model_id: String,

    pub dimension: usize,

    pub vector_count: usize,

    /// Unix timestamp when created
    pub created_at: u64,

    /// Unix timestamp when last updated
    pub updated_at: u64,

    /// Version of the metadata format
    pub version: u32,
}

impl VectorMetadata {
    const CURRENT_VERSION: u32 = 1;

    pub fn new(model_id: impl Into<String>, dimension: usize, vector_count: usize) -> Self {
        let now = get_utc_timestamp();
        Self {
            model_id: model_id.into(),
            dimension,
            vector_count,
            created_at: now,
            updated_at: now,
            version: Self::CURRENT_VERSION,
        }
    }

    /// Update the metadata with new vector count and timestamp
    pub fn update(&mut self, vector_count: usize) {
        self.vector_count = vector_count;
        self.updated_at = get_utc_timestamp();
    }

    pub fn save(&self, dir: &Path) -> Result<(), VectorError> {
        let path = dir.join(METADATA_FILE);
        let json = serde_json::to_vec_pretty(self).map_err(|e| VectorError::Storage {
            path: path.clone(),
            reason: format!("Failed to serialize metadata: {e}"),
        })?;
        crate::storage::write_atomic(&path, &json).map_err(|e| VectorError::Storage {
            path,
            reason: e.to_string(),
        })
    }

    /// `None` when no vector index was written yet
    pub fn load(dir: &Path) -> Result<Option<Self>, VectorError> {
        let path = dir.join(METADATA_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(&path).map_err(|e| VectorError::Storage {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| VectorError::Storage {
                path,
                reason: format!("Failed to parse metadata: {e}"),
            })
    }

    /// Whether vectors stored under this metadata can serve `model_id`
    pub fn is_compatible(&self, model_id: &str, dimension: usize) -> Result<(), VectorError> {
        if self.model_id != model_id {
            return Err(VectorError::ModelMismatch {
                stored: self.model_id.clone(),
                configured: model_id.to_string(),
            });
        }
        if self.dimension != dimension {
            return Err(VectorError::DimensionMismatch {
                expected: dimension,
                actual: self.dimension,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_metadata_save_load() {
        let dir = TempDir::new().unwrap();
        let mut metadata = VectorMetadata::new("AllMiniLML6V2", 384, 10);
        metadata.update(12);
        metadata.save(dir.path()).unwrap();

        let loaded = VectorMetadata::load(dir.path()).unwrap().unwrap();
        assert_eq!(loaded, metadata);
        assert_eq!(loaded.vector_count, 12);
    }

    #[test]
    fn test_compatibility() {
        let metadata = VectorMetadata::new("AllMiniLML6V2", 384, 0);
        assert!(metadata.is_compatible("AllMiniLML6V2", 384).is_ok());
        assert!(matches!(
            metadata.is_compatible("BGESmallENV15", 384),
            Err(VectorError::ModelMismatch { .. })
        ));
        assert!(matches!(
            metadata.is_compatible("AllMiniLML6V2", 768),
            Err(VectorError::DimensionMismatch { .. })
        ));
    }
}
