//! Nearest-neighbor index over symbol embeddings
//!
//! A derived cache keyed by [`SymbolId`]: it can always be rebuilt from the
//! canonical store. Search is an exact cosine scan; ties resolve by id so
//! identical queries against an unchanged index always rank the same way.

use super::metadata::VectorMetadata;
use crate::error::VectorError;
use crate::types::SymbolId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

pub const VECTORS_FILE: &str = "vectors.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorEntry {
    pub vector: Vec<f32>,
    /// Hash of the embedded text
    pub text_hash: String,
    /// Fingerprint of the owning file when the vector was made
    pub file_fingerprint: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    model_id: String,
    dimension: usize,
    entries: BTreeMap<SymbolId, VectorEntry>,
}

impl VectorIndex {
    pub fn new(model_id: impl Into<String>, dimension: usize) -> Self {
        Self {
            model_id: model_id.into(),
            dimension,
            entries: BTreeMap::new(),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: SymbolId) -> Option<&VectorEntry> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: SymbolId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.entries.keys().copied()
    }

    pub fn upsert(&mut self, id: SymbolId, entry: VectorEntry) -> Result<(), VectorError> {
        if entry.vector.len() != self.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.dimension,
                actual: entry.vector.len(),
            });
        }
        self.entries.insert(id, entry);
        Ok(())
    }

    /// Record that `id`'s file changed without changing its text
    pub fn touch(&mut self, id: SymbolId, file_fingerprint: &str) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.file_fingerprint = file_fingerprint.to_string();
        }
    }

    pub fn remove(&mut self, ids: &[SymbolId]) -> usize {
        ids.iter()
            .filter(|id| self.entries.remove(id).is_some())
            .count()
    }

    /// Keep only entries for which `keep` holds. Returns how many were dropped.
    pub fn retain(&mut self, mut keep: impl FnMut(SymbolId) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|id, _| keep(*id));
        before - self.entries.len()
    }

    /// Cosine similarity of `query` against every entry, in id order
    pub fn scores(&self, query: &[f32]) -> Result<Vec<(SymbolId, f32)>, VectorError> {
        if query.len() != self.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        Ok(self
            .entries
            .iter()
            .map(|(id, entry)| (*id, cosine_similarity(query, &entry.vector)))
            .collect())
    }

    /// Top `k` entries by similarity, highest first
    pub fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<(SymbolId, f32)>, VectorError> {
        let mut scored = self.scores(query)?;
        scored.sort_by(|a, b| compare_scores(a.1, b.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }

    pub fn save(&self, dir: &Path) -> Result<(), VectorError> {
        let path = dir.join(VECTORS_FILE);
        let json = serde_json::to_vec(&self.entries).map_err(|e| VectorError::Storage {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        crate::storage::write_atomic(&path, &json).map_err(|e| VectorError::Storage {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        let mut metadata = VectorMetadata::load(dir)
            .ok()
            .flatten()
            .filter(|m| m.is_compatible(&self.model_id, self.dimension).is_ok())
            .unwrap_or_else(|| VectorMetadata::new(self.model_id.clone(), self.dimension, 0));
        metadata.update(self.entries.len());
        metadata.save(dir)?;
        debug!(vectors = self.entries.len(), dir = %dir.display(), "saved vector index");
        Ok(())
    }

    /// Load the index stored in `dir` for this model.
    ///
    /// Returns an empty index when nothing was stored, the data cannot be
    /// read, or it was built with another model or dimension; the caller
    /// rebuilds it from the symbol store.
    pub fn load_or_new(dir: &Path, model_id: &str, dimension: usize) -> Self {
        match Self::load(dir, model_id, dimension) {
            Ok(Some(index)) => index,
            Ok(None) => Self::new(model_id, dimension),
            Err(e) => {
                warn!("discarding vector index: {e}");
                Self::new(model_id, dimension)
            }
        }
    }

    pub fn load(dir: &Path, model_id: &str, dimension: usize) -> Result<Option<Self>, VectorError> {
        let Some(metadata) = VectorMetadata::load(dir)? else {
            return Ok(None);
        };
        metadata.is_compatible(model_id, dimension)?;

        let path = dir.join(VECTORS_FILE);
        let bytes = std::fs::read(&path).map_err(|e| VectorError::Storage {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let entries: BTreeMap<SymbolId, VectorEntry> =
            serde_json::from_slice(&bytes).map_err(|e| VectorError::Storage {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        if let Some(bad) = entries.values().find(|e| e.vector.len() != dimension) {
            return Err(VectorError::DimensionMismatch {
                expected: dimension,
                actual: bad.vector.len(),
            });
        }

        Ok(Some(Self {
            model_id: model_id.to_string(),
            dimension,
            entries,
        }))
    }
}

/// Descending by score, NaN last
pub(crate) fn compare_scores(a: f32, b: f32) -> Ordering {
    b.partial_cmp(&a).unwrap_or_else(|| a.is_nan().cmp(&b.is_nan()))
}

/// Calculate cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(vector: Vec<f32>) -> VectorEntry {
        VectorEntry {
            vector,
            text_hash: "t".into(),
            file_fingerprint: "f".into(),
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_upsert_checks_dimension() {
        let mut index = VectorIndex::new("m", 2);
        assert!(index.upsert(SymbolId(1), entry(vec![1.0, 0.0])).is_ok());
        assert!(matches!(
            index.upsert(SymbolId(2), entry(vec![1.0])),
            Err(VectorError::DimensionMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_nearest_orders_by_score_then_id() {
        let mut index = VectorIndex::new("m", 2);
        index.upsert(SymbolId(3), entry(vec![1.0, 0.0])).unwrap();
        index.upsert(SymbolId(1), entry(vec![1.0, 0.0])).unwrap();
        index.upsert(SymbolId(2), entry(vec![0.0, 1.0])).unwrap();

        let hits = index.nearest(&[1.0, 0.1], 2).unwrap();
        let ids: Vec<_> = hits.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![SymbolId(1), SymbolId(3)]);
    }

    #[test]
    fn test_retain_and_remove() {
        let mut index = VectorIndex::new("m", 1);
        for i in 0..5 {
            index.upsert(SymbolId(i), entry(vec![1.0])).unwrap();
        }
        assert_eq!(index.retain(|id| id.0 % 2 == 0), 2);
        assert_eq!(index.remove(&[SymbolId(0), SymbolId(1)]), 1);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_save_load_and_model_change() {
        let dir = TempDir::new().unwrap();
        let mut index = VectorIndex::new("model-a", 2);
        index.upsert(SymbolId(7), entry(vec![0.6, 0.8])).unwrap();
        index.save(dir.path()).unwrap();

        let loaded = VectorIndex::load(dir.path(), "model-a", 2).unwrap().unwrap();
        assert_eq!(loaded, index);

        assert!(matches!(
            VectorIndex::load(dir.path(), "model-b", 2),
            Err(VectorError::ModelMismatch { .. })
        ));
        assert!(VectorIndex::load_or_new(dir.path(), "model-b", 2).is_empty());
    }
}
