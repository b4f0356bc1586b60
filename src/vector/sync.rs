//! Bring the vector index in line with the canonical store.
//!
//! Runs after a sweep. Vectors for symbols that no longer exist are dropped;
//! symbols whose embedding text changed (or that have no vector yet) are
//! embedded. Files whose fingerprint matches the one recorded on all of their
//! vectors are not even read.

use super::embedding::{EmbeddingProvider, embed_with_timeout};
use super::index::{VectorEntry, VectorIndex};
use super::text::{symbol_text, text_hash};
use crate::config::SemanticSearchConfig;
use crate::error::VectorError;
use crate::storage::{FileRecord, ProjectIndex};
use crate::types::SymbolId;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const EMBED_BATCH_SIZE: usize = 64;

/// What one sync pass did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// Symbols embedded by this pass
    pub embedded: usize,
    /// Symbols whose text was unchanged and kept their vector
    pub reused: usize,
    /// Vectors dropped because their symbol is gone
    pub removed: usize,
    /// Vectors in the index after the pass
    pub total: usize,
    /// Set when the provider failed; the remaining symbols stay unembedded
    pub unavailable: Option<String>,
}

struct Pending {
    id: SymbolId,
    text: String,
    hash: String,
    fingerprint: String,
}

pub fn sync_vectors(
    index: &mut VectorIndex,
    project: &ProjectIndex,
    provider: &Arc<dyn EmbeddingProvider>,
    config: &SemanticSearchConfig,
) -> SyncReport {
    let mut report = SyncReport {
        removed: index.retain(|id| project.symbol(id).is_some()),
        ..Default::default()
    };

    let mut pending = Vec::new();
    for record in project.files() {
        if is_current(index, record) {
            report.reused += record.symbol_ids.len();
            continue;
        }
        collect_pending(index, project, record, config, &mut pending, &mut report);
    }

    let timeout = Duration::from_secs(config.embed_timeout_secs);
    for batch in pending.chunks(EMBED_BATCH_SIZE) {
        let texts = batch.iter().map(|p| p.text.clone()).collect();
        match embed_with_timeout(provider, texts, timeout).and_then(|vectors| store_batch(index, batch, vectors)) {
            Ok(count) => report.embedded += count,
            Err(e) => {
                warn!("semantic search unavailable: {e}");
                report.unavailable = Some(e.to_string());
                break;
            }
        }
    }

    report.total = index.len();
    info!(
        embedded = report.embedded,
        reused = report.reused,
        removed = report.removed,
        total = report.total,
        "vector index synced"
    );
    report
}

/// Every symbol of `record` has a vector made from this exact file content
fn is_current(index: &VectorIndex, record: &FileRecord) -> bool {
    record.symbol_ids.iter().all(|id| {
        index
            .get(*id)
            .is_some_and(|entry| entry.file_fingerprint == record.content_fingerprint)
    })
}

fn collect_pending(
    index: &mut VectorIndex,
    project: &ProjectIndex,
    record: &FileRecord,
    config: &SemanticSearchConfig,
    pending: &mut Vec<Pending>,
    report: &mut SyncReport,
) {
    let path = project.project_root().join(&record.path);
    let source = match std::fs::read_to_string(&path) {
        Ok(source) => source,
        Err(e) => {
            // Still embed name, signature and doc without body text
            debug!(file = %record.path, "reading source for embedding failed: {e}");
            String::new()
        }
    };

    for id in &record.symbol_ids {
        let Some(symbol) = project.symbol(*id) else {
            continue;
        };
        let text = symbol_text(symbol, &source, config.context_lines, config.max_text_chars);
        let hash = text_hash(&text);
        if index.get(*id).is_some_and(|entry| entry.text_hash == hash) {
            index.touch(*id, &record.content_fingerprint);
            report.reused += 1;
            continue;
        }
        pending.push(Pending {
            id: *id,
            text,
            hash,
            fingerprint: record.content_fingerprint.clone(),
        });
    }
}

fn store_batch(index: &mut VectorIndex, batch: &[Pending], vectors: Vec<Vec<f32>>) -> Result<usize, VectorError> {
    if vectors.len() != batch.len() {
        return Err(VectorError::EmbeddingUnavailable {
            reason: format!("provider returned {} vectors for {} texts", vectors.len(), batch.len()),
        });
    }
    for (item, vector) in batch.iter().zip(vectors) {
        index.upsert(
            item.id,
            VectorEntry {
                vector,
                text_hash: item.hash.clone(),
                file_fingerprint: item.fingerprint.clone(),
            },
        )?;
    }
    Ok(batch.len())
}
