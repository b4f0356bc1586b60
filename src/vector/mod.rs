//! Embedding and nearest-neighbor search over symbols.
//!
//! The vector index is a cache derived from the symbol store. It is keyed by
//! [`SymbolId`](crate::SymbolId), persisted next to the index shards, and
//! thrown away whenever the configured model or its dimension changes.

mod embedding;
mod index;
mod metadata;
mod sync;
mod text;

pub use embedding::{
    EmbeddingProvider, FastEmbedProvider, ModelLoader, embed_with_timeout, models_dir, parse_model,
};
pub use index::{VECTORS_FILE, VectorEntry, VectorIndex, cosine_similarity};
pub(crate) use index::compare_scores;
pub use metadata::VectorMetadata;
pub use sync::{SyncReport, sync_vectors};
pub use text::{symbol_text, text_hash};
