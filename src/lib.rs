//! Multi-provider C code index.
//!
//! Several analyzers run over every source file, their facts are merged into
//! one canonical [`Symbol`] per declaration, and the result is kept in an
//! incremental store with an embedding index on top for natural-language
//! search. [`CodeIndex`] is the entry point.

pub mod adapters;
pub mod config;
pub mod display;
pub mod error;
pub mod index;
pub mod indexing;
pub mod merge;
pub mod query;
pub mod storage;
pub mod symbol;
pub mod types;
pub mod vector;
pub mod watch;

// Explicit exports for better API clarity
pub use config::Settings;
pub use error::{AdapterError, AdapterErrorKind, IndexError, IndexResult, VectorError};
pub use index::{BuildOptions, CodeIndex, CodeIndexBuilder};
pub use indexing::{IndexSummary, calculate_hash};
pub use query::{
    Direction, IncludingFile, IndexStatistics, QueryResult, QueryStatus, ScoredSymbol,
};
pub use symbol::{Diagnostic, Field, Symbol};
pub use types::{ProviderKind, Severity, Span, SymbolId, SymbolKind};
pub use watch::IndexWatcher;
