//! Project index handle.
//!
//! A [`CodeIndex`] owns everything known about one project root: the
//! committed symbol store, the sweep pipeline, and the vector index derived
//! from the store. It is passed explicitly to every operation, so several
//! projects can be open side by side in one process.

use crate::adapters::AnalyzerSet;
use crate::indexing::{IndexSummary, Indexer, ProgressFn};
use crate::merge::MergePolicy;
use crate::query::{
    self, Direction, IncludingFile, IndexStatistics, QueryResult, QueryStatus, ScoredSymbol,
};
use crate::storage::{DiskBackend, IndexBackend, IndexStore, ProjectIndex};
use crate::symbol::Symbol;
use crate::types::{SymbolId, SymbolKind};
use crate::vector::{
    EmbeddingProvider, FastEmbedProvider, ModelLoader, SyncReport, VectorIndex, VectorMetadata,
    sync_vectors,
};
use crate::{IndexError, IndexResult, Settings};
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Directory under the index path holding `vectors.json` and `metadata.json`
const VECTOR_DIR: &str = "vectors";

/// Options for one [`CodeIndex::build_index`] run
#[derive(Clone, Default)]
pub struct BuildOptions {
    /// Checked between files; a cancelled build keeps every file committed so far
    pub cancel: CancellationToken,
    pub progress: Option<Arc<ProgressFn<'static>>>,
}

impl std::fmt::Debug for BuildOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildOptions")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

pub struct CodeIndex {
    root: PathBuf,
    settings: Arc<Settings>,
    store: IndexStore,
    indexer: Indexer,
    vector_dir: Option<PathBuf>,
    vectors: RwLock<Option<Arc<VectorIndex>>>,
    embedder: ModelLoader,
    build_lock: Mutex<()>,
}

/// Configures how a [`CodeIndex`] is opened
pub struct CodeIndexBuilder {
    root: PathBuf,
    settings: Settings,
    analyzers: Option<AnalyzerSet>,
    policy: Option<MergePolicy>,
    backend: Option<Arc<dyn IndexBackend>>,
    vector_dir: Option<PathBuf>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
}

impl CodeIndexBuilder {
    /// Analyzers to run instead of the ones enabled in settings
    pub fn analyzers(mut self, analyzers: AnalyzerSet) -> Self {
        self.analyzers = Some(analyzers);
        self
    }

    pub fn policy(mut self, policy: MergePolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Store backend. Without one, shards go to the configured index path.
    pub fn backend(mut self, backend: Arc<dyn IndexBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Where to persist the vector index when a custom backend is used
    pub fn vector_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.vector_dir = Some(dir.into());
        self
    }

    /// Embedding provider to use instead of loading the configured model
    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn open(self) -> IndexResult<CodeIndex> {
        let root = self
            .root
            .canonicalize()
            .ok()
            .filter(|p| p.is_dir())
            .ok_or_else(|| IndexError::ProjectNotFound {
                path: self.root.clone(),
            })?;

        let settings = Arc::new(self.settings);
        let (backend, vector_dir) = match self.backend {
            Some(backend) => (backend, self.vector_dir),
            None => {
                let index_dir = settings.index_dir(&root);
                let vector_dir = self.vector_dir.unwrap_or_else(|| index_dir.join(VECTOR_DIR));
                let backend: Arc<dyn IndexBackend> = Arc::new(DiskBackend::new(index_dir));
                (backend, Some(vector_dir))
            }
        };

        let store = IndexStore::open(&root, backend)?;
        let analyzers = self
            .analyzers
            .unwrap_or_else(|| AnalyzerSet::from_settings(&settings));
        let mut indexer = Indexer::new(settings.clone(), analyzers);
        if let Some(policy) = self.policy {
            indexer = indexer.with_policy(policy);
        }

        let embedder = match self.embedder {
            Some(provider) => ModelLoader::ready(provider),
            None => ModelLoader::new(),
        };

        debug!(root = %root.display(), analyzers = ?indexer.analyzers(), "opened index");
        Ok(CodeIndex {
            root,
            settings,
            store,
            indexer,
            vector_dir,
            vectors: RwLock::new(None),
            embedder,
            build_lock: Mutex::new(()),
        })
    }
}

impl CodeIndex {
    pub fn builder(root: impl Into<PathBuf>, settings: Settings) -> CodeIndexBuilder {
        CodeIndexBuilder {
            root: root.into(),
            settings,
            analyzers: None,
            policy: None,
            backend: None,
            vector_dir: None,
            embedder: None,
        }
    }

    /// Open the index for `root` with the analyzers and storage from settings
    pub fn open(root: impl Into<PathBuf>, settings: Settings) -> IndexResult<Self> {
        Self::builder(root, settings).open()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Current committed state
    pub fn snapshot(&self) -> Arc<ProjectIndex> {
        self.store.snapshot()
    }

    /// Sweep the project, then bring the vector index up to date.
    ///
    /// Builds on one handle run one at a time. Queries keep answering from
    /// the last committed state while a build runs.
    pub fn build_index(&self, options: &BuildOptions) -> IndexResult<IndexSummary> {
        let _build = self.build_lock.lock();

        let mut summary = self.indexer.sweep(
            &self.root,
            &self.store,
            &options.cancel,
            options.progress.as_deref(),
        )?;

        if summary.cancelled {
            self.prune_vectors();
        } else {
            summary.embeddings = self.sync_embeddings();
        }
        Ok(summary)
    }

    fn sync_embeddings(&self) -> Option<SyncReport> {
        if !self.settings.semantic_search.enabled {
            return None;
        }
        let provider = match self.embedder() {
            Ok(provider) => provider,
            Err(reason) => {
                warn!("skipping embeddings: {reason}");
                self.prune_vectors();
                return Some(SyncReport {
                    unavailable: Some(reason),
                    ..Default::default()
                });
            }
        };

        let snapshot = self.store.snapshot();
        let mut vectors = VectorIndex::clone(&self.vectors_for(&provider));
        let report = sync_vectors(&mut vectors, &snapshot, &provider, &self.settings.semantic_search);
        self.publish_vectors(vectors);
        Some(report)
    }

    /// Drop vectors whose symbols are gone, without embedding anything
    fn prune_vectors(&self) {
        let Some(current) = self.cached_vectors() else {
            return;
        };
        let snapshot = self.store.snapshot();
        let mut vectors = VectorIndex::clone(&current);
        let removed = vectors.retain(|id| snapshot.symbol(id).is_some());
        if removed > 0 {
            debug!(removed, "pruned vectors of removed symbols");
            self.publish_vectors(vectors);
        }
    }

    fn publish_vectors(&self, vectors: VectorIndex) {
        if let Some(dir) = &self.vector_dir {
            if let Err(e) = vectors.save(dir) {
                warn!("failed to save vector index: {e}");
            }
        }
        *self.vectors.write() = Some(Arc::new(vectors));
    }

    /// The embedding provider, loaded on first use
    fn embedder(&self) -> Result<Arc<dyn EmbeddingProvider>, String> {
        let config = &self.settings.semantic_search;
        if !config.enabled {
            return Err("semantic search is disabled in settings".to_string());
        }
        let model = config.model.clone();
        self.embedder.get(
            move || {
                FastEmbedProvider::new(&model)
                    .map(|p| Arc::new(p) as Arc<dyn EmbeddingProvider>)
                    .map_err(|e| e.to_string())
            },
            Duration::from_secs(config.embed_timeout_secs),
        )
    }

    /// Model id that stored vectors must match
    fn model_id(&self) -> String {
        match self.embedder.loaded() {
            Some(provider) => provider.model_id().to_string(),
            None => self.settings.semantic_search.model.clone(),
        }
    }

    /// Vector index in memory or on disk, without loading the model
    fn cached_vectors(&self) -> Option<Arc<VectorIndex>> {
        if let Some(vectors) = self.vectors.read().clone() {
            return Some(vectors);
        }
        let dir = self.vector_dir.as_ref()?;
        let metadata = VectorMetadata::load(dir).ok().flatten()?;
        let model_id = self.model_id();
        if metadata.model_id != model_id {
            return None;
        }
        let loaded = Arc::new(VectorIndex::load_or_new(dir, &model_id, metadata.dimension));
        let mut slot = self.vectors.write();
        Some(slot.get_or_insert(loaded).clone())
    }

    /// Vector index matching `provider`, rebuilt empty on a model change
    fn vectors_for(&self, provider: &Arc<dyn EmbeddingProvider>) -> Arc<VectorIndex> {
        let current = self.vectors.read().clone();
        if let Some(vectors) = current {
            if vectors.model_id() == provider.model_id() && vectors.dimension() == provider.dimension() {
                return vectors;
            }
        }

        let loaded = match &self.vector_dir {
            Some(dir) => VectorIndex::load_or_new(dir, provider.model_id(), provider.dimension()),
            None => VectorIndex::new(provider.model_id(), provider.dimension()),
        };
        if loaded.is_empty() {
            info!(model = provider.model_id(), "starting a new vector index");
        }
        let loaded = Arc::new(loaded);
        *self.vectors.write() = Some(loaded.clone());
        loaded
    }

    /// A symbol with its embedding attached when one exists
    pub fn get_symbol(&self, id: SymbolId) -> Option<Symbol> {
        let mut symbol = self.snapshot().symbol(id)?.clone();
        if let Some(vectors) = self.cached_vectors() {
            symbol.embedding_vector = vectors.get(id).map(|entry| entry.vector.clone());
        }
        Some(symbol)
    }

    pub fn search_exact(&self, name: &str) -> QueryResult<Symbol> {
        query::search_exact(&self.snapshot(), name)
    }

    pub fn get_symbols_by_kind(&self, kind: SymbolKind) -> QueryResult<Symbol> {
        query::get_symbols_by_kind(&self.snapshot(), kind)
    }

    pub fn get_file_symbols(&self, path: &str) -> QueryResult<Symbol> {
        query::get_file_symbols(&self.snapshot(), path)
    }

    pub fn get_files_including(&self, header: &str) -> QueryResult<IncludingFile> {
        query::get_files_including(&self.snapshot(), header)
    }

    pub fn get_callers(&self, id: SymbolId) -> QueryResult<Symbol> {
        query::get_callers(&self.snapshot(), id)
    }

    pub fn get_callees(&self, id: SymbolId) -> QueryResult<Symbol> {
        query::get_callees(&self.snapshot(), id)
    }

    pub fn traverse_calls(&self, id: SymbolId, direction: Direction, max_depth: u32) -> QueryResult<(Symbol, u32)> {
        query::traverse_calls(&self.snapshot(), id, direction, max_depth)
    }

    /// Natural-language search. Loads the embedding model on first use.
    pub fn search_semantic(&self, text: &str, top_k: usize) -> QueryResult<ScoredSymbol> {
        let snapshot = self.snapshot();
        let config = &self.settings.semantic_search;
        match self.embedder() {
            Ok(provider) => {
                let vectors = self.vectors_for(&provider);
                query::search_semantic(&snapshot, Some(&vectors), Some(&provider), text, top_k, config)
            }
            Err(reason) => {
                debug!("semantic search unavailable: {reason}");
                let mut result = query::search_semantic(&snapshot, None, None, text, top_k, config);
                if matches!(result.status, QueryStatus::SemanticUnavailable(_)) {
                    result.status = QueryStatus::SemanticUnavailable(reason);
                }
                result
            }
        }
    }

    pub fn get_statistics(&self) -> IndexStatistics {
        query::get_statistics(&self.snapshot(), self.cached_vectors().as_deref())
    }
}

impl std::fmt::Debug for CodeIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeIndex")
            .field("root", &self.root)
            .field("store", &self.store)
            .field("indexer", &self.indexer)
            .field("vector_dir", &self.vector_dir)
            .finish()
    }
}
