//! Shared fixtures for integration tests
#![allow(dead_code)]

use codeweave::adapters::{
    AnalysisRequest, Analyzer, AnalyzerSet, Capabilities, CallGraphAnalyzer, RawFact, SyntaxAnalyzer,
};
use codeweave::storage::{FileRecord, FileShard, IndexBackend, IndexMetadata, MemoryBackend};
use codeweave::vector::EmbeddingProvider;
use codeweave::{
    AdapterError, AdapterErrorKind, IndexError, IndexResult, ProviderKind, Settings, Symbol, VectorError,
};
use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tempfile::TempDir;

/// A throwaway project directory
pub struct TestProject {
    dir: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn add_file(&self, path: &str, content: &str) -> PathBuf {
        let full_path = self.dir.path().join(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&full_path, content).unwrap();
        full_path
    }

    pub fn remove_file(&self, path: &str) {
        fs::remove_file(self.dir.path().join(path)).unwrap();
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Settings with a small worker pool
pub fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.indexing.parallel_threads = 2;
    settings
}

/// Settings with embeddings turned off
pub fn settings_without_embeddings() -> Settings {
    let mut settings = settings();
    settings.semantic_search.enabled = false;
    settings
}

/// The in-process analyzers, which need no external tools
pub fn builtin_analyzers() -> AnalyzerSet {
    AnalyzerSet::new(vec![
        Arc::new(SyntaxAnalyzer::new()),
        Arc::new(CallGraphAnalyzer::new()),
    ])
}

/// Wraps an analyzer and counts how often it runs
pub struct Counting {
    inner: Arc<dyn Analyzer>,
    calls: AtomicUsize,
}

impl Counting {
    pub fn new(inner: Arc<dyn Analyzer>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Analyzer for Counting {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn kind(&self) -> ProviderKind {
        self.inner.kind()
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    fn analyze(&self, request: &AnalysisRequest<'_>) -> Result<Vec<RawFact>, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.analyze(request)
    }
}

type Script = dyn Fn(&AnalysisRequest<'_>) -> Vec<RawFact> + Send + Sync;

/// Analyzer whose facts come from a closure
pub struct Scripted {
    name: &'static str,
    kind: ProviderKind,
    capabilities: Capabilities,
    script: Box<Script>,
}

impl Scripted {
    pub fn new(
        name: &'static str,
        kind: ProviderKind,
        capabilities: Capabilities,
        script: impl Fn(&AnalysisRequest<'_>) -> Vec<RawFact> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            kind,
            capabilities,
            script: Box::new(script),
        })
    }
}

impl Analyzer for Scripted {
    fn name(&self) -> &str {
        self.name
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn analyze(&self, request: &AnalysisRequest<'_>) -> Result<Vec<RawFact>, AdapterError> {
        Ok((self.script)(request))
    }
}

/// Analyzer that fails on every file
pub struct Failing {
    name: &'static str,
    kind: ProviderKind,
    capabilities: Capabilities,
    calls: AtomicUsize,
}

impl Failing {
    pub fn new(name: &'static str, kind: ProviderKind, capabilities: Capabilities) -> Arc<Self> {
        Arc::new(Self {
            name,
            kind,
            capabilities,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Analyzer for Failing {
    fn name(&self) -> &str {
        self.name
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn analyze(&self, request: &AnalysisRequest<'_>) -> Result<Vec<RawFact>, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AdapterError::new(
            self.name,
            request.relative,
            AdapterErrorKind::ExitStatus {
                status: "signal 11".to_string(),
                stderr: String::new(),
            },
        ))
    }
}

/// Deterministic bag-of-words embedder: each token bumps one hashed slot
pub struct HashEmbedder {
    dimension: usize,
    calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Arc<Self> {
        Arc::new(Self {
            dimension,
            calls: AtomicUsize::new(0),
        })
    }

    /// Number of texts embedded so far
    pub fn embedded(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            vector[(hasher.finish() % self.dimension as u64) as usize] += 1.0;
        }
        vector
    }
}

impl EmbeddingProvider for HashEmbedder {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, VectorError> {
        self.calls.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        "test-hash"
    }
}

/// Memory backend whose writes can be switched to fail
#[derive(Default)]
pub struct FlakyBackend {
    inner: MemoryBackend,
    fail_writes: AtomicBool,
}

impl FlakyBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check(&self, path: &str) -> IndexResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(IndexError::General(format!("disk full while writing {path}")));
        }
        Ok(())
    }
}

impl IndexBackend for FlakyBackend {
    fn load_all(&self) -> IndexResult<Vec<FileShard>> {
        self.inner.load_all()
    }

    fn put_file(&self, record: &FileRecord, symbols: &[Symbol]) -> IndexResult<()> {
        self.check(&record.path)?;
        self.inner.put_file(record, symbols)
    }

    fn delete_file(&self, path: &str) -> IndexResult<()> {
        self.check(path)?;
        self.inner.delete_file(path)
    }

    fn put_metadata(&self, metadata: &IndexMetadata) -> IndexResult<()> {
        self.inner.put_metadata(metadata)
    }

    fn load_metadata(&self) -> IndexResult<Option<IndexMetadata>> {
        self.inner.load_metadata()
    }
}
