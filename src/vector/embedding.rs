//! Embedding providers.
//!
//! [`FastEmbedProvider`] runs a local fastembed model. Everything else in
//! the crate only sees the [`EmbeddingProvider`] trait, so tests can swap in
//! a deterministic stub.

use crate::error::VectorError;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Turns text into fixed-length vectors.
///
/// Implementations must return one vector per input, all of
/// [`dimension`](EmbeddingProvider::dimension) length, and must be
/// deterministic for a given `model_id`.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, VectorError>;

    fn dimension(&self) -> usize;

    /// Identifies model and version. A change invalidates stored vectors.
    fn model_id(&self) -> &str;
}

/// Local fastembed model
pub struct FastEmbedProvider {
    model: Mutex<TextEmbedding>,
    model_id: String,
    dimension: usize,
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("model_id", &self.model_id)
            .field("dimension", &self.dimension)
            .field("model", &"<TextEmbedding>")
            .finish()
    }
}

impl FastEmbedProvider {
    /// Load a model by name, downloading it into the cache on first use
    pub fn new(model_name: &str) -> Result<Self, VectorError> {
        let model = parse_model(model_name)?;
        let cache_dir = models_dir();
        info!(model = model_name, cache = %cache_dir.display(), "loading embedding model");

        let mut text_model = TextEmbedding::try_new(
            InitOptions::new(model)
                .with_cache_dir(cache_dir)
                .with_show_download_progress(false),
        )
        .map_err(|e| VectorError::EmbeddingUnavailable {
            reason: format!(
                "failed to initialize embedding model {model_name}: {e}. The first run needs network access to download it"
            ),
        })?;

        // Probe the dimension with a throwaway embedding
        let probe = text_model
            .embed(vec!["probe".to_string()], None)
            .map_err(|e| VectorError::EmbeddingUnavailable {
                reason: e.to_string(),
            })?;
        let dimension = probe.first().map(Vec::len).unwrap_or_default();
        debug!(dimension, "embedding model ready");

        Ok(Self {
            model: Mutex::new(text_model),
            model_id: model_name.to_string(),
            dimension,
        })
    }
}

impl EmbeddingProvider for FastEmbedProvider {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, VectorError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.model
            .lock()
            .embed(texts.to_vec(), None)
            .map_err(|e| VectorError::EmbeddingUnavailable {
                reason: format!("embedding failed: {e}"),
            })
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Model names accepted in `semantic_search.model`
pub fn parse_model(name: &str) -> Result<EmbeddingModel, VectorError> {
    match name {
        "AllMiniLML6V2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "AllMiniLML12V2" => Ok(EmbeddingModel::AllMiniLML12V2),
        "BGESmallENV15" => Ok(EmbeddingModel::BGESmallENV15),
        "BGEBaseENV15" => Ok(EmbeddingModel::BGEBaseENV15),
        other => Err(VectorError::EmbeddingUnavailable {
            reason: format!(
                "unknown model '{other}'. Supported: AllMiniLML6V2, AllMiniLML12V2, BGESmallENV15, BGEBaseENV15"
            ),
        }),
    }
}

/// Shared model cache, `~/.cache/codeweave/models` on Linux
pub fn models_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("codeweave")
        .join("models")
}

/// Run one embedding call on a helper thread, giving up after `timeout`.
///
/// A call that times out keeps running in the background; its result is
/// discarded.
pub fn embed_with_timeout(
    provider: &Arc<dyn EmbeddingProvider>,
    texts: Vec<String>,
    timeout: Duration,
) -> Result<Vec<Vec<f32>>, VectorError> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    let worker = Arc::clone(provider);
    std::thread::Builder::new()
        .name("codeweave-embed".to_string())
        .spawn(move || {
            let _ = tx.send(worker.embed(&texts));
        })
        .map_err(|e| VectorError::EmbeddingUnavailable {
            reason: format!("could not start embedding thread: {e}"),
        })?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(VectorError::EmbeddingUnavailable {
            reason: format!("embedding timed out after {}s", timeout.as_secs_f64()),
        }),
        Err(RecvTimeoutError::Disconnected) => Err(VectorError::EmbeddingUnavailable {
            reason: "embedding thread exited without a result".to_string(),
        }),
    }
}

type LoadResult = Result<Arc<dyn EmbeddingProvider>, String>;

enum LoadState {
    Idle,
    Loading(Receiver<LoadResult>),
    Ready(LoadResult),
}

/// Loads an embedding provider once, on a helper thread.
///
/// Each caller waits at most `timeout`. A load that outlives the wait keeps
/// running and its result is picked up by a later caller, so a slow first
/// download only makes semantic search unavailable until it lands.
pub struct ModelLoader {
    state: Mutex<LoadState>,
}

impl ModelLoader {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LoadState::Idle),
        }
    }

    /// A loader that already holds `provider`
    pub fn ready(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            state: Mutex::new(LoadState::Ready(Ok(provider))),
        }
    }

    /// The provider if it finished loading. Never waits on a load in progress.
    pub fn loaded(&self) -> Option<Arc<dyn EmbeddingProvider>> {
        match &*self.state.try_lock()? {
            LoadState::Ready(Ok(provider)) => Some(provider.clone()),
            _ => None,
        }
    }

    /// Start `load` on first call, then wait up to `timeout` for its result
    pub fn get<F>(&self, load: F, timeout: Duration) -> LoadResult
    where
        F: FnOnce() -> LoadResult + Send + 'static,
    {
        let mut state = self.state.lock();
        if matches!(*state, LoadState::Idle) {
            let (tx, rx) = crossbeam_channel::bounded(1);
            std::thread::Builder::new()
                .name("codeweave-model-load".to_string())
                .spawn(move || {
                    let _ = tx.send(load());
                })
                .map_err(|e| format!("could not start model loading thread: {e}"))?;
            *state = LoadState::Loading(rx);
        }

        let rx = match &*state {
            LoadState::Ready(result) => return result.clone(),
            LoadState::Loading(rx) => rx.clone(),
            LoadState::Idle => return Err("model loading did not start".to_string()),
        };
        let result = match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                warn!(timeout_secs = timeout.as_secs_f64(), "embedding model still loading");
                return Err(format!(
                    "embedding model still loading after {}s",
                    timeout.as_secs_f64()
                ));
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err("model loading thread exited without a result".to_string())
            }
        };
        *state = LoadState::Ready(result.clone());
        result
    }
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self::new()
    }
}
