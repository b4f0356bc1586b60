//! Error types for the indexer
//!
//! Structured error types built on thiserror. Per-provider and per-file
//! failures are recoverable and get aggregated into the sweep summary;
//! only project-level errors abort a build.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for index operations
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Project root '{path}' does not exist or is not a directory")]
    ProjectNotFound { path: PathBuf },

    /// File system errors
    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Storage errors
    #[error("Failed to commit '{path}' to the index store: {reason}")]
    CommitFailure { path: String, reason: String },

    #[error("Failed to persist index to '{path}': {source}")]
    Persistence {
        path: PathBuf,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to load index from '{path}': {reason}")]
    Load { path: PathBuf, reason: String },

    /// Configuration errors
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Index sweep was cancelled")]
    Cancelled,

    #[error(transparent)]
    Vector(#[from] VectorError),

    /// Generic error for cases not covered above
    #[error("{0}")]
    General(String),
}

impl IndexError {
    /// Get a status code for this error type
    pub fn status_code(&self) -> String {
        match self {
            Self::ProjectNotFound { .. } => "PROJECT_NOT_FOUND",
            Self::FileRead { .. } => "FILE_READ_ERROR",
            Self::CommitFailure { .. } => "COMMIT_FAILURE",
            Self::Persistence { .. } => "PERSISTENCE_ERROR",
            Self::Load { .. } => "LOAD_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Cancelled => "CANCELLED",
            Self::Vector(_) => "VECTOR_ERROR",
            Self::General(_) => "GENERAL_ERROR",
        }
        .to_string()
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::ProjectNotFound { .. } => vec![
                "Check the path passed to 'codeweave index'",
                "Relative paths are resolved against the current directory",
            ],
            Self::CommitFailure { .. } => vec![
                "The file's previously committed state was kept",
                "Check disk space and permissions in the index directory",
            ],
            Self::Persistence { .. } | Self::Load { .. } => vec![
                "Remove the index directory and run 'codeweave index' again",
                "Check for disk errors or filesystem corruption",
            ],
            Self::FileRead { .. } => vec![
                "Check that the file exists and you have read permissions",
                "Ensure the file is not locked by another process",
            ],
            Self::Config { .. } => vec![
                "Check .codeweave/settings.toml for syntax errors",
                "Run 'codeweave init --force' to regenerate the default configuration",
            ],
            Self::Vector(_) => vec![
                "Exact lookups keep working without semantic search",
                "Check the embedding model cache directory",
            ],
            Self::Cancelled | Self::General(_) => vec![],
        }
    }
}

/// What went wrong when a provider ran on a file
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterErrorKind {
    #[error("timed out after {}s", .after.as_secs_f64())]
    Timeout { after: Duration },

    #[error("could not start provider: {0}")]
    Spawn(String),

    #[error("provider exited with {status}: {stderr}")]
    ExitStatus { status: String, stderr: String },

    #[error("could not parse provider output: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// One provider failed on one file. Always recoverable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{provider} failed on '{file}': {kind}")]
pub struct AdapterError {
    pub provider: String,
    pub file: String,
    pub kind: AdapterErrorKind,
}

impl AdapterError {
    pub fn new(provider: impl Into<String>, file: impl Into<String>, kind: AdapterErrorKind) -> Self {
        Self {
            provider: provider.into(),
            file: file.into(),
            kind,
        }
    }
}

/// Errors from the embedding provider and the vector index
#[derive(Error, Debug, Clone)]
pub enum VectorError {
    #[error("Semantic search unavailable: {reason}")]
    EmbeddingUnavailable { reason: String },

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(
        "Vector index was built with model '{stored}' but '{configured}' is configured. Re-embedding required"
    )]
    ModelMismatch { stored: String, configured: String },

    #[error("Vector storage error at '{path}': {reason}")]
    Storage { path: PathBuf, reason: String },
}

/// Result type alias for index operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Helper trait for adding context to errors
pub trait ErrorContext<T> {
    /// Add context to an error
    fn context(self, msg: &str) -> Result<T, IndexError>;

    /// Add context with a path
    fn with_path(self, path: &std::path::Path) -> Result<T, IndexError>;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, msg: &str) -> Result<T, IndexError> {
        self.map_err(|e| IndexError::General(format!("{msg}: {e}")))
    }

    fn with_path(self, path: &std::path::Path) -> Result<T, IndexError> {
        self.map_err(|e| IndexError::Persistence {
            path: path.to_path_buf(),
            source: Box::new(e),
        })
    }
}
