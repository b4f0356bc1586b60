//! Configuration for the indexer.
//!
//! Layered configuration:
//! - Default values
//! - TOML configuration file (`.codeweave/settings.toml`)
//! - Environment variable overrides
//! - CLI argument overrides (applied by the binary)
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `CW_` and use double underscores
//! to separate nested levels:
//! - `CW_INDEXING__PARALLEL_THREADS=8` sets `indexing.parallel_threads`
//! - `CW_SEMANTIC_SEARCH__ENABLED=false` sets `semantic_search.enabled`
//! - `CW_LOGGING__LEVEL=debug` sets `logging.level`

use crate::types::{ProviderKind, Severity};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_DIR: &str = ".codeweave";
pub const IGNORE_FILE: &str = ".codeweaveignore";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Path to the index directory, relative paths resolve against the project root
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Workspace root directory (where .codeweave is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    #[serde(default)]
    pub indexing: IndexingConfig,

    #[serde(default)]
    pub providers: ProvidersConfig,

    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,

    #[serde(default)]
    pub semantic_search: SemanticSearchConfig,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexingConfig {
    /// Number of parallel threads for analysis
    #[serde(default = "default_parallel_threads")]
    pub parallel_threads: usize,

    /// File extensions treated as C sources
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Patterns to ignore during indexing (gitignore syntax)
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Upper bound for a single provider invocation
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_secs: u64,

    /// Files larger than this are skipped
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Files committed between two published snapshots during a sweep
    #[serde(default = "default_commit_batch_size")]
    pub commit_batch_size: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    /// Providers to run, by name
    #[serde(default = "default_enabled_providers")]
    pub enabled: Vec<String>,

    /// Merge priority, highest first
    #[serde(default = "default_priority")]
    pub priority: Vec<ProviderKind>,

    #[serde(default = "default_ctags_path")]
    pub ctags_path: PathBuf,

    #[serde(default = "default_clang_path")]
    pub clang_path: PathBuf,

    #[serde(default = "default_cppcheck_path")]
    pub cppcheck_path: PathBuf,

    /// Extra arguments for clang, e.g. `-Iinclude` or `-DDEBUG`
    #[serde(default)]
    pub clang_args: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DiagnosticsConfig {
    /// Findings below this severity are dropped
    #[serde(default = "default_min_severity")]
    pub min_severity: Severity,

    /// Keep `information` findings regardless of `min_severity`
    #[serde(default = "default_false")]
    pub include_info: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SemanticSearchConfig {
    /// Enable semantic search
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Model to use for embeddings
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Similarity threshold for search results
    #[serde(default = "default_similarity_threshold")]
    pub threshold: f32,

    /// Lines of body text included in a symbol's embedding text
    #[serde(default = "default_context_lines")]
    pub context_lines: usize,

    /// Upper bound on the embedding text length
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,

    #[serde(default = "default_limit")]
    pub default_limit: usize,

    #[serde(default = "default_max_limit")]
    pub max_limit: usize,

    /// Upper bound for a single embedding batch
    #[serde(default = "default_embed_timeout")]
    pub embed_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchConfig {
    /// How long to wait after the last change before re-indexing
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_index_path() -> PathBuf {
    PathBuf::from(".codeweave/index")
}
fn default_parallel_threads() -> usize {
    num_cpus::get()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_extensions() -> Vec<String> {
    vec!["c".to_string(), "h".to_string()]
}
fn default_provider_timeout() -> u64 {
    30
}
fn default_max_file_size() -> u64 {
    2 * 1024 * 1024
}
fn default_commit_batch_size() -> usize {
    256
}
fn default_enabled_providers() -> Vec<String> {
    ["syntax", "calls", "complexity", "ctags", "clang", "cppcheck"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_priority() -> Vec<ProviderKind> {
    vec![
        ProviderKind::Semantic,
        ProviderKind::Syntax,
        ProviderKind::Tags,
        ProviderKind::Complexity,
        ProviderKind::BugFinder,
        ProviderKind::CallGraph,
    ]
}
fn default_ctags_path() -> PathBuf {
    PathBuf::from("ctags")
}
fn default_clang_path() -> PathBuf {
    PathBuf::from("clang")
}
fn default_cppcheck_path() -> PathBuf {
    PathBuf::from("cppcheck")
}
fn default_min_severity() -> Severity {
    Severity::Style
}
fn default_embedding_model() -> String {
    "AllMiniLML6V2".to_string()
}
fn default_similarity_threshold() -> f32 {
    0.0
}
fn default_context_lines() -> usize {
    8
}
fn default_max_text_chars() -> usize {
    1024
}
fn default_limit() -> usize {
    20
}
fn default_max_limit() -> usize {
    100
}
fn default_embed_timeout() -> u64 {
    60
}
fn default_debounce_ms() -> u64 {
    500
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            index_path: default_index_path(),
            workspace_root: None,
            indexing: IndexingConfig::default(),
            providers: ProvidersConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
            semantic_search: SemanticSearchConfig::default(),
            watch: WatchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            parallel_threads: default_parallel_threads(),
            extensions: default_extensions(),
            ignore_patterns: vec![],
            provider_timeout_secs: default_provider_timeout(),
            max_file_size: default_max_file_size(),
            commit_batch_size: default_commit_batch_size(),
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_providers(),
            priority: default_priority(),
            ctags_path: default_ctags_path(),
            clang_path: default_clang_path(),
            cppcheck_path: default_cppcheck_path(),
            clang_args: vec![],
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            min_severity: default_min_severity(),
            include_info: false,
        }
    }
}

impl Default for SemanticSearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: default_embedding_model(),
            threshold: default_similarity_threshold(),
            context_lines: default_context_lines(),
            max_text_chars: default_max_text_chars(),
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            embed_timeout_secs: default_embed_timeout(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ProvidersConfig {
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.iter().any(|p| p == name)
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));

        Self::figment(config_path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref().to_path_buf())
            .extract()
            .map_err(Box::new)
    }

    fn figment(config_path: PathBuf) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            // Double underscore separates nested levels, single underscores stay in field names
            .merge(Env::prefixed("CW_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Find the settings file by looking for .codeweave from the current directory up
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join("settings.toml"))
    }

    /// Get the workspace root directory (where .codeweave is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .find(|ancestor| ancestor.join(CONFIG_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    /// Index directory for a project, resolving relative paths against the project root
    pub fn index_dir(&self, project_root: &Path) -> PathBuf {
        if self.index_path.is_absolute() {
            self.index_path.clone()
        } else {
            project_root.join(&self.index_path)
        }
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Write a default settings file and ignore file under `root`
    pub fn init_config_file(root: &Path, force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = root.join(CONFIG_DIR).join("settings.toml");

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let body = toml::to_string_pretty(&Settings::default())?;
        let template = format!(
            "# codeweave configuration\n\
             # Environment overrides use the CW_ prefix, e.g. CW_INDEXING__PARALLEL_THREADS=4\n\
             # Provider names: syntax, calls, complexity, ctags, clang, cppcheck\n\
             # Priority kinds: semantic, syntax, tags, complexity, bugfinder, callgraph\n\n\
             {body}"
        );
        std::fs::write(&config_path, template)?;

        Self::create_default_ignore_file(root, force)?;

        Ok(config_path)
    }

    fn create_default_ignore_file(root: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
        let ignore_path = root.join(IGNORE_FILE);

        if !force && ignore_path.exists() {
            return Ok(());
        }

        let default_content = r#"# codeweave ignore patterns (gitignore syntax)

# Build artifacts
build/
out/
*.o
*.a
*.so

# Generated sources
*.generated.c
*.generated.h

# Index directory
.codeweave/

# Third-party code
vendor/
third_party/
"#;

        std::fs::write(&ignore_path, default_content)?;
        Ok(())
    }
}
