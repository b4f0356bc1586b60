//! Analyzer adapters
//!
//! Every external analysis provider sits behind the [`Analyzer`] trait and
//! reports what it found as a flat list of [`RawFact`]s. Adapters declare a
//! [`Capabilities`] set; the merge engine only takes a field from a provider
//! whose capabilities cover it.
//!
//! Adapters fail soft: a crash or timeout on one file becomes an
//! [`AdapterError`] for that (provider, file) pair and never aborts a sweep.

pub mod calls;
pub mod clang;
pub mod complexity;
pub mod cppcheck;
pub mod ctags;
pub mod process;
pub mod syntax;
pub mod treesitter;

use crate::config::Settings;
use crate::error::AdapterError;
use crate::symbol::Field;
use crate::types::{ProviderKind, Span, SymbolKind};
use bitflags::bitflags;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub use calls::CallGraphAnalyzer;
pub use clang::ClangAnalyzer;
pub use complexity::ComplexityAnalyzer;
pub use cppcheck::CppcheckAnalyzer;
pub use ctags::CtagsAnalyzer;
pub use syntax::SyntaxAnalyzer;

bitflags! {
    /// Fact fields a provider can legitimately fill
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u16 {
        const KINDS       = 0b0000_0000_0001;
        const SPANS       = 0b0000_0000_0010;
        const SIGNATURES  = 0b0000_0000_0100;
        const TYPES       = 0b0000_0000_1000;
        const DOCS        = 0b0000_0001_0000;
        const COMPLEXITY  = 0b0000_0010_0000;
        const CALL_EDGES  = 0b0000_0100_0000;
        const DIAGNOSTICS = 0b0000_1000_0000;
        const INCLUDES    = 0b0001_0000_0000;
    }
}

impl Capabilities {
    /// Whether this set lets a provider fill `field`
    pub fn covers(&self, field: Field) -> bool {
        let needed = match field {
            Field::Kind => Capabilities::KINDS,
            Field::Span => Capabilities::SPANS,
            Field::Signature => Capabilities::SIGNATURES,
            Field::DocComment => Capabilities::DOCS,
            Field::Complexity => Capabilities::COMPLEXITY,
            Field::CallEdges => Capabilities::CALL_EDGES,
            Field::Diagnostics => Capabilities::DIAGNOSTICS,
        };
        self.contains(needed)
    }
}

/// Attribute keys used in [`RawFact::attrs`]
pub mod attr {
    pub const SIGNATURE: &str = "signature";
    pub const TYPE: &str = "type";
    pub const PARAMS: &str = "params";
    pub const DOC: &str = "doc";
    pub const SCOPE: &str = "scope";
    pub const COMPLEXITY: &str = "complexity";
    pub const CALLER: &str = "caller";
    pub const CALLER_LINE: &str = "caller_line";
    pub const SEVERITY: &str = "severity";
    pub const MESSAGE: &str = "message";
    pub const CHECK_ID: &str = "check_id";
}

/// What a fact describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactKind {
    Symbol(SymbolKind),
    /// A call site; `name` is the callee
    Call,
    /// An `#include`; `name` is the included path
    Include,
    Diagnostic,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FactValue {
    Int(i64),
    Text(String),
    List(Vec<String>),
}

impl FactValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FactValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FactValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<&str> for FactValue {
    fn from(value: &str) -> Self {
        FactValue::Text(value.to_string())
    }
}

impl From<String> for FactValue {
    fn from(value: String) -> Self {
        FactValue::Text(value)
    }
}

impl From<i64> for FactValue {
    fn from(value: i64) -> Self {
        FactValue::Int(value)
    }
}

impl From<Vec<String>> for FactValue {
    fn from(value: Vec<String>) -> Self {
        FactValue::List(value)
    }
}

/// One normalized observation from one provider.
///
/// Attributes live in a `BTreeMap` so serialized facts are byte-identical
/// across runs on the same input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFact {
    pub provider: String,
    pub span: Span,
    pub kind_hint: FactKind,
    pub name: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, FactValue>,
}

impl RawFact {
    pub fn new(provider: &str, kind_hint: FactKind, name: impl Into<String>, span: Span) -> Self {
        Self {
            provider: provider.to_string(),
            span,
            kind_hint,
            name: name.into(),
            attrs: BTreeMap::new(),
        }
    }

    pub fn symbol(provider: &str, kind: SymbolKind, name: impl Into<String>, span: Span) -> Self {
        Self::new(provider, FactKind::Symbol(kind), name, span)
    }

    /// Builder-style attribute setter
    pub fn with(mut self, key: &str, value: impl Into<FactValue>) -> Self {
        self.attrs.insert(key.to_string(), value.into());
        self
    }

    /// Set an attribute only when a value is present
    pub fn with_opt(self, key: &str, value: Option<impl Into<FactValue>>) -> Self {
        match value {
            Some(v) => self.with(key, v),
            None => self,
        }
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(FactValue::as_text)
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        self.attrs.get(key).and_then(FactValue::as_int)
    }

    pub fn symbol_kind(&self) -> Option<SymbolKind> {
        match self.kind_hint {
            FactKind::Symbol(kind) => Some(kind),
            _ => None,
        }
    }
}

/// Input handed to an analyzer for one file
#[derive(Debug, Clone, Copy)]
pub struct AnalysisRequest<'a> {
    /// Absolute path on disk
    pub path: &'a Path,
    /// Path relative to the project root, `/`-separated
    pub relative: &'a str,
    pub root: &'a Path,
    pub source: &'a str,
    pub timeout: Duration,
}

/// Common interface for all analysis providers
pub trait Analyzer: Send + Sync {
    /// Unique provider name, recorded in fact provenance
    fn name(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    fn capabilities(&self) -> Capabilities;

    /// Analyze one file. Must be deterministic for identical bytes.
    fn analyze(&self, request: &AnalysisRequest<'_>) -> Result<Vec<RawFact>, AdapterError>;
}

/// Static description of a provider, used by the merge engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderInfo {
    pub kind: ProviderKind,
    pub capabilities: Capabilities,
}

pub type ProviderTable = BTreeMap<String, ProviderInfo>;

/// Result of running every analyzer over one file
#[derive(Debug, Default)]
pub struct FileAnalysis {
    pub facts: Vec<RawFact>,
    pub errors: Vec<AdapterError>,
    /// Providers that returned successfully
    pub succeeded: Vec<String>,
}

impl FileAnalysis {
    /// Every provider failed, so nothing trustworthy was produced
    pub fn total_failure(&self) -> bool {
        self.succeeded.is_empty() && !self.errors.is_empty()
    }
}

/// The set of analyzers run on each file
#[derive(Clone, Default)]
pub struct AnalyzerSet {
    analyzers: Vec<Arc<dyn Analyzer>>,
}

impl AnalyzerSet {
    pub fn new(analyzers: Vec<Arc<dyn Analyzer>>) -> Self {
        Self { analyzers }
    }

    /// Build the analyzers enabled in settings
    pub fn from_settings(settings: &Settings) -> Self {
        let providers = &settings.providers;
        let mut analyzers: Vec<Arc<dyn Analyzer>> = Vec::new();

        for name in &providers.enabled {
            match name.as_str() {
                "syntax" => analyzers.push(Arc::new(SyntaxAnalyzer::new())),
                "calls" => analyzers.push(Arc::new(CallGraphAnalyzer::new())),
                "complexity" => analyzers.push(Arc::new(ComplexityAnalyzer::new())),
                "ctags" => analyzers.push(Arc::new(CtagsAnalyzer::new(&providers.ctags_path))),
                "clang" => analyzers.push(Arc::new(ClangAnalyzer::new(
                    &providers.clang_path,
                    providers.clang_args.clone(),
                ))),
                "cppcheck" => {
                    analyzers.push(Arc::new(CppcheckAnalyzer::new(&providers.cppcheck_path)))
                }
                other => tracing::warn!(provider = other, "unknown provider in settings, skipping"),
            }
        }

        Self { analyzers }
    }

    pub fn push(&mut self, analyzer: Arc<dyn Analyzer>) {
        self.analyzers.push(analyzer);
    }

    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }

    pub fn provider_table(&self) -> ProviderTable {
        self.analyzers
            .iter()
            .map(|a| {
                (
                    a.name().to_string(),
                    ProviderInfo {
                        kind: a.kind(),
                        capabilities: a.capabilities(),
                    },
                )
            })
            .collect()
    }

    /// Run all analyzers on one file concurrently and join.
    ///
    /// Facts keep analyzer order so the merge input is deterministic.
    pub fn run(&self, request: &AnalysisRequest<'_>) -> FileAnalysis {
        let results: Vec<(&str, Result<Vec<RawFact>, AdapterError>)> = self
            .analyzers
            .par_iter()
            .map(|analyzer| (analyzer.name(), analyzer.analyze(request)))
            .collect();

        let mut analysis = FileAnalysis::default();
        for (name, result) in results {
            match result {
                Ok(facts) => {
                    tracing::debug!(provider = name, file = request.relative, facts = facts.len(), "provider finished");
                    analysis.facts.extend(facts);
                    analysis.succeeded.push(name.to_string());
                }
                Err(e) => {
                    tracing::warn!(provider = name, file = request.relative, "{e}");
                    analysis.errors.push(e);
                }
            }
        }
        analysis
    }
}

impl std::fmt::Debug for AnalyzerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.analyzers.iter().map(|a| a.name()))
            .finish()
    }
}
