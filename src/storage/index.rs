//! In-memory project aggregate
//!
//! [`ProjectIndex`] is the value published to readers. It is cloned and
//! modified by the store on every commit, so a reader holding an older
//! `Arc<ProjectIndex>` never observes a half-applied file.

use crate::merge::CallRef;
use crate::symbol::{Diagnostic, Symbol};
use crate::types::{SymbolId, SymbolKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// One indexed source file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Path relative to the project root, `/`-separated
    pub path: String,
    /// SHA-256 of the file bytes
    pub content_fingerprint: String,
    /// UTC seconds
    pub last_indexed_at: u64,
    /// Declared symbols in declaration order
    pub symbol_ids: Vec<SymbolId>,
    #[serde(default)]
    pub call_refs: Vec<CallRef>,
    #[serde(default)]
    pub includes: Vec<String>,
    /// Findings outside every symbol span
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
    #[serde(default)]
    pub line_count: usize,
    /// Every provider failed on the latest bytes; symbols are from an older version
    #[serde(default)]
    pub stale: bool,
}

impl FileRecord {
    pub fn new(path: impl Into<String>, content_fingerprint: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content_fingerprint: content_fingerprint.into(),
            last_indexed_at: crate::indexing::get_utc_timestamp(),
            symbol_ids: Vec::new(),
            call_refs: Vec::new(),
            includes: Vec::new(),
            diagnostics: Vec::new(),
            line_count: 0,
            stale: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProjectIndex {
    project_root: PathBuf,
    file_records: BTreeMap<String, FileRecord>,
    symbols: BTreeMap<SymbolId, Symbol>,
    /// Derived from `symbols`, never persisted
    name_index: HashMap<String, Vec<SymbolId>>,
}

impl ProjectIndex {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            ..Default::default()
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn is_empty(&self) -> bool {
        self.file_records.is_empty()
    }

    pub fn file_count(&self) -> usize {
        self.file_records.len()
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    pub fn file(&self, path: &str) -> Option<&FileRecord> {
        self.file_records.get(path)
    }

    /// File records ordered by path
    pub fn files(&self) -> impl Iterator<Item = &FileRecord> {
        self.file_records.values()
    }

    pub fn symbol(&self, id: SymbolId) -> Option<&Symbol> {
        self.symbols.get(&id)
    }

    /// All symbols ordered by id
    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }

    pub fn ids_for_name(&self, name: &str) -> &[SymbolId] {
        self.name_index
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Symbols of one file in declaration order
    pub fn file_symbols(&self, path: &str) -> Vec<&Symbol> {
        self.file(path)
            .map(|record| {
                record
                    .symbol_ids
                    .iter()
                    .filter_map(|id| self.symbols.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Replace everything known about `record.path` with the given symbols.
    /// Returns the ids that were dropped.
    pub fn replace_file(&mut self, mut record: FileRecord, symbols: Vec<Symbol>) -> Vec<SymbolId> {
        let removed = self.remove_file(&record.path).map(|(_, ids)| ids).unwrap_or_default();

        record.symbol_ids = symbols.iter().map(|s| s.id).collect();
        for symbol in symbols {
            self.name_index
                .entry(symbol.name.clone())
                .or_default()
                .push(symbol.id);
            self.symbols.insert(symbol.id, symbol);
        }
        self.file_records.insert(record.path.clone(), record);

        removed
            .into_iter()
            .filter(|id| !self.symbols.contains_key(id))
            .collect()
    }

    /// Drop a file and every symbol it owns
    pub fn remove_file(&mut self, path: &str) -> Option<(FileRecord, Vec<SymbolId>)> {
        let record = self.file_records.remove(path)?;
        for id in &record.symbol_ids {
            if let Some(symbol) = self.symbols.remove(id) {
                if let Some(ids) = self.name_index.get_mut(&symbol.name) {
                    ids.retain(|other| other != id);
                    if ids.is_empty() {
                        self.name_index.remove(&symbol.name);
                    }
                }
            }
        }
        let ids = record.symbol_ids.clone();
        Some((record, ids))
    }

    pub fn set_stale(&mut self, path: &str, stale: bool) -> bool {
        match self.file_records.get_mut(path) {
            Some(record) => {
                record.stale = stale;
                true
            }
            None => false,
        }
    }

    /// Rebuild `callers`/`callees` from every file's call references.
    ///
    /// Callee names resolve to function symbols, preferring a definition in
    /// the calling file, then the smallest `(file, line)`. Unresolved names
    /// (library calls, macros) produce no edge.
    pub fn relink_calls(&mut self) {
        let mut functions: HashMap<&str, Vec<(&str, u32, SymbolId)>> = HashMap::new();
        for symbol in self.symbols.values() {
            if symbol.kind == SymbolKind::Function {
                functions
                    .entry(symbol.name.as_str())
                    .or_default()
                    .push((symbol.file.as_str(), symbol.line, symbol.id));
            }
        }
        for candidates in functions.values_mut() {
            candidates.sort();
        }

        let mut edges: Vec<(SymbolId, SymbolId)> = Vec::new();
        for record in self.file_records.values() {
            for call in &record.call_refs {
                let Some(candidates) = functions.get(call.callee.as_str()) else {
                    continue;
                };
                let target = candidates
                    .iter()
                    .find(|(file, _, _)| *file == record.path)
                    .or_else(|| candidates.first());
                if let Some((_, _, callee)) = target {
                    edges.push((call.caller, *callee));
                }
            }
        }

        for symbol in self.symbols.values_mut() {
            symbol.callers.clear();
            symbol.callees.clear();
        }
        for (caller, callee) in edges {
            if let Some(symbol) = self.symbols.get_mut(&caller) {
                symbol.callees.insert(callee);
            }
            if let Some(symbol) = self.symbols.get_mut(&callee) {
                symbol.callers.insert(caller);
            }
        }
    }

    /// Resolved call edges across the whole index
    pub fn call_edge_count(&self) -> usize {
        self.symbols.values().map(|s| s.callees.len()).sum()
    }
}
