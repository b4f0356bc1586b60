//! Canonical merged symbol record.

use crate::types::{Severity, Span, SymbolId, SymbolKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Fields whose provenance is tracked per symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Kind,
    Span,
    Signature,
    DocComment,
    Complexity,
    CallEdges,
    Diagnostics,
}

/// A static-analysis finding or merge note attached to a symbol span
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub provider: String,
    pub severity: Severity,
    pub message: String,
    pub line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolId,
    pub name: String,
    pub kind: SymbolKind,
    /// Enclosing struct/union/enum for fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub end_line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<u32>,
    #[serde(default)]
    pub callers: BTreeSet<SymbolId>,
    #[serde(default)]
    pub callees: BTreeSet<SymbolId>,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
    /// Filled from the vector index on request, never persisted with the record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_vector: Option<Vec<f32>>,
    /// Providers that supplied each field, winner first
    #[serde(default)]
    pub source_confidence: BTreeMap<Field, Vec<String>>,
}

impl Symbol {
    pub fn new(file: &str, name: &str, kind: SymbolKind, scope: Option<String>, span: Span) -> Self {
        let qualified = qualified_name(scope.as_deref(), name);
        Self {
            id: SymbolId::derive(file, &qualified, kind, span.line),
            name: name.to_string(),
            kind,
            scope,
            signature: None,
            file: file.to_string(),
            line: span.line,
            column: span.column,
            end_line: span.end_line,
            doc_comment: None,
            complexity: None,
            callers: BTreeSet::new(),
            callees: BTreeSet::new(),
            diagnostics: Vec::new(),
            embedding_vector: None,
            source_confidence: BTreeMap::new(),
        }
    }

    pub fn span(&self) -> Span {
        Span::new(self.line, self.column, self.end_line)
    }

    pub fn qualified_name(&self) -> String {
        qualified_name(self.scope.as_deref(), &self.name)
    }

    /// Providers recorded for a field, winner first
    pub fn providers_for(&self, field: Field) -> &[String] {
        self.source_confidence
            .get(&field)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

pub fn qualified_name(scope: Option<&str>, name: &str) -> String {
    match scope {
        Some(scope) if !scope.is_empty() => format!("{scope}::{name}"),
        _ => name.to_string(),
    }
}
