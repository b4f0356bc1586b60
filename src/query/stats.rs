//! Aggregate statistics, computed on demand from a snapshot

use crate::storage::ProjectIndex;
use crate::types::SymbolKind;
use crate::vector::VectorIndex;
use serde::Serialize;
use std::collections::BTreeMap;

/// Functions by complexity: low ≤ 5, medium ≤ 10, high above
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ComplexityBuckets {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    /// Functions no provider scored
    pub unknown: usize,
}

impl ComplexityBuckets {
    fn add(&mut self, complexity: Option<u32>) {
        match complexity {
            Some(0..=5) => self.low += 1,
            Some(6..=10) => self.medium += 1,
            Some(_) => self.high += 1,
            None => self.unknown += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStatistics {
    pub files: usize,
    pub symbols: usize,
    pub lines: usize,
    pub by_kind: BTreeMap<SymbolKind, usize>,
    pub stale_files: usize,
    pub call_edges: usize,
    pub include_edges: usize,
    pub diagnostics: usize,
    /// Symbols with a vector in the index
    pub embedded: usize,
    pub complexity: ComplexityBuckets,
}

pub fn get_statistics(project: &ProjectIndex, vectors: Option<&VectorIndex>) -> IndexStatistics {
    let mut stats = IndexStatistics {
        files: project.file_count(),
        symbols: project.symbol_count(),
        call_edges: project.call_edge_count(),
        ..Default::default()
    };

    for record in project.files() {
        stats.lines += record.line_count;
        stats.include_edges += record.includes.len();
        stats.diagnostics += record.diagnostics.len();
        if record.stale {
            stats.stale_files += 1;
        }
    }

    for symbol in project.symbols() {
        *stats.by_kind.entry(symbol.kind).or_default() += 1;
        stats.diagnostics += symbol.diagnostics.len();
        if symbol.kind == SymbolKind::Function {
            stats.complexity.add(symbol.complexity);
        }
        if vectors.is_some_and(|v| v.contains(symbol.id)) {
            stats.embedded += 1;
        }
    }

    stats
}
