//! Read-only queries over an index snapshot.
//!
//! Every operation takes the snapshot explicitly and never fails: an empty
//! index, an unknown id, or an unavailable embedding model come back as a
//! [`QueryStatus`] next to an empty result list.

mod graph;
mod semantic;
mod stats;

pub use graph::{Direction, get_callees, get_callers, traverse_calls};
pub use semantic::search_semantic;
pub use stats::{ComplexityBuckets, IndexStatistics, get_statistics};

use crate::storage::ProjectIndex;
use crate::symbol::Symbol;
use crate::types::SymbolKind;
use serde::Serialize;
use std::fmt;

/// Why a query returned what it returned
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum QueryStatus {
    Ok,
    /// The query ran but matched nothing
    NotFound,
    /// Nothing has been indexed yet
    IndexEmpty,
    /// The symbol id is not in the index
    UnknownSymbol,
    SemanticUnavailable(String),
}

impl QueryStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, QueryStatus::Ok)
    }

    /// Exit code for the CLI: 0 on success, 3 when nothing matched, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        match self {
            QueryStatus::Ok => 0,
            QueryStatus::NotFound | QueryStatus::UnknownSymbol => 3,
            QueryStatus::IndexEmpty | QueryStatus::SemanticUnavailable(_) => 1,
        }
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryStatus::Ok => f.write_str("ok"),
            QueryStatus::NotFound => f.write_str("no matching symbols"),
            QueryStatus::IndexEmpty => {
                f.write_str("the index is empty, run 'codeweave index' first")
            }
            QueryStatus::UnknownSymbol => f.write_str("unknown symbol id"),
            QueryStatus::SemanticUnavailable(reason) => {
                write!(f, "semantic search unavailable: {reason}")
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResult<T> {
    pub items: Vec<T>,
    pub status: QueryStatus,
}

impl<T> QueryResult<T> {
    pub fn ok(items: Vec<T>) -> Self {
        Self {
            items,
            status: QueryStatus::Ok,
        }
    }

    /// `Ok` with items, `NotFound` without
    pub fn found(items: Vec<T>) -> Self {
        let status = if items.is_empty() {
            QueryStatus::NotFound
        } else {
            QueryStatus::Ok
        };
        Self { items, status }
    }

    pub fn empty(status: QueryStatus) -> Self {
        Self {
            items: Vec::new(),
            status,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A semantic search hit
#[derive(Debug, Clone, Serialize)]
pub struct ScoredSymbol {
    pub symbol: Symbol,
    pub score: f32,
}

/// A file whose `#include` list names a header
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncludingFile {
    pub file: String,
    /// The include as written, without quotes or angle brackets
    pub include: String,
}

/// Source order: file, then line, then name
pub(crate) fn sort_by_location(symbols: &mut [Symbol]) {
    symbols.sort_by(|a, b| {
        (a.file.as_str(), a.line, a.name.as_str(), a.id).cmp(&(b.file.as_str(), b.line, b.name.as_str(), b.id))
    });
}

/// Exact lookup by unqualified name
pub fn search_exact(project: &ProjectIndex, name: &str) -> QueryResult<Symbol> {
    if project.is_empty() {
        return QueryResult::empty(QueryStatus::IndexEmpty);
    }
    let mut symbols: Vec<Symbol> = project
        .ids_for_name(name)
        .iter()
        .filter_map(|id| project.symbol(*id).cloned())
        .collect();
    sort_by_location(&mut symbols);
    QueryResult::found(symbols)
}

pub fn get_symbols_by_kind(project: &ProjectIndex, kind: SymbolKind) -> QueryResult<Symbol> {
    if project.is_empty() {
        return QueryResult::empty(QueryStatus::IndexEmpty);
    }
    let mut symbols: Vec<Symbol> = project.symbols().filter(|s| s.kind == kind).cloned().collect();
    sort_by_location(&mut symbols);
    QueryResult::found(symbols)
}

/// Symbols declared in one file, in declaration order
pub fn get_file_symbols(project: &ProjectIndex, path: &str) -> QueryResult<Symbol> {
    if project.is_empty() {
        return QueryResult::empty(QueryStatus::IndexEmpty);
    }
    let symbols = project.file_symbols(path).into_iter().cloned().collect();
    QueryResult::found(symbols)
}

/// Files that include `header`, by exact name or trailing path suffix
pub fn get_files_including(project: &ProjectIndex, header: &str) -> QueryResult<IncludingFile> {
    if project.is_empty() {
        return QueryResult::empty(QueryStatus::IndexEmpty);
    }
    let header = header.trim_matches(|c| c == '"' || c == '<' || c == '>');
    let suffix = format!("/{header}");
    let suffix = suffix.as_str();
    let files = project
        .files()
        .flat_map(|record| {
            record
                .includes
                .iter()
                .filter(move |include| *include == header || include.ends_with(suffix))
                .map(move |include| IncludingFile {
                    file: record.path.clone(),
                    include: include.clone(),
                })
        })
        .collect();
    QueryResult::found(files)
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::merge::CallRef;
    use crate::storage::{FileRecord, ProjectIndex};
    use crate::symbol::Symbol;
    use crate::types::{Span, SymbolKind};

    pub fn function(file: &str, name: &str, line: u32) -> Symbol {
        Symbol::new(file, name, SymbolKind::Function, None, Span::new(line, 1, line + 3))
    }

    /// Insert a file with its symbols and call references, then relink
    pub fn add_file(project: &mut ProjectIndex, path: &str, symbols: Vec<Symbol>, calls: &[(&Symbol, &str)]) {
        let mut record = FileRecord::new(path, format!("fp-{path}"));
        record.call_refs = calls
            .iter()
            .map(|(caller, callee)| CallRef {
                caller: caller.id,
                callee: callee.to_string(),
                line: caller.line + 1,
            })
            .collect();
        record.line_count = symbols.iter().map(|s| s.end_line as usize).max().unwrap_or(0);
        project.replace_file(record, symbols);
        project.relink_calls();
    }
}
