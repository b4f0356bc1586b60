//! Call-graph queries.
//!
//! C call graphs are cyclic through recursion, so traversal tracks visited
//! ids and stops at a depth cap.

use super::{QueryResult, QueryStatus, sort_by_location};
use crate::storage::ProjectIndex;
use crate::symbol::Symbol;
use crate::types::SymbolId;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Follow edges towards functions that call the start symbol
    Callers,
    /// Follow edges towards functions the start symbol calls
    Callees,
}

fn neighbors(symbol: &Symbol, direction: Direction) -> impl Iterator<Item = SymbolId> + '_ {
    match direction {
        Direction::Callers => symbol.callers.iter().copied(),
        Direction::Callees => symbol.callees.iter().copied(),
    }
}

fn direct(project: &ProjectIndex, id: SymbolId, direction: Direction) -> QueryResult<Symbol> {
    if project.is_empty() {
        return QueryResult::empty(QueryStatus::IndexEmpty);
    }
    let Some(symbol) = project.symbol(id) else {
        return QueryResult::empty(QueryStatus::UnknownSymbol);
    };
    let mut related: Vec<Symbol> = neighbors(symbol, direction)
        .filter_map(|other| project.symbol(other).cloned())
        .collect();
    sort_by_location(&mut related);
    QueryResult::ok(related)
}

/// Functions that call `id`
pub fn get_callers(project: &ProjectIndex, id: SymbolId) -> QueryResult<Symbol> {
    direct(project, id, Direction::Callers)
}

/// Functions `id` calls
pub fn get_callees(project: &ProjectIndex, id: SymbolId) -> QueryResult<Symbol> {
    direct(project, id, Direction::Callees)
}

/// Breadth-first walk from `id`, returning each reachable symbol once with
/// the depth it was first reached at (1 for direct neighbors). The start
/// symbol is never part of the result, even when it is reachable from itself.
pub fn traverse_calls(
    project: &ProjectIndex,
    id: SymbolId,
    direction: Direction,
    max_depth: u32,
) -> QueryResult<(Symbol, u32)> {
    if project.is_empty() {
        return QueryResult::empty(QueryStatus::IndexEmpty);
    }
    if project.symbol(id).is_none() {
        return QueryResult::empty(QueryStatus::UnknownSymbol);
    }

    let mut visited = HashSet::from([id]);
    let mut queue = VecDeque::from([(id, 0u32)]);
    let mut reached = Vec::new();

    while let Some((current, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        let Some(symbol) = project.symbol(current) else {
            continue;
        };
        // Sorted so the walk order does not depend on id values
        let mut next: Vec<&Symbol> = neighbors(symbol, direction)
            .filter(|other| visited.insert(*other))
            .filter_map(|other| project.symbol(other))
            .collect();
        next.sort_by(|a, b| (a.file.as_str(), a.line).cmp(&(b.file.as_str(), b.line)));
        for neighbor in next {
            queue.push_back((neighbor.id, depth + 1));
            reached.push((neighbor.clone(), depth + 1));
        }
    }

    QueryResult::ok(reached)
}
