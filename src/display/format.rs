//! Plain-text rendering of query results

use crate::query::IndexStatistics;
use crate::symbol::Symbol;
use chrono::{DateTime, Utc};

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Text }
    }
}

/// One line per symbol: kind, qualified name, location, id, then signature
pub fn format_symbol(symbol: &Symbol) -> String {
    let mut line = format!(
        "{:<9} {:<32} {}:{}  [{}]",
        symbol.kind.as_str(),
        symbol.qualified_name(),
        symbol.file,
        symbol.line,
        symbol.id
    );
    if let Some(signature) = &symbol.signature {
        line.push_str("\n          ");
        line.push_str(signature);
    }
    line
}

/// Unix seconds as "YYYY-MM-DD HH:MM:SS UTC"
pub fn format_timestamp(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|s| DateTime::<Utc>::from_timestamp(s, 0))
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| secs.to_string())
}

pub fn print_statistics(stats: &IndexStatistics) {
    println!("Index statistics:");
    println!("  Files: {}", stats.files);
    println!("  Lines: {}", stats.lines);
    println!("  Symbols: {}", stats.symbols);
    for (kind, count) in &stats.by_kind {
        println!("    {:<9} {count}", kind.as_str());
    }
    if stats.stale_files > 0 {
        println!("  Stale files: {}", stats.stale_files);
    }
    println!("  Call edges: {}", stats.call_edges);
    println!("  Include edges: {}", stats.include_edges);
    println!("  Diagnostics: {}", stats.diagnostics);
    println!("  Embedded symbols: {}", stats.embedded);
    let c = &stats.complexity;
    println!(
        "  Function complexity: {} low, {} medium, {} high, {} unscored",
        c.low, c.medium, c.high, c.unknown
    );
}
