//! Text representation of a symbol for embedding

use crate::indexing::calculate_hash;
use crate::symbol::Symbol;

/// Build the text embedded for `symbol`: kind and name, signature, doc
/// comment, then up to `context_lines` lines of the declaration from
/// `source`. The result is cut to at most `max_chars` bytes on a char
/// boundary.
pub fn symbol_text(symbol: &Symbol, source: &str, context_lines: usize, max_chars: usize) -> String {
    let mut parts = vec![format!("{} {}", symbol.kind, symbol.qualified_name())];
    if let Some(signature) = &symbol.signature {
        parts.push(signature.clone());
    }
    if let Some(doc) = &symbol.doc_comment {
        parts.push(doc.clone());
    }

    if context_lines > 0 && symbol.line > 0 {
        let start = symbol.line as usize - 1;
        let span = (symbol.end_line - symbol.line) as usize + 1;
        let body: Vec<&str> = source
            .lines()
            .skip(start)
            .take(span.min(context_lines))
            .map(str::trim_end)
            .collect();
        if !body.is_empty() {
            parts.push(body.join("\n"));
        }
    }

    let mut text = parts.join("\n");
    truncate_at_char_boundary(&mut text, max_chars);
    text
}

/// Detects when a symbol's embedded text changed
pub fn text_hash(text: &str) -> String {
    calculate_hash(text.as_bytes())
}

fn truncate_at_char_boundary(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Span, SymbolKind};

    const SOURCE: &str = "/* Adds two numbers. */\nint add(int a, int b)\n{\n    return a + b;\n}\n";

    fn add() -> Symbol {
        let mut symbol = Symbol::new("a.c", "add", SymbolKind::Function, None, Span::new(2, 5, 5));
        symbol.signature = Some("int add(int a, int b)".into());
        symbol.doc_comment = Some("Adds two numbers.".into());
        symbol
    }

    #[test]
    fn test_text_includes_context() {
        let text = symbol_text(&add(), SOURCE, 8, 1024);
        assert!(text.starts_with("function add\nint add(int a, int b)\nAdds two numbers."));
        assert!(text.contains("return a + b;"));
    }

    #[test]
    fn test_context_lines_bound_body() {
        let text = symbol_text(&add(), SOURCE, 1, 1024);
        assert!(!text.contains("return"));
    }

    #[test]
    fn test_truncation_respects_char_boundary() {
        let mut symbol = add();
        symbol.doc_comment = Some("é".repeat(100));
        let text = symbol_text(&symbol, SOURCE, 0, 40);
        assert!(text.len() <= 40);
        assert!(text.is_char_boundary(text.len()));
    }

    #[test]
    fn test_hash_tracks_text() {
        assert_eq!(text_hash("a"), text_hash("a"));
        assert_ne!(text_hash("a"), text_hash("b"));
    }
}
