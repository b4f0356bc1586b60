//! Shared tree-sitter helpers for the in-process C providers.

use crate::types::Span;
use tree_sitter::{Node, Parser, Tree};

/// Guard against stack overflow on pathological nesting
pub const MAX_DEPTH: usize = 512;

pub fn parse(source: &str) -> Result<Tree, String> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_c::LANGUAGE.into())
        .map_err(|e| format!("Failed to set C language: {e}"))?;
    parser
        .parse(source, None)
        .ok_or_else(|| "tree-sitter returned no tree".to_string())
}

pub fn text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    source.get(node.byte_range()).unwrap_or("")
}

/// 1-based span of a node
pub fn span_of(node: Node<'_>) -> Span {
    let start = node.start_position();
    let end = node.end_position();
    Span::new(start.row as u32 + 1, start.column as u32 + 1, end.row as u32 + 1)
}

/// Collapse runs of whitespace into single spaces
pub fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Find the identifier naming a function inside its (possibly nested) declarator
pub fn function_name(declarator: Node<'_>) -> Option<Node<'_>> {
    match declarator.kind() {
        "identifier" => Some(declarator),
        "function_declarator" | "parenthesized_declarator" | "pointer_declarator"
        | "attributed_declarator" => {
            if let Some(inner) = declarator.child_by_field_name("declarator") {
                return function_name(inner);
            }
            let mut cursor = declarator.walk();
            let found = declarator
                .named_children(&mut cursor)
                .find_map(function_name);
            found
        }
        _ => None,
    }
}

/// Find the identifier a variable, field, or typedef declarator introduces
pub fn declarator_name(node: Node<'_>) -> Option<Node<'_>> {
    match node.kind() {
        "identifier" | "field_identifier" | "type_identifier" => Some(node),
        "parameter_list" => None,
        _ => {
            if let Some(inner) = node.child_by_field_name("declarator") {
                return declarator_name(inner);
            }
            let mut cursor = node.walk();
            let found = node.named_children(&mut cursor).find_map(declarator_name);
            found
        }
    }
}

/// A declarator that declares a function (a prototype), not a function pointer
pub fn is_function_declarator(node: Node<'_>) -> bool {
    match node.kind() {
        "function_declarator" => node
            .child_by_field_name("declarator")
            .is_some_and(|inner| inner.kind() == "identifier"),
        "init_declarator" | "pointer_declarator" | "attributed_declarator" => node
            .child_by_field_name("declarator")
            .is_some_and(is_function_declarator),
        _ => false,
    }
}

/// Node kinds whose children sit at file scope
pub fn is_file_scope_container(kind: &str) -> bool {
    matches!(
        kind,
        "translation_unit"
            | "preproc_if"
            | "preproc_ifdef"
            | "preproc_else"
            | "preproc_elif"
            | "preproc_elifdef"
            | "linkage_specification"
            | "declaration_list"
    )
}

/// Call `f(definition, name)` for every function definition at file scope
pub fn for_each_function<'t>(node: Node<'t>, source: &str, f: &mut impl FnMut(Node<'t>, &str)) {
    visit_functions(node, source, f, 0);
}

fn visit_functions<'t>(
    node: Node<'t>,
    source: &str,
    f: &mut impl FnMut(Node<'t>, &str),
    depth: usize,
) {
    if depth > MAX_DEPTH {
        return;
    }
    if node.kind() == "function_definition" {
        if let Some(name) = node
            .child_by_field_name("declarator")
            .and_then(function_name)
        {
            f(node, text(name, source));
        }
        return;
    }
    if is_file_scope_container(node.kind()) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            visit_functions(child, source, f, depth + 1);
        }
    }
}
