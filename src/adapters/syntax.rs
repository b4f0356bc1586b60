//! Syntax-tree provider backed by tree-sitter-c.
//!
//! Reports file-scope declarations (function definitions, variables,
//! struct/union/enum definitions with their fields, typedefs and macros),
//! their signatures and leading comments, plus `#include` directives.
//! Prototypes and enumerators are not reported.

use super::treesitter::{self, MAX_DEPTH, collapse_ws, declarator_name, span_of, text};
use super::{AnalysisRequest, Analyzer, Capabilities, FactKind, RawFact, attr};
use crate::error::{AdapterError, AdapterErrorKind};
use crate::types::{ProviderKind, Span, SymbolKind};
use tree_sitter::Node;

pub const NAME: &str = "syntax";

#[derive(Debug, Default)]
pub struct SyntaxAnalyzer;

impl SyntaxAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Extract facts from C source
    pub fn extract(source: &str) -> Result<Vec<RawFact>, String> {
        let tree = treesitter::parse(source)?;
        let mut extractor = Extractor {
            source,
            facts: Vec::new(),
        };
        extractor.visit_scope(tree.root_node(), 0);
        Ok(extractor.facts)
    }
}

impl Analyzer for SyntaxAnalyzer {
    fn name(&self) -> &str {
        NAME
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Syntax
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::KINDS
            | Capabilities::SPANS
            | Capabilities::SIGNATURES
            | Capabilities::DOCS
            | Capabilities::INCLUDES
    }

    fn analyze(&self, request: &AnalysisRequest<'_>) -> Result<Vec<RawFact>, AdapterError> {
        Self::extract(request.source)
            .map_err(|e| AdapterError::new(NAME, request.relative, AdapterErrorKind::Parse(e)))
    }
}

struct Extractor<'s> {
    source: &'s str,
    facts: Vec<RawFact>,
}

impl<'s> Extractor<'s> {
    fn visit_scope(&mut self, node: Node<'_>, depth: usize) {
        if depth > MAX_DEPTH {
            return;
        }
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.visit_item(child, depth + 1);
        }
    }

    fn visit_item(&mut self, node: Node<'_>, depth: usize) {
        match node.kind() {
            "function_definition" => self.function(node),
            "declaration" => self.declaration(node, depth),
            "type_definition" => self.type_definition(node, depth),
            "struct_specifier" | "union_specifier" | "enum_specifier" => {
                self.aggregate(node, node, None, depth)
            }
            "preproc_def" | "preproc_function_def" => self.macro_definition(node),
            "preproc_include" => self.include(node),
            kind if treesitter::is_file_scope_container(kind) => self.visit_scope(node, depth),
            _ => {}
        }
    }

    fn function(&mut self, node: Node<'_>) {
        let Some(name) = node
            .child_by_field_name("declarator")
            .and_then(treesitter::function_name)
        else {
            return;
        };

        let head_end = node
            .child_by_field_name("body")
            .map_or(node.end_byte(), |body| body.start_byte());
        let signature = collapse_ws(self.source.get(node.start_byte()..head_end).unwrap_or(""));
        let return_type = node
            .child_by_field_name("type")
            .map(|t| collapse_ws(text(t, self.source)));
        let params = node
            .child_by_field_name("declarator")
            .and_then(find_parameter_list)
            .map(|p| collapse_ws(text(p, self.source)));

        let fact = RawFact::symbol(NAME, SymbolKind::Function, text(name, self.source), self.span(node, name))
            .with(attr::SIGNATURE, signature)
            .with_opt(attr::TYPE, return_type)
            .with_opt(attr::PARAMS, params)
            .with_opt(attr::DOC, self.doc_comment(node));
        self.facts.push(fact);
    }

    fn declaration(&mut self, node: Node<'_>, depth: usize) {
        let type_node = node.child_by_field_name("type");
        if let Some(ty) = type_node {
            self.aggregate(ty, node, None, depth);
        }
        let type_text = type_node
            .map(|t| self.type_head(t))
            .unwrap_or_default();

        let mut cursor = node.walk();
        let declarators: Vec<Node<'_>> = node.children_by_field_name("declarator", &mut cursor).collect();
        for declarator in declarators {
            if treesitter::is_function_declarator(declarator) {
                continue;
            }
            let Some(name) = declarator_name(declarator) else {
                continue;
            };
            let shown = match declarator.kind() {
                "init_declarator" => declarator.child_by_field_name("declarator").unwrap_or(declarator),
                _ => declarator,
            };
            let signature = collapse_ws(&format!("{type_text} {}", text(shown, self.source)));
            let fact = RawFact::symbol(NAME, SymbolKind::Variable, text(name, self.source), self.span(node, name))
                .with(attr::SIGNATURE, signature)
                .with(attr::TYPE, type_text.clone())
                .with_opt(attr::DOC, self.doc_comment(node));
            self.facts.push(fact);
        }
    }

    fn type_definition(&mut self, node: Node<'_>, depth: usize) {
        let mut cursor = node.walk();
        let declarators: Vec<Node<'_>> = node.children_by_field_name("declarator", &mut cursor).collect();
        let first_alias = declarators
            .iter()
            .find_map(|d| declarator_name(*d))
            .map(|n| text(n, self.source).to_string());

        let type_node = node.child_by_field_name("type");
        if let Some(ty) = type_node {
            // Fields of an anonymous aggregate belong to the typedef name
            self.aggregate(ty, node, first_alias.as_deref(), depth);
        }
        let type_text = type_node.map(|t| self.type_head(t)).unwrap_or_default();

        for declarator in declarators {
            let Some(name) = declarator_name(declarator) else {
                continue;
            };
            let signature = collapse_ws(&format!("typedef {type_text} {}", text(declarator, self.source)));
            let fact = RawFact::symbol(NAME, SymbolKind::Typedef, text(name, self.source), self.span(node, name))
                .with(attr::SIGNATURE, signature)
                .with(attr::TYPE, type_text.clone())
                .with_opt(attr::DOC, self.doc_comment(node));
            self.facts.push(fact);
        }
    }

    /// Emit a struct/union/enum definition and its fields.
    ///
    /// `anchor` is the item the leading comment is attached to.
    fn aggregate(&mut self, node: Node<'_>, anchor: Node<'_>, alias: Option<&str>, depth: usize) {
        if depth > MAX_DEPTH {
            return;
        }
        let kind = match node.kind() {
            "struct_specifier" => SymbolKind::Struct,
            "union_specifier" => SymbolKind::Union,
            "enum_specifier" => SymbolKind::Enum,
            _ => return,
        };
        let Some(body) = node.child_by_field_name("body") else {
            return;
        };

        let name = node.child_by_field_name("name");
        if let Some(name) = name {
            let name_text = text(name, self.source);
            let keyword = kind.as_str();
            let fact = RawFact::symbol(NAME, kind, name_text, self.span(node, name))
                .with(attr::SIGNATURE, format!("{keyword} {name_text}"))
                .with_opt(attr::DOC, self.doc_comment(anchor));
            self.facts.push(fact);
        }

        if kind == SymbolKind::Enum {
            return;
        }
        let scope = name
            .map(|n| text(n, self.source).to_string())
            .or_else(|| alias.map(str::to_string));

        let mut cursor = body.walk();
        for field in body.named_children(&mut cursor) {
            if field.kind() != "field_declaration" {
                continue;
            }
            let field_type = field.child_by_field_name("type");
            if let Some(ty) = field_type {
                self.aggregate(ty, field, None, depth + 1);
            }
            let type_text = field_type.map(|t| self.type_head(t)).unwrap_or_default();

            let mut field_cursor = field.walk();
            for declarator in field.children_by_field_name("declarator", &mut field_cursor) {
                let Some(field_name) = declarator_name(declarator) else {
                    continue;
                };
                let signature = collapse_ws(&format!("{type_text} {}", text(declarator, self.source)));
                let fact = RawFact::symbol(NAME, SymbolKind::Field, text(field_name, self.source), self.span(field, field_name))
                    .with(attr::SIGNATURE, signature)
                    .with(attr::TYPE, type_text.clone())
                    .with_opt(attr::SCOPE, scope.clone())
                    .with_opt(attr::DOC, self.doc_comment(field));
                self.facts.push(fact);
            }
        }
    }

    fn macro_definition(&mut self, node: Node<'_>) {
        let Some(name) = node.child_by_field_name("name") else {
            return;
        };
        let name_text = text(name, self.source);
        let signature = match node.child_by_field_name("parameters") {
            Some(params) => format!("#define {name_text}{}", collapse_ws(text(params, self.source))),
            None => format!("#define {name_text}"),
        };
        let fact = RawFact::symbol(NAME, SymbolKind::Macro, name_text, self.span(node, name))
            .with(attr::SIGNATURE, signature)
            .with_opt(attr::DOC, self.doc_comment(node));
        self.facts.push(fact);
    }

    fn include(&mut self, node: Node<'_>) {
        if let Some(path) = node.child_by_field_name("path") {
            let clean = text(path, self.source).trim_matches(|c| c == '"' || c == '<' || c == '>');
            self.facts.push(RawFact::new(NAME, FactKind::Include, clean, span_of(node)));
        }
    }

    /// Declaration line is the name's line; the span ends where the item ends
    fn span(&self, item: Node<'_>, name: Node<'_>) -> Span {
        let start = name.start_position();
        Span::new(
            start.row as u32 + 1,
            start.column as u32 + 1,
            item.end_position().row as u32 + 1,
        )
    }

    /// Type text without aggregate bodies, e.g. `struct point` for a definition
    fn type_head(&self, ty: Node<'_>) -> String {
        match ty.child_by_field_name("body") {
            Some(body) => collapse_ws(self.source.get(ty.start_byte()..body.start_byte()).unwrap_or("")),
            None => collapse_ws(text(ty, self.source)),
        }
    }

    /// Contiguous comment block directly above `node`
    fn doc_comment(&self, node: Node<'_>) -> Option<String> {
        let mut lines = Vec::new();
        let mut expected_end = node.start_position().row;
        let mut current = node.prev_sibling();

        while let Some(sibling) = current {
            if sibling.kind() != "comment" {
                break;
            }
            let end_row = sibling.end_position().row;
            if end_row + 1 != expected_end && end_row != expected_end {
                break;
            }
            lines.push(clean_comment(text(sibling, self.source)));
            expected_end = sibling.start_position().row;
            current = sibling.prev_sibling();
        }

        if lines.is_empty() {
            return None;
        }
        lines.reverse();
        let doc = lines.join("\n").trim().to_string();
        (!doc.is_empty()).then_some(doc)
    }
}

fn find_parameter_list(declarator: Node<'_>) -> Option<Node<'_>> {
    if declarator.kind() == "function_declarator" {
        return declarator.child_by_field_name("parameters");
    }
    declarator
        .child_by_field_name("declarator")
        .and_then(find_parameter_list)
}

fn clean_comment(raw: &str) -> String {
    let body = raw
        .trim()
        .trim_start_matches("//")
        .trim_start_matches("/**")
        .trim_start_matches("/*")
        .trim_end_matches("*/");
    body.lines()
        .map(|line| line.trim().trim_start_matches('*').trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
