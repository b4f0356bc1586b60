//! Complexity provider: cyclomatic complexity per function definition.

use super::treesitter::{self, MAX_DEPTH, span_of, text};
use super::{AnalysisRequest, Analyzer, Capabilities, RawFact, attr};
use crate::error::{AdapterError, AdapterErrorKind};
use crate::types::{ProviderKind, Span, SymbolKind};
use tree_sitter::Node;

pub const NAME: &str = "complexity";

#[derive(Debug, Default)]
pub struct ComplexityAnalyzer;

impl ComplexityAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(source: &str) -> Result<Vec<RawFact>, String> {
        let tree = treesitter::parse(source)?;
        let mut facts = Vec::new();

        treesitter::for_each_function(tree.root_node(), source, &mut |function, name| {
            let decision_points = function
                .child_by_field_name("body")
                .map_or(0, |body| count_decisions(body, source, 0));
            let line = function
                .child_by_field_name("declarator")
                .and_then(treesitter::function_name)
                .map_or(span_of(function).line, |n| n.start_position().row as u32 + 1);
            let span = Span::new(line, 1, span_of(function).end_line);

            facts.push(
                RawFact::symbol(NAME, SymbolKind::Function, name, span)
                    .with(attr::COMPLEXITY, 1 + decision_points),
            );
        });

        Ok(facts)
    }
}

fn count_decisions(node: Node<'_>, source: &str, depth: usize) -> i64 {
    if depth > MAX_DEPTH {
        return 0;
    }
    let own = match node.kind() {
        "if_statement" | "while_statement" | "for_statement" | "do_statement"
        | "conditional_expression" => 1,
        "case_statement" => i64::from(node.child_by_field_name("value").is_some()),
        "binary_expression" => node
            .child_by_field_name("operator")
            .map_or(0, |op| i64::from(matches!(text(op, source), "&&" | "||"))),
        _ => 0,
    };

    let mut cursor = node.walk();
    let nested: i64 = node
        .named_children(&mut cursor)
        .map(|child| count_decisions(child, source, depth + 1))
        .sum();
    own + nested
}

impl Analyzer for ComplexityAnalyzer {
    fn name(&self) -> &str {
        NAME
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Complexity
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::COMPLEXITY
    }

    fn analyze(&self, request: &AnalysisRequest<'_>) -> Result<Vec<RawFact>, AdapterError> {
        Self::extract(request.source)
            .map_err(|e| AdapterError::new(NAME, request.relative, AdapterErrorKind::Parse(e)))
    }
}
