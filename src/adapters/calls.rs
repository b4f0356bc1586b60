//! Call-graph provider: direct calls made from each function body.

use super::treesitter::{self, MAX_DEPTH, span_of, text};
use super::{AnalysisRequest, Analyzer, Capabilities, FactKind, RawFact, attr};
use crate::error::{AdapterError, AdapterErrorKind};
use crate::types::ProviderKind;
use tree_sitter::Node;

pub const NAME: &str = "calls";

#[derive(Debug, Default)]
pub struct CallGraphAnalyzer;

impl CallGraphAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// One `Call` fact per call site whose callee is a plain identifier.
    ///
    /// Callees that are not plain identifiers, e.g. `(*fp)()` or `s->op()`,
    /// have no static target and are not reported.
    pub fn extract(source: &str) -> Result<Vec<RawFact>, String> {
        let tree = treesitter::parse(source)?;
        let mut facts = Vec::new();

        treesitter::for_each_function(tree.root_node(), source, &mut |function, caller| {
            let caller_line = function
                .child_by_field_name("declarator")
                .and_then(treesitter::function_name)
                .map_or(span_of(function).line, |n| n.start_position().row as u32 + 1);

            if let Some(body) = function.child_by_field_name("body") {
                collect_calls(body, source, &mut |callee, site| {
                    facts.push(
                        RawFact::new(NAME, FactKind::Call, callee, span_of(site))
                            .with(attr::CALLER, caller)
                            .with(attr::CALLER_LINE, i64::from(caller_line)),
                    );
                }, 0);
            }
        });

        Ok(facts)
    }
}

fn collect_calls<'t>(node: Node<'t>, source: &str, emit: &mut impl FnMut(&str, Node<'t>), depth: usize) {
    if depth > MAX_DEPTH {
        return;
    }
    if node.kind() == "call_expression" {
        if let Some(function) = node.child_by_field_name("function") {
            if function.kind() == "identifier" {
                emit(text(function, source), node);
            }
        }
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        collect_calls(child, source, emit, depth + 1);
    }
}

impl Analyzer for CallGraphAnalyzer {
    fn name(&self) -> &str {
        NAME
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::CallGraph
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::CALL_EDGES
    }

    fn analyze(&self, request: &AnalysisRequest<'_>) -> Result<Vec<RawFact>, AdapterError> {
        Self::extract(request.source)
            .map_err(|e| AdapterError::new(NAME, request.relative, AdapterErrorKind::Parse(e)))
    }
}
