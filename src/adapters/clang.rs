//! Semantic/type provider backed by the clang JSON AST dump.
//!
//! Runs `clang -fsyntax-only -Xclang -ast-dump=json` and walks the result.
//! The dump omits `file` and `line` from a location when they repeat the
//! previously printed location, so every node is visited in output order
//! and a running location is kept to tell which nodes belong to the
//! analyzed file.

use super::process::run_with_timeout;
use super::{AnalysisRequest, Analyzer, Capabilities, RawFact, attr};
use crate::error::{AdapterError, AdapterErrorKind};
use crate::types::{ProviderKind, Span, SymbolKind};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Command;

pub const NAME: &str = "clang";

#[derive(Debug, Clone)]
pub struct ClangAnalyzer {
    binary: PathBuf,
    extra_args: Vec<String>,
}

impl ClangAnalyzer {
    pub fn new(binary: &Path, extra_args: Vec<String>) -> Self {
        Self {
            binary: binary.to_path_buf(),
            extra_args,
        }
    }

    fn command(&self, path: &Path, root: &Path) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["-fsyntax-only", "-fno-color-diagnostics", "-Xclang", "-ast-dump=json"])
            .arg(format!("-I{}", root.display()))
            .args(&self.extra_args)
            .arg(path)
            .current_dir(root);
        cmd
    }
}

impl Analyzer for ClangAnalyzer {
    fn name(&self) -> &str {
        NAME
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Semantic
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::KINDS | Capabilities::SPANS | Capabilities::SIGNATURES | Capabilities::TYPES
    }

    fn analyze(&self, request: &AnalysisRequest<'_>) -> Result<Vec<RawFact>, AdapterError> {
        let fail = |kind| AdapterError::new(NAME, request.relative, kind);

        let output = run_with_timeout(self.command(request.path, request.root), request.timeout)
            .map_err(fail)?;

        // Compile errors still produce a usable AST; only an empty dump is fatal
        if output.stdout.is_empty() {
            return Err(fail(AdapterErrorKind::ExitStatus {
                status: output.status.to_string(),
                stderr: output.stderr_lossy().trim().to_string(),
            }));
        }

        let ast: Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| fail(AdapterErrorKind::Parse(e.to_string())))?;
        Ok(facts_from_ast(&ast, &request.path.to_string_lossy()))
    }
}

/// Extract facts for declarations located in `target_file`
pub fn facts_from_ast(ast: &Value, target_file: &str) -> Vec<RawFact> {
    let mut walker = AstWalker {
        target: target_file,
        file: None,
        line: 0,
        facts: Vec::new(),
    };
    walker.walk(ast, Parent::Root);
    walker.facts
}

#[derive(Clone, Copy)]
enum Parent<'a> {
    Root,
    TranslationUnit,
    Record(&'a str),
    Other,
}

struct AstWalker<'t> {
    target: &'t str,
    file: Option<String>,
    line: u32,
    facts: Vec<RawFact>,
}

impl<'t> AstWalker<'t> {
    fn walk<'v>(&mut self, node: &'v Value, parent: Parent<'v>) {
        let kind = node.get("kind").and_then(Value::as_str).unwrap_or("");
        let (line, column) = self.track_loc(node.get("loc"));
        let in_target = self.file.as_deref() == Some(self.target);
        let end_line = self.track_range(node.get("range"));

        let implicit = node.get("isImplicit").and_then(Value::as_bool).unwrap_or(false);
        let name = node.get("name").and_then(Value::as_str);

        if in_target && !implicit {
            if let Some(name) = name {
                let span = Span::new(line, column, end_line.max(line));
                self.emit(node, kind, name, span, parent);
            }
        }

        let child_parent = match (kind, name) {
            ("TranslationUnitDecl", _) | ("LinkageSpecDecl", _) => Parent::TranslationUnit,
            ("RecordDecl", Some(name)) => Parent::Record(name),
            _ => Parent::Other,
        };
        if let Some(inner) = node.get("inner").and_then(Value::as_array) {
            for child in inner {
                self.walk(child, child_parent);
            }
        }
    }

    fn emit(&mut self, node: &Value, kind: &str, name: &str, span: Span, parent: Parent<'_>) {
        let qual_type = node
            .get("type")
            .and_then(|t| t.get("qualType"))
            .and_then(Value::as_str)
            .unwrap_or("");

        let fact = match (kind, parent) {
            ("FunctionDecl", _) if has_body(node) => {
                let (ret, params) = function_parts(node, qual_type);
                let storage = node
                    .get("storageClass")
                    .and_then(Value::as_str)
                    .map(|s| format!("{s} "))
                    .unwrap_or_default();
                RawFact::symbol(NAME, SymbolKind::Function, name, span)
                    .with(attr::SIGNATURE, format!("{storage}{}{params}", join_decl(&ret, name)))
                    .with(attr::TYPE, ret)
            }
            ("VarDecl", Parent::TranslationUnit) => RawFact::symbol(NAME, SymbolKind::Variable, name, span)
                .with(attr::SIGNATURE, join_decl(qual_type, name))
                .with(attr::TYPE, qual_type),
            ("RecordDecl", _) if is_complete(node) => {
                let tag = node.get("tagUsed").and_then(Value::as_str).unwrap_or("struct");
                let kind = if tag == "union" {
                    SymbolKind::Union
                } else {
                    SymbolKind::Struct
                };
                RawFact::symbol(NAME, kind, name, span).with(attr::SIGNATURE, format!("{tag} {name}"))
            }
            ("EnumDecl", _) if node.get("inner").is_some() => {
                RawFact::symbol(NAME, SymbolKind::Enum, name, span).with(attr::SIGNATURE, format!("enum {name}"))
            }
            ("TypedefDecl", _) => RawFact::symbol(NAME, SymbolKind::Typedef, name, span)
                .with(attr::SIGNATURE, format!("typedef {}", join_decl(qual_type, name)))
                .with(attr::TYPE, qual_type),
            ("FieldDecl", Parent::Record(scope)) => RawFact::symbol(NAME, SymbolKind::Field, name, span)
                .with(attr::SIGNATURE, join_decl(qual_type, name))
                .with(attr::TYPE, qual_type)
                .with(attr::SCOPE, scope),
            _ => return,
        };
        self.facts.push(fact);
    }

    /// Update the running location from `loc`, returning the expansion line and column
    fn track_loc(&mut self, loc: Option<&Value>) -> (u32, u32) {
        let Some(loc) = loc else {
            return (self.line, 1);
        };
        if let Some(spelling) = loc.get("spellingLoc") {
            self.track_bare(spelling);
        }
        let bare = loc.get("expansionLoc").unwrap_or(loc);
        let column = self.track_bare(bare);
        (self.line, column)
    }

    fn track_range(&mut self, range: Option<&Value>) -> u32 {
        let Some(range) = range else {
            return self.line;
        };
        for key in ["begin", "end"] {
            if let Some(loc) = range.get(key) {
                self.track_loc(Some(loc));
            }
        }
        self.line
    }

    fn track_bare(&mut self, loc: &Value) -> u32 {
        if let Some(file) = loc.get("file").and_then(Value::as_str) {
            self.file = Some(file.to_string());
        }
        if let Some(line) = loc.get("line").and_then(Value::as_u64) {
            self.line = line as u32;
        }
        loc.get("col").and_then(Value::as_u64).unwrap_or(1) as u32
    }
}

fn children<'v>(node: &'v Value) -> impl Iterator<Item = &'v Value> {
    node.get("inner")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn has_body(node: &Value) -> bool {
    children(node).any(|c| c.get("kind").and_then(Value::as_str) == Some("CompoundStmt"))
}

fn is_complete(node: &Value) -> bool {
    node.get("completeDefinition").and_then(Value::as_bool).unwrap_or(false)
}

/// Return type and parenthesized parameter list of a function declaration
fn function_parts(node: &Value, qual_type: &str) -> (String, String) {
    let ret = qual_type
        .split_once('(')
        .map_or(qual_type, |(ret, _)| ret)
        .trim()
        .to_string();

    let params: Vec<String> = children(node)
        .filter(|c| c.get("kind").and_then(Value::as_str) == Some("ParmVarDecl"))
        .map(|p| {
            let ty = p
                .get("type")
                .and_then(|t| t.get("qualType"))
                .and_then(Value::as_str)
                .unwrap_or("");
            match p.get("name").and_then(Value::as_str) {
                Some(name) => join_decl(ty, name),
                None => ty.to_string(),
            }
        })
        .collect();

    let mut list = if params.is_empty() {
        "void".to_string()
    } else {
        params.join(", ")
    };
    if node.get("variadic").and_then(Value::as_bool).unwrap_or(false) {
        list.push_str(", ...");
    }
    (ret, format!("({list})"))
}

/// `int` + `x` -> `int x`, `char *` + `p` -> `char *p`
fn join_decl(ty: &str, name: &str) -> String {
    if ty.ends_with('*') {
        format!("{ty}{name}")
    } else {
        format!("{ty} {name}")
    }
}
