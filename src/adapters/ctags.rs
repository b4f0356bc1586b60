//! Tag-extraction provider backed by Universal Ctags.
//!
//! Runs `ctags -f -` on a single file and parses the tab-separated tag
//! lines with extension fields (`kind:`, `line:`, `signature:`, `typeref:`,
//! and scope fields such as `struct:point`).

use super::process::run_with_timeout;
use super::{AnalysisRequest, Analyzer, Capabilities, RawFact, attr};
use crate::error::{AdapterError, AdapterErrorKind};
use crate::types::{ProviderKind, Span, SymbolKind};
use std::path::{Path, PathBuf};
use std::process::Command;

pub const NAME: &str = "ctags";

#[derive(Debug, Clone)]
pub struct CtagsAnalyzer {
    binary: PathBuf,
}

impl CtagsAnalyzer {
    pub fn new(binary: &Path) -> Self {
        Self {
            binary: binary.to_path_buf(),
        }
    }

    fn command(&self, path: &Path) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args([
            "-f",
            "-",
            "--sort=no",
            "--language-force=C",
            "--fields=+nKSzt",
            "--extras=-fq",
        ])
        .arg(path);
        cmd
    }
}

impl Analyzer for CtagsAnalyzer {
    fn name(&self) -> &str {
        NAME
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Tags
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::KINDS | Capabilities::SIGNATURES
    }

    fn analyze(&self, request: &AnalysisRequest<'_>) -> Result<Vec<RawFact>, AdapterError> {
        let fail = |kind| AdapterError::new(NAME, request.relative, kind);

        let output = run_with_timeout(self.command(request.path), request.timeout).map_err(fail)?;
        if !output.status.success() {
            return Err(fail(AdapterErrorKind::ExitStatus {
                status: output.status.to_string(),
                stderr: output.stderr_lossy().trim().to_string(),
            }));
        }

        Ok(parse_tags(&output.stdout_lossy()))
    }
}

/// Parse `ctags -f -` output into facts. Unknown kinds and malformed lines are skipped.
pub fn parse_tags(output: &str) -> Vec<RawFact> {
    output.lines().filter_map(parse_tag_line).collect()
}

fn parse_tag_line(line: &str) -> Option<RawFact> {
    if line.starts_with("!_") || line.trim().is_empty() {
        return None;
    }
    let (name, rest) = line.split_once('\t')?;
    let (_file, rest) = rest.split_once('\t')?;
    // The ex command may contain tabs; extension fields start after `;"`
    let (_ex_cmd, fields) = rest.split_once(";\"\t")?;

    let mut kind = None;
    let mut line_no = None;
    let mut signature = None;
    let mut typeref = None;
    let mut scope = None;

    for field in fields.split('\t') {
        let (key, value) = match field.split_once(':') {
            Some((key, value)) => (key, value),
            // Without `z`, the kind is a bare value
            None => ("kind", field),
        };
        match key {
            "kind" => kind = map_kind(value),
            "line" => line_no = value.parse::<u32>().ok(),
            "signature" => signature = Some(value.to_string()),
            "typeref" => typeref = Some(value.trim_start_matches("typename:").to_string()),
            "struct" | "union" | "enum" => scope = Some(value.to_string()),
            _ => {}
        }
    }

    let kind = kind?;
    let line_no = line_no?;

    let signature = match (kind, signature) {
        (SymbolKind::Function, Some(params)) => Some(match &typeref {
            Some(ret) => format!("{ret} {name}{params}"),
            None => format!("{name}{params}"),
        }),
        (SymbolKind::Macro, Some(params)) => Some(format!("#define {name}{params}")),
        (SymbolKind::Macro, None) => Some(format!("#define {name}")),
        (SymbolKind::Variable | SymbolKind::Field, _) => {
            typeref.as_ref().map(|ty| format!("{ty} {name}"))
        }
        (SymbolKind::Struct | SymbolKind::Union | SymbolKind::Enum, _) => {
            Some(format!("{} {name}", kind.as_str()))
        }
        _ => None,
    };

    Some(
        RawFact::symbol(NAME, kind, name, Span::at_line(line_no))
            .with_opt(attr::SIGNATURE, signature)
            .with_opt(attr::TYPE, typeref)
            .with_opt(attr::SCOPE, scope),
    )
}

fn map_kind(value: &str) -> Option<SymbolKind> {
    match value {
        "function" | "f" => Some(SymbolKind::Function),
        "variable" | "v" => Some(SymbolKind::Variable),
        "struct" | "s" => Some(SymbolKind::Struct),
        "union" | "u" => Some(SymbolKind::Union),
        "enum" | "g" => Some(SymbolKind::Enum),
        "typedef" | "t" => Some(SymbolKind::Typedef),
        "macro" | "d" => Some(SymbolKind::Macro),
        "member" | "m" => Some(SymbolKind::Field),
        // prototypes, enumerators, locals, headers
        _ => None,
    }
}
