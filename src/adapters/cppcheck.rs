//! Static bug-finder provider backed by cppcheck.
//!
//! Findings are printed with a tab-separated `--template` so they can be
//! parsed without an XML reader.

use super::process::run_with_timeout;
use super::{AnalysisRequest, Analyzer, Capabilities, FactKind, RawFact, attr};
use crate::error::{AdapterError, AdapterErrorKind};
use crate::types::{ProviderKind, Severity, Span};
use std::path::{Path, PathBuf};
use std::process::Command;

pub const NAME: &str = "cppcheck";

const TEMPLATE: &str = "--template={file}\t{line}\t{column}\t{severity}\t{id}\t{message}";

#[derive(Debug, Clone)]
pub struct CppcheckAnalyzer {
    binary: PathBuf,
}

impl CppcheckAnalyzer {
    pub fn new(binary: &Path) -> Self {
        Self {
            binary: binary.to_path_buf(),
        }
    }

    fn command(&self, path: &Path, root: &Path) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args([
            "--enable=warning,style,performance,portability,information",
            "--inconclusive",
            "--quiet",
            "--language=c",
            TEMPLATE,
        ])
        .arg(format!("-I{}", root.display()))
        .arg(path);
        cmd
    }
}

impl Analyzer for CppcheckAnalyzer {
    fn name(&self) -> &str {
        NAME
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::BugFinder
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::DIAGNOSTICS
    }

    fn analyze(&self, request: &AnalysisRequest<'_>) -> Result<Vec<RawFact>, AdapterError> {
        let fail = |kind| AdapterError::new(NAME, request.relative, kind);

        let output = run_with_timeout(self.command(request.path, request.root), request.timeout)
            .map_err(fail)?;
        if !output.status.success() {
            return Err(fail(AdapterErrorKind::ExitStatus {
                status: output.status.to_string(),
                stderr: output.stderr_lossy().trim().to_string(),
            }));
        }

        // Findings go to stderr
        Ok(parse_findings(
            &output.stderr_lossy(),
            &request.path.to_string_lossy(),
        ))
    }
}

/// Parse template output, keeping findings reported against `target_file`
pub fn parse_findings(output: &str, target_file: &str) -> Vec<RawFact> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.splitn(6, '\t');
            let file = parts.next()?;
            let line_no = parts.next()?.parse::<u32>().ok()?;
            let column = parts.next()?.parse::<u32>().unwrap_or(1);
            let severity = parts.next()?;
            let id = parts.next()?;
            let message = parts.next()?;

            // File-level findings carry an empty file or line 0
            let belongs = file.is_empty() || file == target_file;
            if !belongs {
                return None;
            }
            let severity: Severity = severity.parse().ok()?;

            Some(
                RawFact::new(NAME, FactKind::Diagnostic, id, Span::new(line_no, column.max(1), line_no))
                    .with(attr::SEVERITY, severity.as_str())
                    .with(attr::CHECK_ID, id)
                    .with(attr::MESSAGE, message),
            )
        })
        .collect()
}
