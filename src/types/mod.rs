use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Stable symbol identifier.
///
/// Derived from (file, qualified name, kind, declaration line) so the same
/// logical declaration gets the same id on every run. A symbol that moves
/// to a different line gets a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolId(pub u64);

impl SymbolId {
    pub fn derive(file: &str, qualified_name: &str, kind: SymbolKind, line: u32) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(file.as_bytes());
        hasher.update([0]);
        hasher.update(qualified_name.as_bytes());
        hasher.update([0]);
        hasher.update(kind.as_str().as_bytes());
        hasher.update([0]);
        hasher.update(line.to_le_bytes());
        let digest = hasher.finalize();

        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        Self(u64::from_be_bytes(bytes))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for SymbolId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str_radix(s.trim_start_matches("0x"), 16).map(SymbolId)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Variable,
    Struct,
    Union,
    Enum,
    Typedef,
    Macro,
    Field,
}

impl SymbolKind {
    pub const ALL: [SymbolKind; 8] = [
        SymbolKind::Function,
        SymbolKind::Variable,
        SymbolKind::Struct,
        SymbolKind::Union,
        SymbolKind::Enum,
        SymbolKind::Typedef,
        SymbolKind::Macro,
        SymbolKind::Field,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Variable => "variable",
            SymbolKind::Struct => "struct",
            SymbolKind::Union => "union",
            SymbolKind::Enum => "enum",
            SymbolKind::Typedef => "typedef",
            SymbolKind::Macro => "macro",
            SymbolKind::Field => "field",
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SymbolKind {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "function" | "func" | "fn" => Ok(SymbolKind::Function),
            "variable" | "var" => Ok(SymbolKind::Variable),
            "struct" | "structure" => Ok(SymbolKind::Struct),
            "union" => Ok(SymbolKind::Union),
            "enum" => Ok(SymbolKind::Enum),
            "typedef" => Ok(SymbolKind::Typedef),
            "macro" | "define" => Ok(SymbolKind::Macro),
            "field" | "member" => Ok(SymbolKind::Field),
            _ => Err("Unknown symbol kind"),
        }
    }
}

/// Position of a declaration. Lines are 1-based, columns 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub line: u32,
    pub column: u32,
    pub end_line: u32,
}

impl Span {
    pub fn new(line: u32, column: u32, end_line: u32) -> Self {
        Self {
            line,
            column,
            end_line: end_line.max(line),
        }
    }

    pub fn at_line(line: u32) -> Self {
        Self::new(line, 1, line)
    }

    pub fn contains_line(&self, line: u32) -> bool {
        self.line <= line && line <= self.end_line
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.line <= other.end_line && other.line <= self.end_line
    }
}

/// Severity of a static-analysis finding, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Note,
    Information,
    Style,
    Portability,
    Performance,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Note => "note",
            Severity::Information => "information",
            Severity::Style => "style",
            Severity::Portability => "portability",
            Severity::Performance => "performance",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "note" => Ok(Severity::Note),
            "information" | "info" => Ok(Severity::Information),
            "style" => Ok(Severity::Style),
            "portability" => Ok(Severity::Portability),
            "performance" => Ok(Severity::Performance),
            "warning" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            _ => Err("Unknown severity"),
        }
    }
}

/// Role a provider plays. Drives merge priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Semantic,
    Syntax,
    Tags,
    Complexity,
    BugFinder,
    CallGraph,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Semantic => "semantic",
            ProviderKind::Syntax => "syntax",
            ProviderKind::Tags => "tags",
            ProviderKind::Complexity => "complexity",
            ProviderKind::BugFinder => "bugfinder",
            ProviderKind::CallGraph => "callgraph",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "semantic" | "type" | "types" => Ok(ProviderKind::Semantic),
            "syntax" => Ok(ProviderKind::Syntax),
            "tags" | "tag" => Ok(ProviderKind::Tags),
            "complexity" => Ok(ProviderKind::Complexity),
            "bugfinder" | "bug-finder" | "diagnostics" => Ok(ProviderKind::BugFinder),
            "callgraph" | "call-graph" | "calls" => Ok(ProviderKind::CallGraph),
            _ => Err("Unknown provider kind"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_id_is_stable() {
        let a = SymbolId::derive("src/a.c", "add", SymbolKind::Function, 3);
        let b = SymbolId::derive("src/a.c", "add", SymbolKind::Function, 3);
        assert_eq!(a, b);
    }

    #[test]
    fn test_symbol_id_changes_with_position() {
        let a = SymbolId::derive("src/a.c", "add", SymbolKind::Function, 3);
        let moved = SymbolId::derive("src/a.c", "add", SymbolKind::Function, 4);
        let other_file = SymbolId::derive("src/b.c", "add", SymbolKind::Function, 3);
        let other_kind = SymbolId::derive("src/a.c", "add", SymbolKind::Macro, 3);
        assert_ne!(a, moved);
        assert_ne!(a, other_file);
        assert_ne!(a, other_kind);
    }

    #[test]
    fn test_symbol_id_hex_parse() {
        let id = SymbolId::derive("x.c", "main", SymbolKind::Function, 1);
        let text = id.to_string();
        assert_eq!(text.len(), 16);
        assert_eq!(text.parse::<SymbolId>().unwrap(), id);
    }

    #[test]
    fn test_symbol_kind_from_str() {
        assert_eq!("function".parse::<SymbolKind>(), Ok(SymbolKind::Function));
        assert_eq!("Struct".parse::<SymbolKind>(), Ok(SymbolKind::Struct));
        assert_eq!("member".parse::<SymbolKind>(), Ok(SymbolKind::Field));
        assert!("class".parse::<SymbolKind>().is_err());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Style > Severity::Information);
        assert!(Severity::Note < Severity::Information);
    }

    #[test]
    fn test_span_overlap() {
        let outer = Span::new(10, 1, 20);
        let inner = Span::new(12, 5, 12);
        let after = Span::new(21, 1, 25);
        assert!(outer.overlaps(&inner));
        assert!(!outer.overlaps(&after));
        assert!(outer.contains_line(20));
        assert!(after.overlaps(&Span::at_line(21)));
    }
}
