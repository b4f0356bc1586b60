use crate::config::Settings;
use crate::symbol::Field;
use crate::types::{ProviderKind, Severity};

/// Arbitration rules for the merge engine.
///
/// `priority` lists provider kinds from most to least authoritative. Kinds
/// missing from the list rank below every listed kind. The call-graph
/// provider always wins `callers`/`callees` regardless of the list.
#[derive(Debug, Clone, PartialEq)]
pub struct MergePolicy {
    priority: Vec<ProviderKind>,
    min_severity: Severity,
    include_info: bool,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl MergePolicy {
    pub fn new(priority: Vec<ProviderKind>) -> Self {
        Self {
            priority,
            min_severity: Severity::Style,
            include_info: false,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.providers.priority.clone()).with_diagnostics(
            settings.diagnostics.min_severity,
            settings.diagnostics.include_info,
        )
    }

    pub fn with_diagnostics(mut self, min_severity: Severity, include_info: bool) -> Self {
        self.min_severity = min_severity;
        self.include_info = include_info;
        self
    }

    pub fn priority(&self) -> &[ProviderKind] {
        &self.priority
    }

    /// Lower is more authoritative
    pub fn rank(&self, kind: ProviderKind) -> usize {
        self.priority
            .iter()
            .position(|k| *k == kind)
            .unwrap_or(self.priority.len() + kind as usize)
    }

    /// Rank of a provider kind for one field
    pub fn rank_for(&self, field: Field, kind: ProviderKind) -> usize {
        match (field, kind) {
            (Field::CallEdges, ProviderKind::CallGraph) => 0,
            _ => self.rank(kind) + 1,
        }
    }

    /// Whether a finding of this severity is kept
    pub fn keeps(&self, severity: Severity) -> bool {
        match severity {
            Severity::Information => self.include_info,
            other => other >= self.min_severity,
        }
    }
}
