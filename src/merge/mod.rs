//! Symbol merge engine
//!
//! Collapses the facts every provider reported for one file into canonical
//! [`Symbol`]s:
//!
//! 1. Symbol facts are grouped by (name, kind, line) with a one-line
//!    tolerance, so providers that disagree slightly on position still
//!    describe the same declaration.
//! 2. Each field is taken from the most authoritative provider whose
//!    capabilities cover it, per [`MergePolicy`].
//! 3. Groups with the same name on overlapping lines but different kinds
//!    are collapsed in favour of the provider with type information. The
//!    discarded kind is kept as a `kind-conflict` note.
//! 4. Diagnostics are concatenated and attached to the innermost symbol
//!    whose span contains them.
//!
//! Merging is pure and single-threaded per file.

mod policy;

pub use policy::MergePolicy;

use crate::adapters::{Capabilities, FactKind, ProviderInfo, ProviderTable, RawFact, attr};
use crate::symbol::{Diagnostic, Field, Symbol};
use crate::types::{Severity, Span, SymbolId, SymbolKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, warn};

/// Provider name recorded on notes produced by the merge itself
pub const MERGE_PROVIDER: &str = "merge";

/// Line tolerance when grouping facts from different providers
const LINE_TOLERANCE: u32 = 1;

/// A call from a symbol in this file to a function known only by name.
/// Names are resolved to ids by the store once every file is known.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallRef {
    pub caller: SymbolId,
    pub callee: String,
    pub line: u32,
}

/// Output of merging one file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileMerge {
    pub symbols: Vec<Symbol>,
    pub call_refs: Vec<CallRef>,
    pub includes: Vec<String>,
    /// Findings that fall outside every symbol span
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Clone, Copy)]
struct Contribution<'f> {
    fact: &'f RawFact,
    info: ProviderInfo,
}

struct Group<'f> {
    name: &'f str,
    kind: SymbolKind,
    scope: Option<&'f str>,
    line: u32,
    members: Vec<Contribution<'f>>,
    /// Kinds discarded when another group won a kind conflict
    conflicts: Vec<(SymbolKind, Vec<String>)>,
    absorbed: bool,
}

impl<'f> Group<'f> {
    fn accepts(&self, name: &str, kind: SymbolKind, scope: Option<&str>, line: u32) -> bool {
        self.name == name
            && self.kind == kind
            && scopes_compatible(self.scope, scope)
            && self.line.abs_diff(line) <= LINE_TOLERANCE
    }

    /// Lines covered by any member
    fn extent(&self) -> Span {
        let line = self.members.iter().map(|m| m.fact.span.line).min().unwrap_or(self.line);
        let end_line = self.members.iter().map(|m| m.fact.span.end_line).max().unwrap_or(self.line);
        Span::new(line, 1, end_line)
    }

    /// Same start line within tolerance, or overlapping spans
    fn collides_with(&self, other: &Group<'_>) -> bool {
        self.line.abs_diff(other.line) <= LINE_TOLERANCE || self.extent().overlaps(&other.extent())
    }

    fn providers(&self) -> BTreeSet<&'f str> {
        self.members.iter().map(|m| m.fact.provider.as_str()).collect()
    }

    fn has_capability(&self, capability: Capabilities) -> bool {
        self.members.iter().any(|m| m.info.capabilities.contains(capability))
    }

    fn best_rank(&self, policy: &MergePolicy, capability: Capabilities) -> Option<usize> {
        self.members
            .iter()
            .filter(|m| m.info.capabilities.contains(capability))
            .map(|m| policy.rank(m.info.kind))
            .min()
    }
}

fn scopes_compatible(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

/// Merge all facts reported for `file`
pub fn merge_file(
    file: &str,
    facts: &[RawFact],
    providers: &ProviderTable,
    policy: &MergePolicy,
) -> FileMerge {
    let mut symbol_facts = Vec::new();
    let mut call_facts = Vec::new();
    let mut include_facts = Vec::new();
    let mut diagnostic_facts = Vec::new();

    for fact in facts {
        let Some(info) = providers.get(&fact.provider) else {
            warn!(provider = %fact.provider, file, "fact from unregistered provider dropped");
            continue;
        };
        let contribution = Contribution { fact, info: *info };
        match fact.kind_hint {
            FactKind::Symbol(_) => symbol_facts.push(contribution),
            FactKind::Call => call_facts.push(contribution),
            FactKind::Include => include_facts.push(contribution),
            FactKind::Diagnostic => diagnostic_facts.push(contribution),
        }
    }

    let groups = group_symbol_facts(symbol_facts, policy);
    let mut symbols = build_symbols(file, groups, policy);
    symbols.sort_by(|a, b| {
        (a.line, a.column, a.kind, &a.name).cmp(&(b.line, b.column, b.kind, &b.name))
    });

    let diagnostics = attach_diagnostics(&mut symbols, &diagnostic_facts, policy);
    let call_refs = resolve_local_calls(&mut symbols, &call_facts, policy);
    let includes = collect_includes(&include_facts);

    debug!(
        file,
        symbols = symbols.len(),
        calls = call_refs.len(),
        "merged file"
    );

    FileMerge {
        symbols,
        call_refs,
        includes,
        diagnostics,
    }
}

fn group_symbol_facts<'f>(
    mut facts: Vec<Contribution<'f>>,
    policy: &MergePolicy,
) -> Vec<Group<'f>> {
    facts.sort_by(|a, b| {
        let key = |c: &Contribution<'_>| {
            (
                c.fact.span.line,
                c.fact.name.clone(),
                c.fact.symbol_kind(),
                policy.rank(c.info.kind),
                c.fact.provider.clone(),
            )
        };
        key(a).cmp(&key(b))
    });

    let mut groups: Vec<Group<'f>> = Vec::new();
    for contribution in facts {
        let fact = contribution.fact;
        let Some(kind) = fact.symbol_kind() else {
            continue;
        };
        let scope = fact.text(attr::SCOPE);

        match groups
            .iter_mut()
            .rev()
            .find(|g| g.accepts(&fact.name, kind, scope, fact.span.line))
        {
            Some(group) => {
                if group.scope.is_none() {
                    group.scope = scope;
                }
                group.members.push(contribution);
            }
            None => groups.push(Group {
                name: &fact.name,
                kind,
                scope,
                line: fact.span.line,
                members: vec![contribution],
                conflicts: Vec::new(),
                absorbed: false,
            }),
        }
    }

    resolve_kind_conflicts(&mut groups, policy);
    groups
}

/// Collapse same-name groups with overlapping spans that disagree on kind.
///
/// Two groups only conflict when no provider reported both; a provider
/// naming a struct and a typedef on the same line is describing two
/// declarations.
fn resolve_kind_conflicts(groups: &mut [Group<'_>], policy: &MergePolicy) {
    for i in 0..groups.len() {
        for j in (i + 1)..groups.len() {
            let (left, right) = groups.split_at_mut(j);
            let a = &mut left[i];
            let b = &mut right[0];

            if a.absorbed
                || b.absorbed
                || a.name != b.name
                || a.kind == b.kind
                || !a.collides_with(b)
                || !scopes_compatible(a.scope, b.scope)
                || !a.providers().is_disjoint(&b.providers())
            {
                continue;
            }

            let a_wins = match (
                a.best_rank(policy, Capabilities::TYPES),
                b.best_rank(policy, Capabilities::TYPES),
            ) {
                (Some(ra), Some(rb)) => ra <= rb,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => {
                    let ra = a.best_rank(policy, Capabilities::empty());
                    let rb = b.best_rank(policy, Capabilities::empty());
                    ra <= rb
                }
            };

            let (winner, loser) = if a_wins { (a, b) } else { (b, a) };
            let loser_providers = loser.providers().into_iter().map(str::to_string).collect();
            winner.conflicts.push((loser.kind, loser_providers));
            winner.conflicts.append(&mut loser.conflicts);
            winner.members.append(&mut loser.members);
            if winner.scope.is_none() {
                winner.scope = loser.scope;
            }
            loser.absorbed = true;
        }
    }
}

fn build_symbols(file: &str, groups: Vec<Group<'_>>, policy: &MergePolicy) -> Vec<Symbol> {
    let mut symbols: Vec<Symbol> = Vec::with_capacity(groups.len());
    let mut seen: HashSet<SymbolId> = HashSet::new();

    for group in groups {
        if group.absorbed {
            continue;
        }
        if group.members.is_empty() || !group.has_capability(Capabilities::KINDS) {
            warn!(
                file,
                name = group.name,
                kind = %group.kind,
                "no provider able to report this symbol contributed to it; skipping"
            );
            continue;
        }

        let symbol = build_symbol(file, &group, policy);
        if !seen.insert(symbol.id) {
            warn!(file, name = %symbol.name, line = symbol.line, "duplicate symbol id, keeping the first");
            if let Some(existing) = symbols.iter_mut().find(|s| s.id == symbol.id) {
                existing.diagnostics.extend(symbol.diagnostics);
            }
            continue;
        }
        symbols.push(symbol);
    }
    symbols
}

/// Members able to fill `field`, most authoritative first
fn ranked<'g, 'f>(
    group: &'g Group<'f>,
    field: Field,
    policy: &MergePolicy,
    has_value: impl Fn(&RawFact) -> bool,
) -> Vec<&'g Contribution<'f>> {
    let mut candidates: Vec<_> = group
        .members
        .iter()
        .filter(|m| m.info.capabilities.covers(field) && has_value(m.fact))
        .collect();
    candidates.sort_by(|a, b| {
        (policy.rank_for(field, a.info.kind), &a.fact.provider)
            .cmp(&(policy.rank_for(field, b.info.kind), &b.fact.provider))
    });
    candidates
}

fn provider_names(candidates: &[&Contribution<'_>]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for c in candidates {
        if !names.contains(&c.fact.provider) {
            names.push(c.fact.provider.clone());
        }
    }
    names
}

fn build_symbol(file: &str, group: &Group<'_>, policy: &MergePolicy) -> Symbol {
    // Position decides identity; fall back to the best provider overall
    let span_sources = ranked(group, Field::Span, policy, |_| true);
    let span = match span_sources.first() {
        Some(best) => best.fact.span,
        None => {
            let mut all: Vec<_> = group.members.iter().collect();
            all.sort_by_key(|m| (policy.rank(m.info.kind), m.fact.provider.clone()));
            all.first().map_or(Span::at_line(group.line), |m| m.fact.span)
        }
    };

    let scope = {
        let mut with_scope: Vec<_> = group
            .members
            .iter()
            .filter(|m| m.fact.text(attr::SCOPE).is_some())
            .collect();
        with_scope.sort_by_key(|m| (policy.rank(m.info.kind), m.fact.provider.clone()));
        with_scope
            .first()
            .and_then(|m| m.fact.text(attr::SCOPE))
            .map(str::to_string)
            .or_else(|| group.scope.map(str::to_string))
    };

    let mut symbol = Symbol::new(file, group.name, group.kind, scope, span);

    let kind_sources: Vec<_> = ranked(group, Field::Kind, policy, |f| {
        f.symbol_kind() == Some(group.kind)
    });
    symbol
        .source_confidence
        .insert(Field::Kind, provider_names(&kind_sources));
    if !span_sources.is_empty() {
        symbol
            .source_confidence
            .insert(Field::Span, provider_names(&span_sources));
    }

    let signatures = ranked(group, Field::Signature, policy, |f| f.text(attr::SIGNATURE).is_some());
    if let Some(best) = signatures.first() {
        symbol.signature = best.fact.text(attr::SIGNATURE).map(str::to_string);
        symbol
            .source_confidence
            .insert(Field::Signature, provider_names(&signatures));
    }

    let docs = ranked(group, Field::DocComment, policy, |f| f.text(attr::DOC).is_some());
    if let Some(best) = docs.first() {
        symbol.doc_comment = best.fact.text(attr::DOC).map(str::to_string);
        symbol
            .source_confidence
            .insert(Field::DocComment, provider_names(&docs));
    }

    let complexities = ranked(group, Field::Complexity, policy, |f| f.int(attr::COMPLEXITY).is_some());
    if let Some(best) = complexities.first() {
        symbol.complexity = best
            .fact
            .int(attr::COMPLEXITY)
            .and_then(|c| u32::try_from(c).ok());
        symbol
            .source_confidence
            .insert(Field::Complexity, provider_names(&complexities));
    }

    for (kind, providers) in &group.conflicts {
        symbol.diagnostics.push(Diagnostic {
            provider: MERGE_PROVIDER.to_string(),
            severity: Severity::Note,
            message: format!(
                "{} reported `{}` as {kind}; kept {}",
                providers.join(", "),
                group.name,
                group.kind
            ),
            line: symbol.line,
            check_id: Some("kind-conflict".to_string()),
        });
    }
    if !group.conflicts.is_empty() {
        symbol
            .source_confidence
            .insert(Field::Diagnostics, vec![MERGE_PROVIDER.to_string()]);
    }

    symbol
}

/// Attach findings to the innermost symbol containing their line.
/// Returns findings that fall outside every symbol.
fn attach_diagnostics(
    symbols: &mut [Symbol],
    facts: &[Contribution<'_>],
    policy: &MergePolicy,
) -> Vec<Diagnostic> {
    let mut unattached = Vec::new();

    for contribution in facts {
        if !contribution.info.capabilities.covers(Field::Diagnostics) {
            continue;
        }
        let fact = contribution.fact;
        let severity = fact
            .text(attr::SEVERITY)
            .and_then(|s| s.parse::<Severity>().ok())
            .unwrap_or(Severity::Warning);
        if !policy.keeps(severity) {
            continue;
        }

        let diagnostic = Diagnostic {
            provider: fact.provider.clone(),
            severity,
            message: fact.text(attr::MESSAGE).unwrap_or(&fact.name).to_string(),
            line: fact.span.line,
            check_id: fact
                .text(attr::CHECK_ID)
                .map(str::to_string)
                .or_else(|| (!fact.name.is_empty()).then(|| fact.name.clone())),
        };

        let target = symbols
            .iter_mut()
            .filter(|s| s.span().contains_line(diagnostic.line))
            .min_by_key(|s| (s.end_line - s.line, std::cmp::Reverse(s.line)));

        match target {
            Some(symbol) => {
                let providers = symbol.source_confidence.entry(Field::Diagnostics).or_default();
                if !providers.contains(&diagnostic.provider) {
                    providers.push(diagnostic.provider.clone());
                }
                symbol.diagnostics.push(diagnostic);
            }
            None => unattached.push(diagnostic),
        }
    }

    unattached
}

/// Turn call facts into references from caller symbols to callee names.
///
/// Only the most authoritative provider that reported calls is used.
fn resolve_local_calls(
    symbols: &mut [Symbol],
    facts: &[Contribution<'_>],
    policy: &MergePolicy,
) -> Vec<CallRef> {
    let Some(best) = facts
        .iter()
        .filter(|c| c.info.capabilities.covers(Field::CallEdges))
        .min_by_key(|c| (policy.rank_for(Field::CallEdges, c.info.kind), c.fact.provider.clone()))
    else {
        return Vec::new();
    };
    let provider = best.fact.provider.clone();

    let mut refs = BTreeSet::new();
    for contribution in facts.iter().filter(|c| c.fact.provider == provider) {
        let fact = contribution.fact;
        let Some(caller_name) = fact.text(attr::CALLER) else {
            continue;
        };
        let caller_line = fact
            .int(attr::CALLER_LINE)
            .and_then(|l| u32::try_from(l).ok())
            .unwrap_or(fact.span.line);

        let caller = symbols.iter_mut().find(|s| {
            s.kind == SymbolKind::Function
                && s.name == caller_name
                && s.line.abs_diff(caller_line) <= LINE_TOLERANCE
        });
        match caller {
            Some(symbol) => {
                symbol
                    .source_confidence
                    .insert(Field::CallEdges, vec![provider.clone()]);
                refs.insert(CallRef {
                    caller: symbol.id,
                    callee: fact.name.clone(),
                    line: fact.span.line,
                });
            }
            None => debug!(caller = caller_name, callee = %fact.name, "call from unknown function dropped"),
        }
    }

    refs.into_iter().collect()
}

fn collect_includes(facts: &[Contribution<'_>]) -> Vec<String> {
    let mut includes: Vec<String> = Vec::new();
    let mut ordered: Vec<_> = facts
        .iter()
        .filter(|c| c.info.capabilities.contains(Capabilities::INCLUDES))
        .collect();
    ordered.sort_by_key(|c| c.fact.span.line);
    for c in ordered {
        if !includes.contains(&c.fact.name) {
            includes.push(c.fact.name.clone());
        }
    }
    includes
}
