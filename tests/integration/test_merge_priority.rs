//! Provider arbitration and degraded indexing

use crate::common::{Failing, Scripted, TestProject, settings_without_embeddings};
use codeweave::adapters::{Analyzer, AnalyzerSet, Capabilities, RawFact, SyntaxAnalyzer, attr};
use codeweave::merge::MergePolicy;
use codeweave::{AdapterErrorKind, BuildOptions, CodeIndex, Field, ProviderKind, Span, SymbolKind};
use std::sync::Arc;

const ADD_C: &str = "int add(int a, int b)\n{\n    return a + b;\n}\n";

fn semantic_stub() -> Arc<Scripted> {
    Scripted::new(
        "clang-stub",
        ProviderKind::Semantic,
        Capabilities::KINDS | Capabilities::SPANS | Capabilities::SIGNATURES | Capabilities::TYPES,
        |_| {
            vec![
                RawFact::symbol("clang-stub", SymbolKind::Function, "add", Span::new(1, 5, 4))
                    .with(attr::SIGNATURE, "int (int, int)"),
            ]
        },
    )
}

fn tags_stub() -> Arc<Scripted> {
    Scripted::new(
        "ctags-stub",
        ProviderKind::Tags,
        Capabilities::KINDS | Capabilities::SIGNATURES,
        // Tag extractors are often a line off
        |_| {
            vec![
                RawFact::symbol("ctags-stub", SymbolKind::Function, "add", Span::at_line(2))
                    .with(attr::SIGNATURE, "(int a, int b)"),
            ]
        },
    )
}

fn builder(project: &TestProject, analyzers: Vec<Arc<dyn Analyzer>>) -> codeweave::CodeIndexBuilder {
    CodeIndex::builder(project.path(), settings_without_embeddings()).analyzers(AnalyzerSet::new(analyzers))
}

#[test]
fn test_semantic_signature_beats_tags() {
    let project = TestProject::new();
    project.add_file("add.c", ADD_C);

    let index = builder(&project, vec![tags_stub(), semantic_stub()]).open().unwrap();
    index.build_index(&BuildOptions::default()).unwrap();

    let found = index.search_exact("add");
    assert_eq!(found.items.len(), 1, "both facts describe one declaration");
    let add = &found.items[0];
    assert_eq!(add.signature.as_deref(), Some("int (int, int)"));
    assert_eq!(add.providers_for(Field::Signature), ["clang-stub".to_string()]);
    assert_eq!(add.line, 1);
}

#[test]
fn test_priority_order_is_configurable() {
    let project = TestProject::new();
    project.add_file("add.c", ADD_C);

    let index = builder(&project, vec![semantic_stub(), tags_stub()])
        .policy(MergePolicy::new(vec![ProviderKind::Tags, ProviderKind::Semantic]))
        .open()
        .unwrap();
    index.build_index(&BuildOptions::default()).unwrap();

    let add = &index.search_exact("add").items[0];
    assert_eq!(add.signature.as_deref(), Some("(int a, int b)"));
    // Spans still come from the only provider that reports them
    assert_eq!(add.line, 1);
}

#[test]
fn test_failing_call_graph_provider_degrades_gracefully() {
    let project = TestProject::new();
    project.add_file(
        "main.c",
        "static int helper(int x)\n{\n    return x * 2;\n}\n\nint main(void)\n{\n    return helper(21);\n}\n",
    );

    let calls = Failing::new("calls", ProviderKind::CallGraph, Capabilities::CALL_EDGES);
    let index = builder(&project, vec![Arc::new(SyntaxAnalyzer::new()), calls.clone()])
        .open()
        .unwrap();
    let summary = index.build_index(&BuildOptions::default()).unwrap();

    assert_eq!(summary.files_analyzed, 1);
    assert_eq!(summary.adapter_errors.len(), 1);
    assert_eq!(summary.adapter_errors[0].provider, "calls");
    assert!(matches!(summary.adapter_errors[0].kind, AdapterErrorKind::ExitStatus { .. }));
    assert!(summary.file_errors.is_empty());
    assert_eq!(calls.calls(), 1);

    let helper = &index.search_exact("helper").items[0];
    let main = &index.search_exact("main").items[0];
    for symbol in [helper, main] {
        assert_eq!(symbol.kind, SymbolKind::Function);
        assert!(symbol.signature.is_some());
        assert!(symbol.callers.is_empty());
        assert!(symbol.callees.is_empty());
    }
    assert!(index.get_callers(helper.id).items.is_empty());
}

#[test]
fn test_all_providers_failing_marks_file_stale() {
    let project = TestProject::new();
    project.add_file("add.c", ADD_C);

    let index = builder(&project, vec![Arc::new(SyntaxAnalyzer::new())]).open().unwrap();
    index.build_index(&BuildOptions::default()).unwrap();
    let add_id = index.search_exact("add").items[0].id;
    drop(index);

    // Same project, but now the only provider crashes on the edited file
    project.add_file("add.c", "int add(int a, int b)\n{\n    return b + a;\n}\n");
    let broken = Failing::new("syntax", ProviderKind::Syntax, Capabilities::KINDS | Capabilities::SPANS);
    let index = builder(&project, vec![broken]).open().unwrap();
    let summary = index.build_index(&BuildOptions::default()).unwrap();

    assert_eq!(summary.files_stale, 1);
    assert_eq!(summary.adapter_errors.len(), 1);
    let snapshot = index.snapshot();
    assert!(snapshot.file("add.c").unwrap().stale);
    assert!(snapshot.symbol(add_id).is_some(), "previous symbols stay visible");
    assert_eq!(index.get_statistics().stale_files, 1);
}
