//! Checks against the real external tools. Run with `cargo test -- --ignored`
//! on a machine with ctags, clang and cppcheck on the PATH.

use crate::common::{TestProject, settings_without_embeddings};
use codeweave::adapters::{
    AnalysisRequest, Analyzer, AnalyzerSet, ClangAnalyzer, CppcheckAnalyzer, CtagsAnalyzer, FactKind,
};
use codeweave::{BuildOptions, CodeIndex, Field, SymbolKind};
use std::path::Path;
use std::time::Duration;

const SOURCE: &str = "\
struct point {
    int x;
    int y;
};

/* Manhattan length */
int length(struct point *p)
{
    int buf[2];
    buf[2] = p->x;
    return p->x + p->y;
}
";

fn request<'a>(project: &'a TestProject, path: &'a Path) -> AnalysisRequest<'a> {
    AnalysisRequest {
        path,
        relative: "point.c",
        root: project.path(),
        source: SOURCE,
        timeout: Duration::from_secs(30),
    }
}

#[test]
#[ignore = "requires universal-ctags"]
fn test_ctags_reports_functions_and_structs() {
    let project = TestProject::new();
    let path = project.add_file("point.c", SOURCE);

    let facts = CtagsAnalyzer::new(Path::new("ctags"))
        .analyze(&request(&project, &path))
        .unwrap();
    let length = facts.iter().find(|f| f.name == "length").unwrap();
    assert_eq!(length.kind_hint, FactKind::Symbol(SymbolKind::Function));
    assert_eq!(length.span.line, 7);
    assert!(facts.iter().any(|f| f.name == "point" && f.kind_hint == FactKind::Symbol(SymbolKind::Struct)));
}

#[test]
#[ignore = "requires clang"]
fn test_clang_reports_typed_signature() {
    let project = TestProject::new();
    let path = project.add_file("point.c", SOURCE);

    let facts = ClangAnalyzer::new(Path::new("clang"), Vec::new())
        .analyze(&request(&project, &path))
        .unwrap();
    let length = facts.iter().find(|f| f.name == "length").unwrap();
    assert_eq!(length.kind_hint, FactKind::Symbol(SymbolKind::Function));
    assert!(length.text("signature").unwrap().contains("struct point *"));
}

#[test]
#[ignore = "requires cppcheck"]
fn test_cppcheck_finding_attaches_to_function() {
    let project = TestProject::new();
    let path = project.add_file("point.c", SOURCE);

    let facts = CppcheckAnalyzer::new(Path::new("cppcheck"))
        .analyze(&request(&project, &path))
        .unwrap();
    assert!(facts.iter().any(|f| f.kind_hint == FactKind::Diagnostic && f.span.line == 10));

    let mut settings = settings_without_embeddings();
    settings.providers.enabled = vec!["syntax".into(), "cppcheck".into()];
    let index = CodeIndex::builder(project.path(), settings.clone())
        .analyzers(AnalyzerSet::from_settings(&settings))
        .open()
        .unwrap();
    index.build_index(&BuildOptions::default()).unwrap();

    let length = &index.search_exact("length").items[0];
    assert!(!length.diagnostics.is_empty());
    assert_eq!(length.providers_for(Field::Diagnostics), ["cppcheck".to_string()]);
}

#[test]
#[ignore = "requires ctags, clang and cppcheck"]
fn test_full_provider_stack() {
    let project = TestProject::new();
    project.add_file("point.c", SOURCE);

    let index = CodeIndex::open(project.path(), settings_without_embeddings()).unwrap();
    let summary = index.build_index(&BuildOptions::default()).unwrap();
    assert!(summary.adapter_errors.is_empty(), "{:?}", summary.adapter_errors);

    let length = &index.search_exact("length").items[0];
    assert_eq!(length.doc_comment.as_deref(), Some("Manhattan length"));
    assert!(length.complexity.is_some());
    assert!(index.get_symbols_by_kind(SymbolKind::Struct).items.iter().any(|s| s.name == "point"));
}
