//! Sweep behaviour across runs: skipping, re-analysis, purging, failures

use crate::common::{
    Counting, FlakyBackend, HashEmbedder, TestProject, builtin_analyzers, settings,
    settings_without_embeddings,
};
use codeweave::adapters::{Analyzer, AnalyzerSet, CallGraphAnalyzer, SyntaxAnalyzer};
use codeweave::indexing::{ProgressFn, SweepProgress};
use codeweave::vector::VectorIndex;
use codeweave::{BuildOptions, CodeIndex, Symbol, SymbolId};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const MATH_C: &str = "\
int add(int a, int b)
{
    return a + b;
}

int sub(int a, int b)
{
    return a - b;
}
";

const UTIL_C: &str = "\
/* Prints a greeting. */
void greet(const char *name)
{
    puts(name);
}
";

fn sorted_symbols(index: &CodeIndex) -> Vec<Symbol> {
    let snapshot = index.snapshot();
    let mut symbols: Vec<Symbol> = snapshot.symbols().cloned().collect();
    symbols.sort_by_key(|s| s.id);
    symbols
}

fn file_ids(index: &CodeIndex, path: &str) -> Vec<SymbolId> {
    index.snapshot().file(path).unwrap().symbol_ids.clone()
}

#[test]
fn test_unchanged_project_is_not_reanalyzed() {
    let project = TestProject::new();
    project.add_file("math.c", MATH_C);
    project.add_file("src/util.c", UTIL_C);

    let syntax = Counting::new(Arc::new(SyntaxAnalyzer::new()));
    let calls = Counting::new(Arc::new(CallGraphAnalyzer::new()));
    let analyzers: Vec<Arc<dyn Analyzer>> = vec![syntax.clone(), calls.clone()];

    let index = CodeIndex::builder(project.path(), settings_without_embeddings())
        .analyzers(AnalyzerSet::new(analyzers))
        .open()
        .unwrap();

    let first = index.build_index(&BuildOptions::default()).unwrap();
    assert_eq!(first.files_analyzed, 2);
    assert_eq!(syntax.calls(), 2);
    assert_eq!(calls.calls(), 2);
    let before = serde_json::to_string(&sorted_symbols(&index)).unwrap();

    let second = index.build_index(&BuildOptions::default()).unwrap();
    assert_eq!(second.files_analyzed, 0);
    assert_eq!(second.files_skipped, 2);
    assert_eq!(syntax.calls(), 2, "unchanged files must not reach the analyzers");
    assert_eq!(calls.calls(), 2);

    let after = serde_json::to_string(&sorted_symbols(&index)).unwrap();
    assert_eq!(before, after);
}

#[test]
fn test_modified_file_leaves_other_files_untouched() {
    let project = TestProject::new();
    project.add_file("math.c", MATH_C);
    project.add_file("util.c", UTIL_C);

    let index = CodeIndex::builder(project.path(), settings_without_embeddings())
        .analyzers(builtin_analyzers())
        .open()
        .unwrap();
    index.build_index(&BuildOptions::default()).unwrap();

    let util_before: Vec<Symbol> = index
        .get_file_symbols("util.c")
        .items;
    let math_fingerprint = index.snapshot().file("math.c").unwrap().content_fingerprint.clone();

    // Same layout, different body
    project.add_file("math.c", &MATH_C.replace("a - b", "b - a"));
    let summary = index.build_index(&BuildOptions::default()).unwrap();
    assert_eq!(summary.files_analyzed, 1);
    assert_eq!(summary.files_skipped, 1);

    assert_eq!(index.get_file_symbols("util.c").items, util_before);
    let snapshot = index.snapshot();
    assert_ne!(snapshot.file("math.c").unwrap().content_fingerprint, math_fingerprint);
    assert_eq!(index.search_exact("sub").items.len(), 1);
}

#[test]
fn test_moved_function_gets_new_id() {
    let project = TestProject::new();
    project.add_file("math.c", MATH_C);

    let index = CodeIndex::builder(project.path(), settings_without_embeddings())
        .analyzers(builtin_analyzers())
        .open()
        .unwrap();
    index.build_index(&BuildOptions::default()).unwrap();
    let old_sub = index.search_exact("sub").items[0].id;
    let old_add = index.search_exact("add").items[0].id;

    project.add_file("math.c", &format!("\n\n{MATH_C}"));
    index.build_index(&BuildOptions::default()).unwrap();

    let new_sub = index.search_exact("sub").items[0].id;
    assert_ne!(old_sub, new_sub);
    assert_ne!(old_add, index.search_exact("add").items[0].id);
    assert!(index.get_symbol(old_sub).is_none());
    assert_eq!(index.get_statistics().symbols, 2);
}

#[test]
fn test_deleted_file_is_purged_from_store_and_vectors() {
    let project = TestProject::new();
    project.add_file("math.c", MATH_C);
    project.add_file("util.c", UTIL_C);
    let embedder = HashEmbedder::new(32);

    let index = CodeIndex::builder(project.path(), settings())
        .analyzers(builtin_analyzers())
        .embedder(embedder.clone())
        .open()
        .unwrap();
    let first = index.build_index(&BuildOptions::default()).unwrap();
    assert_eq!(first.embeddings.as_ref().unwrap().embedded, 3);

    let vector_dir = index.settings().index_dir(index.root()).join("vectors");
    let util_ids = file_ids(&index, "util.c");
    assert_eq!(util_ids.len(), 1);
    let stored = VectorIndex::load(&vector_dir, "test-hash", 32).unwrap().unwrap();
    assert!(stored.contains(util_ids[0]));

    project.remove_file("util.c");
    let summary = index.build_index(&BuildOptions::default()).unwrap();
    assert_eq!(summary.files_purged, 1);
    assert_eq!(summary.embeddings.as_ref().unwrap().removed, 1);

    let snapshot = index.snapshot();
    assert!(snapshot.file("util.c").is_none());
    assert!(snapshot.symbol(util_ids[0]).is_none());
    assert!(index.search_exact("greet").items.is_empty());

    let stored = VectorIndex::load(&vector_dir, "test-hash", 32).unwrap().unwrap();
    assert!(!stored.contains(util_ids[0]));
    assert_eq!(stored.len(), 2);
    assert_eq!(index.get_statistics().embedded, 2);
    // Nothing new to embed
    assert_eq!(embedder.embedded(), 3);
}

#[test]
fn test_commit_failure_keeps_previous_state() {
    let project = TestProject::new();
    project.add_file("math.c", MATH_C);
    project.add_file("util.c", UTIL_C);
    let backend = FlakyBackend::new();

    let index = CodeIndex::builder(project.path(), settings_without_embeddings())
        .analyzers(builtin_analyzers())
        .backend(backend.clone())
        .open()
        .unwrap();
    index.build_index(&BuildOptions::default()).unwrap();
    let committed = sorted_symbols(&index);

    project.add_file("math.c", "int mul(int a, int b)\n{\n    return a * b;\n}\n");
    backend.fail_writes(true);
    let summary = index.build_index(&BuildOptions::default()).unwrap();
    assert_eq!(summary.files_analyzed, 0);
    assert_eq!(summary.files_skipped, 1);
    assert_eq!(summary.file_errors.len(), 1);
    assert_eq!(summary.file_errors[0].0, "math.c");
    assert!(summary.has_errors());

    assert_eq!(sorted_symbols(&index), committed);
    assert_eq!(index.search_exact("add").items.len(), 1);
    assert!(index.search_exact("mul").items.is_empty());

    backend.fail_writes(false);
    let retry = index.build_index(&BuildOptions::default()).unwrap();
    assert_eq!(retry.files_analyzed, 1);
    assert!(index.search_exact("add").items.is_empty());
    assert_eq!(index.search_exact("mul").items.len(), 1);
}

#[test]
fn test_cancelled_sweep_keeps_committed_files() {
    let project = TestProject::new();
    for name in ["a.c", "b.c", "c.c", "d.c"] {
        let function = name.trim_end_matches(".c");
        project.add_file(name, &format!("int fn_{function}(void)\n{{\n    return 0;\n}}\n"));
    }

    let index = CodeIndex::builder(project.path(), settings_without_embeddings())
        .analyzers(builtin_analyzers())
        .open()
        .unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let progress: Arc<ProgressFn<'static>> = Arc::new(move |_: &SweepProgress| trigger.cancel());
    let summary = index
        .build_index(&BuildOptions {
            cancel,
            progress: Some(progress),
        })
        .unwrap();
    assert!(summary.cancelled);
    assert_eq!(summary.files_analyzed, 1);
    assert_eq!(index.snapshot().file_count(), 1);

    let resumed = index.build_index(&BuildOptions::default()).unwrap();
    assert!(!resumed.cancelled);
    assert_eq!(resumed.files_skipped, 1);
    assert_eq!(resumed.files_analyzed, 3);

    let names: BTreeSet<String> = sorted_symbols(&index).into_iter().map(|s| s.name).collect();
    assert_eq!(names.len(), 4);
}

#[test]
fn test_reopen_restores_index_from_disk() {
    let project = TestProject::new();
    project.add_file("math.c", MATH_C);
    project.add_file("main.c", "int main(void)\n{\n    return add(1, 2);\n}\n");

    let index = CodeIndex::builder(project.path(), settings_without_embeddings())
        .analyzers(builtin_analyzers())
        .open()
        .unwrap();
    index.build_index(&BuildOptions::default()).unwrap();
    let before = sorted_symbols(&index);
    drop(index);

    let reopened = CodeIndex::builder(project.path(), settings_without_embeddings())
        .analyzers(builtin_analyzers())
        .open()
        .unwrap();
    assert_eq!(sorted_symbols(&reopened), before);

    let add = reopened.search_exact("add").items[0].id;
    let callers = reopened.get_callers(add);
    assert_eq!(callers.items.len(), 1);
    assert_eq!(callers.items[0].name, "main");
}
