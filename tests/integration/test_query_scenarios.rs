//! End-to-end queries against indexed projects

use crate::common::{HashEmbedder, TestProject, builtin_analyzers, settings, settings_without_embeddings};
use codeweave::{BuildOptions, CodeIndex, Direction, IndexError, QueryStatus, SymbolId, SymbolKind};

const FILE_A: &str = "int add(int a, int b)\n{\n    return a + b;\n}\n";
const FILE_B: &str = "int add(int a, int b);\n\nint sum3(int a, int b, int c)\n{\n    return add(add(a, b), c);\n}\n";

fn index_with_embedder(project: &TestProject) -> CodeIndex {
    CodeIndex::builder(project.path(), settings())
        .analyzers(builtin_analyzers())
        .embedder(HashEmbedder::new(128))
        .open()
        .unwrap()
}

#[test]
fn test_add_caller_scenario() {
    let project = TestProject::new();
    project.add_file("file_a.c", FILE_A);
    project.add_file("file_b.c", FILE_B);

    let index = CodeIndex::builder(project.path(), settings_without_embeddings())
        .analyzers(builtin_analyzers())
        .open()
        .unwrap();
    index.build_index(&BuildOptions::default()).unwrap();

    let found = index.search_exact("add");
    assert_eq!(found.status, QueryStatus::Ok);
    assert_eq!(found.items.len(), 1, "the prototype in file_b.c is not a second symbol");
    let add = &found.items[0];
    assert_eq!(add.kind, SymbolKind::Function);
    assert_eq!(add.file, "file_a.c");

    let callers = index.get_callers(add.id);
    assert_eq!(callers.items.len(), 1);
    assert_eq!(callers.items[0].name, "sum3");
    assert_eq!(callers.items[0].file, "file_b.c");

    project.remove_file("file_b.c");
    index.build_index(&BuildOptions::default()).unwrap();

    let found = index.search_exact("add");
    assert_eq!(found.items.len(), 1);
    assert_eq!(found.items[0].id, add.id);
    let callers = index.get_callers(add.id);
    assert!(callers.items.is_empty());
    assert_eq!(callers.status, QueryStatus::Ok);
}

#[test]
fn test_semantic_ranking_is_deterministic() {
    let project = TestProject::new();
    project.add_file("file_a.c", FILE_A);
    project.add_file("file_b.c", FILE_B);
    project.add_file(
        "print.c",
        "/* Print a value to stdout. */\nvoid print_value(int value)\n{\n    printf(\"%d\\n\", value);\n}\n",
    );

    let index = index_with_embedder(&project);
    index.build_index(&BuildOptions::default()).unwrap();

    let ranked = |index: &CodeIndex| -> Vec<(SymbolId, f32)> {
        index
            .search_semantic("print value", 10)
            .items
            .into_iter()
            .map(|hit| (hit.symbol.id, hit.score))
            .collect()
    };

    let first = ranked(&index);
    assert!(!first.is_empty());
    assert_eq!(index.get_symbol(first[0].0).unwrap().name, "print_value");
    assert_eq!(ranked(&index), first);
    assert!(first.windows(2).all(|w| w[0].1 >= w[1].1));

    // Vectors reloaded from disk rank the same way
    drop(index);
    let reopened = index_with_embedder(&project);
    assert_eq!(ranked(&reopened), first);
}

#[test]
fn test_semantic_limit_is_clamped() {
    let project = TestProject::new();
    project.add_file("file_a.c", FILE_A);
    project.add_file("file_b.c", FILE_B);

    let index = index_with_embedder(&project);
    index.build_index(&BuildOptions::default()).unwrap();

    assert_eq!(index.search_semantic("add", 0).items.len(), 1);
    assert_eq!(index.search_semantic("add", 1000).items.len(), 2);
}

#[test]
fn test_queries_before_indexing_report_empty_index() {
    let project = TestProject::new();
    project.add_file("file_a.c", FILE_A);
    let index = index_with_embedder(&project);

    assert_eq!(index.search_exact("add").status, QueryStatus::IndexEmpty);
    assert_eq!(index.get_symbols_by_kind(SymbolKind::Function).status, QueryStatus::IndexEmpty);
    assert_eq!(index.search_semantic("add", 5).status, QueryStatus::IndexEmpty);
    assert_eq!(index.get_statistics().files, 0);
}

#[test]
fn test_unknown_symbol_id() {
    let project = TestProject::new();
    project.add_file("file_a.c", FILE_A);
    let index = CodeIndex::builder(project.path(), settings_without_embeddings())
        .analyzers(builtin_analyzers())
        .open()
        .unwrap();
    index.build_index(&BuildOptions::default()).unwrap();

    let result = index.get_callees(SymbolId(42));
    assert_eq!(result.status, QueryStatus::UnknownSymbol);
    assert_eq!(result.status.exit_code(), 3);
}

#[test]
fn test_call_graph_traversal_survives_cycles() {
    let project = TestProject::new();
    project.add_file(
        "cycle.c",
        "void ping(int n);\n\nvoid pong(int n)\n{\n    if (n) ping(n - 1);\n}\n\nvoid ping(int n)\n{\n    if (n) pong(n - 1);\n    log_hit();\n}\n\nvoid log_hit(void)\n{\n}\n",
    );
    let index = CodeIndex::builder(project.path(), settings_without_embeddings())
        .analyzers(builtin_analyzers())
        .open()
        .unwrap();
    index.build_index(&BuildOptions::default()).unwrap();

    let ping = index.search_exact("ping").items[0].id;
    let reached = index.traverse_calls(ping, Direction::Callees, 10);
    let names: Vec<(String, u32)> = reached
        .items
        .into_iter()
        .map(|(symbol, depth)| (symbol.name, depth))
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&("pong".to_string(), 1)));
    assert!(names.contains(&("log_hit".to_string(), 1)));

    let log_hit = index.search_exact("log_hit").items[0].id;
    let up = index.traverse_calls(log_hit, Direction::Callers, 1);
    assert_eq!(up.items.len(), 1);
    assert_eq!(up.items[0].0.name, "ping");
}

#[test]
fn test_missing_project_root() {
    let project = TestProject::new();
    let missing = project.path().join("does-not-exist");

    let err = CodeIndex::open(&missing, settings()).unwrap_err();
    assert!(matches!(err, IndexError::ProjectNotFound { .. }));
    assert_eq!(err.status_code(), "PROJECT_NOT_FOUND");
    assert!(!missing.exists(), "no partial state is created");
}

#[test]
fn test_statistics_after_indexing() {
    let project = TestProject::new();
    project.add_file("file_a.c", FILE_A);
    project.add_file("file_b.c", FILE_B);
    project.add_file("shapes.h", "#include <stddef.h>\n\nstruct point {\n    int x;\n    int y;\n};\n");

    let index = index_with_embedder(&project);
    index.build_index(&BuildOptions::default()).unwrap();

    let stats = index.get_statistics();
    assert_eq!(stats.files, 3);
    assert_eq!(stats.by_kind[&SymbolKind::Function], 2);
    assert_eq!(stats.by_kind[&SymbolKind::Struct], 1);
    assert_eq!(stats.call_edges, 1);
    assert_eq!(stats.include_edges, 1);
    assert_eq!(stats.embedded, stats.symbols);
}

#[test]
fn test_files_including_header() {
    let project = TestProject::new();
    project.add_file("include/util.h", "int clamp(int v, int lo, int hi);\n");
    project.add_file(
        "main.c",
        "#include <stdio.h>\n#include \"include/util.h\"\n\nint main(void)\n{\n    return clamp(1, 0, 2);\n}\n",
    );
    project.add_file("util.c", "#include \"util.h\"\n\nint clamp(int v, int lo, int hi)\n{\n    return v < lo ? lo : v > hi ? hi : v;\n}\n");

    let index = CodeIndex::builder(project.path(), settings_without_embeddings())
        .analyzers(builtin_analyzers())
        .open()
        .unwrap();
    index.build_index(&BuildOptions::default()).unwrap();

    let hits = index.get_files_including("util.h");
    assert_eq!(hits.status, QueryStatus::Ok);
    let files: Vec<&str> = hits.items.iter().map(|hit| hit.file.as_str()).collect();
    assert_eq!(files, ["main.c", "util.c"]);
    assert_eq!(hits.items[0].include, "include/util.h");

    assert_eq!(index.get_files_including("stdlib.h").status, QueryStatus::NotFound);
}
