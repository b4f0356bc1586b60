//! Watch mode driving real sweeps

use crate::common::{TestProject, builtin_analyzers, settings_without_embeddings};
use codeweave::{BuildOptions, CodeIndex, IndexWatcher, QueryStatus};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

fn watched_index(project: &TestProject) -> Arc<CodeIndex> {
    let mut settings = settings_without_embeddings();
    settings.watch.debounce_ms = 200;
    let index = CodeIndex::builder(project.path(), settings)
        .analyzers(builtin_analyzers())
        .open()
        .unwrap();
    index.build_index(&BuildOptions::default()).unwrap();
    Arc::new(index)
}

async fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if done() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    done()
}

/// Rewrites `path` every 40ms until `stop` is set
fn churn(path: PathBuf, stop: Arc<AtomicBool>) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let mut n = 0u64;
        while !stop.load(Ordering::Relaxed) {
            let _ = std::fs::write(&path, format!("step {n}\n"));
            n += 1;
            std::thread::sleep(Duration::from_millis(40));
        }
    })
}

#[tokio::test]
async fn test_edit_is_reindexed() {
    let project = TestProject::new();
    project.add_file("a.c", "int alpha(void)\n{\n    return 1;\n}\n");
    let index = watched_index(&project);
    assert_eq!(index.search_exact("alpha").status, QueryStatus::Ok);

    let watcher = IndexWatcher::new(index.clone()).unwrap();
    let shutdown = CancellationToken::new();

    let driver = async {
        project.add_file("a.c", "int beta(void)\n{\n    return 2;\n}\n");
        let picked_up = wait_until(Duration::from_secs(5), || {
            index.search_exact("beta").status == QueryStatus::Ok
        })
        .await;
        shutdown.cancel();
        picked_up
    };
    let (stopped, picked_up) = tokio::join!(watcher.watch(shutdown.clone()), driver);

    stopped.unwrap();
    assert!(picked_up);
    assert_eq!(index.search_exact("alpha").status, QueryStatus::NotFound);
}

#[tokio::test]
async fn test_edit_is_reindexed_while_unrelated_files_churn() {
    let project = TestProject::new();
    project.add_file("a.c", "int alpha(void)\n{\n    return 1;\n}\n");
    let index = watched_index(&project);

    let watcher = IndexWatcher::new(index.clone()).unwrap();
    let shutdown = CancellationToken::new();
    let stop = Arc::new(AtomicBool::new(false));
    let noise = churn(project.path().join("build.log"), stop.clone());

    let driver = async {
        tokio::time::sleep(Duration::from_millis(150)).await;
        project.add_file("a.c", "int beta(void)\n{\n    return 2;\n}\n");
        let picked_up = wait_until(Duration::from_secs(5), || {
            index.search_exact("beta").status == QueryStatus::Ok
        })
        .await;
        shutdown.cancel();
        picked_up
    };
    let (stopped, picked_up) = tokio::join!(watcher.watch(shutdown.clone()), driver);

    stop.store(true, Ordering::Relaxed);
    noise.join().unwrap();
    stopped.unwrap();
    assert!(picked_up, "edit was not re-indexed while build.log kept changing");
}
