//! Watch mode: re-run the incremental sweep when sources change.
//!
//! Events are filtered to files the walker would index, collapsed by a
//! debounce window, and then handed to a full [`CodeIndex::build_index`]
//! on the blocking pool. The sweep itself decides what changed, so new,
//! modified and deleted files are all handled the same way. Removals are
//! always relevant outside the index directory, since a removed directory
//! has no extension to filter on.

use crate::index::{BuildOptions, CodeIndex};
use crate::{IndexError, IndexResult};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How often pending changes are checked against the debounce window
const TICK: Duration = Duration::from_millis(100);

/// Tracks the most recent relevant change
#[derive(Debug)]
struct Debouncer {
    window: Duration,
    last_change: Option<Instant>,
}

impl Debouncer {
    fn new(window: Duration) -> Self {
        Self {
            window,
            last_change: None,
        }
    }

    fn record(&mut self, at: Instant) {
        self.last_change = Some(at);
    }

    /// True once, after the window has passed since the last change
    fn take_ready(&mut self, now: Instant) -> bool {
        match self.last_change {
            Some(at) if now.duration_since(at) >= self.window => {
                self.last_change = None;
                true
            }
            _ => false,
        }
    }
}

pub struct IndexWatcher {
    index: Arc<CodeIndex>,
    debounce: Duration,
    index_dir: PathBuf,
    extensions: Vec<String>,
    event_rx: mpsc::Receiver<notify::Result<Event>>,
    /// Kept alive for as long as events should flow
    _watcher: notify::RecommendedWatcher,
}

impl IndexWatcher {
    pub fn new(index: Arc<CodeIndex>) -> IndexResult<Self> {
        let (tx, rx) = mpsc::channel(256);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            // The callback runs on notify's own thread
            let _ = tx.blocking_send(res);
        })
        .map_err(|e| IndexError::General(format!("Failed to create file watcher: {e}. Check system resources")))?;

        watcher
            .watch(index.root(), RecursiveMode::Recursive)
            .map_err(|e| IndexError::General(format!("Cannot watch {}: {e}", index.root().display())))?;

        let settings = index.settings();
        Ok(Self {
            debounce: Duration::from_millis(settings.watch.debounce_ms),
            index_dir: settings.index_dir(index.root()),
            extensions: settings.indexing.extensions.clone(),
            index,
            event_rx: rx,
            _watcher: watcher,
        })
    }

    /// Whether `event` can affect the index
    fn is_relevant(&self, event: &Event) -> bool {
        is_relevant_event(event, &self.index_dir, &self.extensions)
    }

    /// Process events until `shutdown` fires
    pub async fn watch(mut self, shutdown: CancellationToken) -> IndexResult<()> {
        info!(
            root = %self.index.root().display(),
            debounce_ms = self.debounce.as_millis() as u64,
            "watching for changes"
        );
        let mut debouncer = Debouncer::new(self.debounce);
        // Lives across iterations so a stream of events cannot starve it
        let mut tick = interval(TICK);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("watcher stopped");
                    return Ok(());
                }
                Some(res) = self.event_rx.recv() => {
                    match res {
                        Ok(event) => {
                            if self.is_relevant(&event) {
                                debug!(paths = ?event.paths, "source change");
                                debouncer.record(Instant::now());
                            }
                        }
                        Err(e) => warn!("file watch error: {e}"),
                    }
                }
                _ = tick.tick() => {
                    if debouncer.take_ready(Instant::now()) {
                        self.reindex(&shutdown).await;
                    }
                }
            }
        }
    }

    async fn reindex(&self, shutdown: &CancellationToken) {
        let index = self.index.clone();
        let options = BuildOptions {
            cancel: shutdown.child_token(),
            progress: None,
        };
        let result = tokio::task::spawn_blocking(move || index.build_index(&options)).await;
        match result {
            Ok(Ok(summary)) => info!(
                analyzed = summary.files_analyzed,
                purged = summary.files_purged,
                failed = summary.files_failed,
                "re-indexed after change"
            ),
            Ok(Err(e)) => warn!("re-index failed: {e}"),
            Err(e) => warn!("re-index task panicked: {e}"),
        }
    }
}

fn is_relevant_event(event: &Event, index_dir: &Path, extensions: &[String]) -> bool {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) => event
            .paths
            .iter()
            .any(|p| is_source_path(p, index_dir, extensions)),
        EventKind::Remove(_) => event.paths.iter().any(|p| !p.starts_with(index_dir)),
        _ => false,
    }
}

fn is_source_path(path: &Path, index_dir: &Path, extensions: &[String]) -> bool {
    if path.starts_with(index_dir) {
        return false;
    }
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e == ext))
}
