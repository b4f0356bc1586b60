//! Full-project sweep
//!
//! Analysis fans out over a rayon pool sized by `indexing.parallel_threads`;
//! each worker reads one file, compares its fingerprint with the committed
//! snapshot, runs the analyzers and merges the facts. Results flow over a
//! bounded channel to the calling thread, which is the only committer. The
//! committer stages files in one [`CommitBatch`] and publishes a snapshot
//! every `indexing.commit_batch_size` files, so call edges are relinked once
//! per batch rather than once per file. Cancellation is checked after every
//! commit.

use super::file_info::{FileState, calculate_hash};
use super::progress::{IndexSummary, SweepProgress};
use super::walker::{FileWalker, relative_path};
use crate::adapters::{AnalysisRequest, AnalyzerSet, ProviderTable};
use crate::error::AdapterError;
use crate::merge::{MergePolicy, merge_file};
use crate::storage::{CommitBatch, FileRecord, IndexStore, ProjectIndex};
use crate::symbol::Symbol;
use crate::{IndexError, IndexResult, Settings};
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Callback invoked once per processed file
pub type ProgressFn<'a> = dyn Fn(&SweepProgress) + Send + Sync + 'a;

/// Outcome of analyzing one file on a worker
#[derive(Debug)]
enum FileOutcome {
    Unchanged,
    Analyzed {
        record: FileRecord,
        symbols: Vec<Symbol>,
        errors: Vec<AdapterError>,
    },
    /// Every provider failed; nothing to commit
    AllFailed { errors: Vec<AdapterError> },
    ReadFailed(String),
}

#[derive(Debug)]
struct FileJob {
    path: PathBuf,
    relative: String,
}

pub struct Indexer {
    settings: Arc<Settings>,
    analyzers: AnalyzerSet,
    providers: ProviderTable,
    policy: MergePolicy,
}

impl Indexer {
    pub fn new(settings: Arc<Settings>, analyzers: AnalyzerSet) -> Self {
        let providers = analyzers.provider_table();
        let policy = MergePolicy::from_settings(&settings);
        Self {
            settings,
            analyzers,
            providers,
            policy,
        }
    }

    pub fn with_policy(mut self, policy: MergePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn analyzers(&self) -> &AnalyzerSet {
        &self.analyzers
    }

    /// Bring `store` in line with the files under `root`.
    ///
    /// Only a missing project root is fatal. Provider, read and commit
    /// failures are collected in the returned summary.
    pub fn sweep(
        &self,
        root: &Path,
        store: &IndexStore,
        cancel: &CancellationToken,
        progress: Option<&ProgressFn<'_>>,
    ) -> IndexResult<IndexSummary> {
        if !root.is_dir() {
            return Err(IndexError::ProjectNotFound {
                path: root.to_path_buf(),
            });
        }

        let mut summary = IndexSummary::new();
        let walker = FileWalker::new(self.settings.clone());
        let jobs: Vec<FileJob> = walker
            .walk(root)
            .into_iter()
            .map(|path| FileJob {
                relative: relative_path(root, &path),
                path,
            })
            .collect();
        info!(root = %root.display(), files = jobs.len(), "starting sweep");

        let mut batch = store.begin();
        self.purge_missing(&mut batch, &jobs, cancel, &mut summary);
        if summary.cancelled {
            batch.finish();
            summary.stop_timing();
            return Ok(summary);
        }

        let threads = self.settings.indexing.parallel_threads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("codeweave-analyze-{i}"))
            .build()
            .map_err(|e| IndexError::General(format!("Failed to build worker pool: {e}")))?;

        let snapshot = batch.working();
        let batch_size = self.settings.indexing.commit_batch_size.max(1);
        let total = jobs.len();
        let (tx, rx) = crossbeam_channel::bounded::<(String, FileOutcome)>(threads * 2);
        let mut done = 0;

        std::thread::scope(|scope| {
            let pool = &pool;
            let jobs = &jobs;
            let snapshot = &snapshot;
            scope.spawn(move || {
                pool.install(|| {
                    jobs.par_iter().for_each_with(tx, |tx, job| {
                        if cancel.is_cancelled() {
                            return;
                        }
                        let outcome = self.analyze_file(root, job, snapshot);
                        // The committer hung up after a cancellation
                        let _ = tx.send((job.relative.clone(), outcome));
                    });
                });
            });

            for (relative, outcome) in rx {
                self.apply(&mut batch, &relative, outcome, &mut summary);
                if batch.pending() >= batch_size {
                    batch.publish();
                }
                done += 1;
                if let Some(report) = progress {
                    report(&SweepProgress {
                        done,
                        total,
                        file: relative,
                    });
                }
                if cancel.is_cancelled() {
                    warn!(done, total, "sweep cancelled");
                    summary.cancelled = true;
                    break;
                }
            }
        });
        batch.finish();
        if done < total && cancel.is_cancelled() {
            summary.cancelled = true;
        }

        if let Err(e) = store.save_metadata() {
            warn!("failed to write index metadata: {e}");
        }

        summary.stop_timing();
        info!(
            analyzed = summary.files_analyzed,
            skipped = summary.files_skipped,
            purged = summary.files_purged,
            failed = summary.files_failed,
            "sweep finished"
        );
        Ok(summary)
    }

    /// Remove records for files that are no longer part of the project
    fn purge_missing(
        &self,
        batch: &mut CommitBatch<'_>,
        jobs: &[FileJob],
        cancel: &CancellationToken,
        summary: &mut IndexSummary,
    ) {
        let present: HashSet<&str> = jobs.iter().map(|j| j.relative.as_str()).collect();
        let snapshot = batch.working();
        let missing: Vec<&str> = snapshot
            .files()
            .map(|r| r.path.as_str())
            .filter(|p| !present.contains(p))
            .collect();

        for path in missing {
            match batch.purge_file(path) {
                Ok(ids) => {
                    debug!(file = path, symbols = ids.len(), "purged deleted file");
                    summary.files_purged += 1;
                }
                Err(e) => {
                    warn!(file = path, "{e}");
                    summary.add_file_error(path, e.to_string());
                }
            }
            if cancel.is_cancelled() {
                summary.cancelled = true;
                return;
            }
        }
    }

    fn analyze_file(&self, root: &Path, job: &FileJob, snapshot: &ProjectIndex) -> FileOutcome {
        let bytes = match std::fs::read(&job.path) {
            Ok(bytes) => bytes,
            Err(e) => return FileOutcome::ReadFailed(e.to_string()),
        };
        let fingerprint = calculate_hash(&bytes);

        let previous = snapshot.file(&job.relative);
        let state = FileState::classify(previous, &fingerprint);
        if state == FileState::Unchanged && !previous.is_some_and(|r| r.stale) {
            return FileOutcome::Unchanged;
        }

        let source = String::from_utf8_lossy(&bytes);
        let request = AnalysisRequest {
            path: &job.path,
            relative: &job.relative,
            root,
            source: &source,
            timeout: Duration::from_secs(self.settings.indexing.provider_timeout_secs),
        };
        let analysis = self.analyzers.run(&request);
        if analysis.total_failure() {
            return FileOutcome::AllFailed {
                errors: analysis.errors,
            };
        }

        let merged = merge_file(&job.relative, &analysis.facts, &self.providers, &self.policy);
        let mut record = FileRecord::new(job.relative.clone(), fingerprint);
        record.call_refs = merged.call_refs;
        record.includes = merged.includes;
        record.diagnostics = merged.diagnostics;
        record.line_count = source.lines().count();

        FileOutcome::Analyzed {
            record,
            symbols: merged.symbols,
            errors: analysis.errors,
        }
    }

    fn apply(&self, batch: &mut CommitBatch<'_>, relative: &str, outcome: FileOutcome, summary: &mut IndexSummary) {
        match outcome {
            FileOutcome::Unchanged => summary.files_skipped += 1,
            FileOutcome::Analyzed {
                record,
                symbols,
                errors,
            } => {
                summary.adapter_errors.extend(errors);
                let count = symbols.len();
                match batch.commit_file(record, symbols) {
                    Ok(_) => {
                        summary.files_analyzed += 1;
                        summary.symbols_committed += count;
                    }
                    Err(e) => {
                        warn!(file = relative, "{e}");
                        summary.add_file_error(relative, e.to_string());
                    }
                }
            }
            FileOutcome::AllFailed { errors } => {
                summary.adapter_errors.extend(errors);
                match batch.mark_stale(relative) {
                    Ok(true) => summary.files_stale += 1,
                    Ok(false) => {
                        summary.add_file_error(relative, "every provider failed".to_string())
                    }
                    Err(e) => summary.add_file_error(relative, e.to_string()),
                }
            }
            FileOutcome::ReadFailed(reason) => {
                warn!(file = relative, "failed to read: {reason}");
                summary.add_file_error(relative, reason);
            }
        }
    }
}

impl std::fmt::Debug for Indexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Indexer")
            .field("analyzers", &self.analyzers)
            .field("policy", &self.policy)
            .finish()
    }
}
