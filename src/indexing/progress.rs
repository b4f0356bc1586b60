//! Sweep summary and progress reporting

use crate::error::AdapterError;
use crate::vector::SyncReport;
use std::time::{Duration, Instant};

/// Cap on per-file error details kept in a summary
const MAX_ERRORS: usize = 100;

/// Progress event emitted once per file by a sweep
#[derive(Debug, Clone)]
pub struct SweepProgress {
    pub done: usize,
    pub total: usize,
    pub file: String,
}

/// Partial-success report returned by a sweep
#[derive(Debug, Default)]
pub struct IndexSummary {
    /// Files whose adapters ran and whose symbols were committed
    pub files_analyzed: usize,

    /// Files skipped because their fingerprint was unchanged
    pub files_skipped: usize,

    /// Files that could not be read or committed, or failed on first sight
    pub files_failed: usize,

    /// Files removed because they disappeared from the project
    pub files_purged: usize,

    /// Files whose providers all failed; previous symbols kept
    pub files_stale: usize,

    /// Symbols written by this sweep
    pub symbols_committed: usize,

    /// Every provider failure, in file order
    pub adapter_errors: Vec<AdapterError>,

    /// Per-file failures that were not provider errors
    pub file_errors: Vec<(String, String)>,

    /// The sweep stopped early at a file boundary
    pub cancelled: bool,

    pub elapsed: Duration,

    /// Embedding pass that followed the sweep, if any
    pub embeddings: Option<SyncReport>,

    start_time: Option<Instant>,
}

impl IndexSummary {
    /// Create a new summary and start timing
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn stop_timing(&mut self) {
        if let Some(start) = self.start_time.take() {
            self.elapsed = start.elapsed();
        }
    }

    /// Record a failed file (details limited to the first 100)
    pub fn add_file_error(&mut self, path: &str, error: String) {
        if self.file_errors.len() < MAX_ERRORS {
            self.file_errors.push((path.to_string(), error));
        }
        self.files_failed += 1;
    }

    /// Whether any file or provider failed
    pub fn has_errors(&self) -> bool {
        self.files_failed > 0 || !self.adapter_errors.is_empty()
    }

    /// Display the summary in a human-readable format
    pub fn display(&self) {
        if self.cancelled {
            println!("\nIndexing cancelled:");
        } else {
            println!("\nIndexing complete:");
        }
        println!("  Files analyzed: {}", self.files_analyzed);
        println!("  Files unchanged: {}", self.files_skipped);
        println!("  Files removed: {}", self.files_purged);
        if self.files_stale > 0 {
            println!("  Files stale: {}", self.files_stale);
        }
        println!("  Files failed: {}", self.files_failed);
        println!("  Symbols committed: {}", self.symbols_committed);
        println!("  Time elapsed: {:.2}s", self.elapsed.as_secs_f64());

        if self.files_analyzed > 0 && self.elapsed.as_secs_f64() > 0.0 {
            let files_per_sec = self.files_analyzed as f64 / self.elapsed.as_secs_f64();
            println!("  Performance: {files_per_sec:.0} files/second");
        }

        if let Some(report) = &self.embeddings {
            println!(
                "  Embeddings: {} embedded, {} removed, {} total",
                report.embedded, report.removed, report.total
            );
            if let Some(reason) = &report.unavailable {
                println!("  Semantic search unavailable: {reason}");
            }
        }

        if !self.adapter_errors.is_empty() {
            println!(
                "\nProvider errors (showing first {}):",
                self.adapter_errors.len().min(5)
            );
            for error in self.adapter_errors.iter().take(5) {
                println!("  {error}");
            }
            if self.adapter_errors.len() > 5 {
                println!("  ... and {} more", self.adapter_errors.len() - 5);
            }
        }

        if !self.file_errors.is_empty() {
            println!(
                "\nFile errors (showing first {}):",
                self.file_errors.len().min(5)
            );
            for (path, error) in self.file_errors.iter().take(5) {
                println!("  {path}: {error}");
            }
            if self.file_errors.len() > 5 {
                println!("  ... and {} more", self.file_errors.len() - 5);
            }
        }
    }
}
