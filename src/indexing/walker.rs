//! File system walker for discovering C sources to index
//!
//! Respects `.gitignore`, `.codeweaveignore`, and `indexing.ignore_patterns`
//! from the settings (gitignore syntax).

use crate::Settings;
use crate::config::IGNORE_FILE;
use ignore::WalkBuilder;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// Walks directories to find source files to index
#[derive(Debug)]
pub struct FileWalker {
    settings: Arc<Settings>,
}

impl FileWalker {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self { settings }
    }

    /// Walk `root` and return matching files in path order
    pub fn walk(&self, root: &Path) -> Vec<PathBuf> {
        let mut builder = WalkBuilder::new(root);
        builder
            .hidden(true)
            .git_ignore(true)
            .git_global(false)
            .git_exclude(true)
            .follow_links(false)
            .require_git(false)
            .sort_by_file_path(|a, b| a.cmp(b));
        builder.add_custom_ignore_filename(IGNORE_FILE);

        let patterns = self.pattern_matcher(root);
        let extensions = &self.settings.indexing.extensions;
        let max_size = self.settings.indexing.max_file_size;
        let index_dir = self.settings.index_dir(root);

        builder
            .build()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .map(|entry| entry.into_path())
            .filter(|path| !path.starts_with(&index_dir))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| extensions.iter().any(|e| e == ext))
            })
            .filter(|path| {
                patterns
                    .as_ref()
                    .is_none_or(|m| !m.matched_path_or_any_parents(path, false).is_ignore())
            })
            .filter(|path| match path.metadata() {
                Ok(meta) if meta.len() > max_size => {
                    warn!(file = %path.display(), size = meta.len(), "skipping file above max_file_size");
                    false
                }
                _ => true,
            })
            .collect()
    }

    fn pattern_matcher(&self, root: &Path) -> Option<Gitignore> {
        let patterns = &self.settings.indexing.ignore_patterns;
        if patterns.is_empty() {
            return None;
        }
        let mut builder = GitignoreBuilder::new(root);
        for pattern in patterns {
            if let Err(e) = builder.add_line(None, pattern) {
                warn!(pattern = %pattern, "invalid ignore pattern: {e}");
            }
        }
        match builder.build() {
            Ok(matcher) => Some(matcher),
            Err(e) => {
                warn!("ignore patterns disabled: {e}");
                None
            }
        }
    }
}

/// Project-relative, `/`-separated form of `path`
pub fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
