//! Terminal output for the CLI: progress bars and plain-text formatting.

pub mod format;
pub mod progress;

pub use format::{OutputFormat, format_symbol, format_timestamp, print_statistics};
pub use progress::{create_progress_bar, create_spinner};
