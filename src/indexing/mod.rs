pub mod file_info;
pub mod pipeline;
pub mod progress;
pub mod walker;

pub use file_info::{FileState, calculate_hash, get_utc_timestamp};
pub use pipeline::{Indexer, ProgressFn};
pub use progress::{IndexSummary, SweepProgress};
pub use walker::{FileWalker, relative_path};
