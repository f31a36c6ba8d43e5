//! On-disk stores: per-request staging for uploads, a flat output directory
//! for results, and TTL eviction over both.

pub mod output;
pub mod retention;
pub mod staging;

pub use output::{is_plain_name, OutputStore, StoredFile};
pub use retention::{spawn_sweeper, sweep, SweepStats};
pub use staging::{sanitize_file_name, RequestStage, StagedFile, StagingArea};
