//! Chunk planning, large-object pointers and transfer helpers.
//!
//! Everything here is pure and synchronous; the async engine lives in
//! `hubferry-migrate`.

mod checksum;
mod filter;
mod format;
mod planner;
mod pointer;
mod retry;
mod validation;

pub use checksum::{checksum_bytes, hashes_match, normalize_hash};
pub use filter::{PathFilter, wildcard_match};
pub use format::{format_duration, format_size};
pub use planner::{ChunkPlanner, plan};
pub use pointer::LargeObjectPointer;
pub use retry::RetryPolicy;
pub use validation::{join_repo_path, validate_repo_path};

/// Default chunk size target: 50 GiB.
///
/// Large enough that a multi-terabyte repository stays within the default
/// chunk budget; small enough that a failed chunk is cheap to re-run.
pub const DEFAULT_TARGET_CHUNK_BYTES: u64 = 50 * 1024 * 1024 * 1024;

/// Default upper bound on large-object chunks per job.
pub const DEFAULT_MAX_CHUNKS: usize = 100;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid large-object pointer: {0}")]
    InvalidPointer(String),
}
