//! Shared data model for hubferry repository migrations.
//!
//! These shapes are internal contracts between the planner, the workers and
//! the coordinator. Platform-specific response formats are converted into
//! them by storage adapters, so nothing downstream branches on platform.

pub mod job;
pub mod manifest;
pub mod repo_id;
pub mod types;

pub use job::{BatchReport, JobMode, JobReport, JobState, MigrationJob};
pub use manifest::{
    Chunk, FileEntry, Manifest, TransferResult, TransferStatus, VerificationRecord,
    VerificationSummary, VerifyStatus,
};
pub use repo_id::{
    RepoIdError, detect_direction, normalize_ms_domain, parse_platform, parse_repo_id,
    split_repo_id,
};
pub use types::{DEFAULT_MS_DOMAIN, Platform, RepoKind, RepoRef, Visibility};
