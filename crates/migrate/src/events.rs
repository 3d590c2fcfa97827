//! Progress events emitted by the coordinator.

use hubferry_protocol::{JobReport, JobState, RepoRef, TransferResult};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum MigrationEvent {
    /// A job moved to a new lifecycle state.
    StateChanged { job_id: Uuid, state: JobState },
    /// The manifest was planned into chunks.
    Planned {
        job_id: Uuid,
        chunks: usize,
        total_bytes: u64,
    },
    /// One chunk worker returned.
    ChunkFinished {
        job_id: Uuid,
        result: TransferResult,
        completed: usize,
        total: usize,
    },
    /// A batch member was not attempted.
    Skipped { dest: RepoRef, reason: String },
    /// A job reached a terminal state.
    Finished { job_id: Uuid, report: JobReport },
}
