//! Migration job record and the reports derived from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::manifest::{
    Chunk, Manifest, TransferResult, TransferStatus, VerificationRecord, VerificationSummary,
};
use crate::types::RepoRef;

/// How a job dispatches its transfer work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobMode {
    /// One worker over the whole manifest.
    Single,
    /// Planned chunks dispatched to concurrent workers.
    Parallel,
    /// One repository of a batch; transfers like `Parallel`.
    BatchMember,
}

/// Lifecycle state of a migration job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Preflight,
    Transferring,
    Verifying,
    Completed,
    PartiallyCompleted,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::PartiallyCompleted | Self::Failed
        )
    }
}

/// A single repository migration, owned by the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationJob {
    pub id: Uuid,
    pub source: RepoRef,
    pub dest: RepoRef,
    pub mode: JobMode,
    pub state: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<Manifest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunks: Option<Vec<Chunk>>,
    #[serde(default)]
    pub results: Vec<TransferResult>,
    #[serde(default)]
    pub verification: Vec<VerificationRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl MigrationJob {
    pub fn new(source: RepoRef, dest: RepoRef, mode: JobMode) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            dest,
            mode,
            state: JobState::Pending,
            manifest: None,
            chunks: None,
            results: Vec::new(),
            verification: Vec::new(),
            error: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Marks the job failed with a terminal error.
    pub fn fail(&mut self, error: String) {
        self.state = JobState::Failed;
        self.error = Some(error);
        self.finished_at = Some(Utc::now());
    }

    /// Terminal state implied by the collected transfer results.
    ///
    /// Completed when every unit succeeded, Failed when none did, and
    /// PartiallyCompleted otherwise.
    pub fn outcome_from_results(&self) -> JobState {
        if self.results.is_empty() {
            return JobState::Completed;
        }
        let succeeded = self
            .results
            .iter()
            .filter(|r| r.status == TransferStatus::Success)
            .count();
        let failed = self
            .results
            .iter()
            .filter(|r| r.status == TransferStatus::Failed)
            .count();

        if succeeded == self.results.len() {
            JobState::Completed
        } else if failed == self.results.len() {
            JobState::Failed
        } else {
            JobState::PartiallyCompleted
        }
    }

    /// Machine-readable counts for the caller.
    pub fn report(&self) -> JobReport {
        let mut report = JobReport {
            state: self.state,
            ..JobReport::default()
        };
        for result in &self.results {
            report.files_transferred += result.files_transferred;
            report.bytes_transferred += result.bytes_transferred;
            match result.status {
                TransferStatus::Success => report.chunks_succeeded += 1,
                TransferStatus::Failed => report.chunks_failed += 1,
                TransferStatus::Partial => report.chunks_partial += 1,
            }
        }
        if let Some(manifest) = &self.manifest {
            report.total_files = manifest.total_files;
            report.total_bytes = manifest.total_bytes;
        }
        report.verification = VerificationSummary::from_records(&self.verification);
        report.verified = self.state == JobState::Completed
            && self.error.is_none()
            && report.verification.is_verified();
        report
    }
}

/// Counts sufficient to decide whether a source repository can be removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReport {
    pub state: JobState,
    pub total_files: usize,
    pub total_bytes: u64,
    pub files_transferred: usize,
    pub bytes_transferred: u64,
    pub chunks_succeeded: usize,
    pub chunks_failed: usize,
    pub chunks_partial: usize,
    pub verification: VerificationSummary,
    pub verified: bool,
}

impl Default for JobReport {
    fn default() -> Self {
        Self {
            state: JobState::Pending,
            total_files: 0,
            total_bytes: 0,
            files_transferred: 0,
            bytes_transferred: 0,
            chunks_succeeded: 0,
            chunks_failed: 0,
            chunks_partial: 0,
            verification: VerificationSummary::default(),
            verified: false,
        }
    }
}

impl JobReport {
    /// Completed, every chunk succeeded and every verifiable file matched.
    pub fn safe_to_delete_source(&self) -> bool {
        self.state == JobState::Completed
            && self.chunks_failed == 0
            && self.chunks_partial == 0
            && self.verified
    }
}

/// Outcome of a multi-repository batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub jobs: Vec<MigrationJob>,
    /// Destinations that already existed and were not attempted.
    pub skipped: Vec<RepoRef>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| j.state == JobState::Completed)
            .count()
    }

    /// Jobs that did not complete fully (failed or partially completed).
    pub fn failed(&self) -> usize {
        self.jobs.len() - self.succeeded()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{FileEntry, VerifyStatus};
    use crate::types::{Platform, RepoKind};

    fn job() -> MigrationJob {
        let src = RepoRef::new(Platform::HuggingFace, "org", "m", RepoKind::Model);
        let dst = src.on_platform(Platform::ModelScope);
        MigrationJob::new(src, dst, JobMode::Parallel)
    }

    #[test]
    fn new_job_is_pending() {
        let j = job();
        assert_eq!(j.state, JobState::Pending);
        assert!(!j.state.is_terminal());
        assert!(j.results.is_empty());
    }

    #[test]
    fn outcome_all_success() {
        let mut j = job();
        j.results.push(TransferResult::success(0, 1, 10, 1));
        j.results.push(TransferResult::success(1, 1, 10, 1));
        assert_eq!(j.outcome_from_results(), JobState::Completed);
    }

    #[test]
    fn outcome_mixed_is_partial() {
        let mut j = job();
        j.results.push(TransferResult::success(0, 1, 10, 1));
        j.results.push(TransferResult::failed(1, "boom".into(), 3));
        assert_eq!(j.outcome_from_results(), JobState::PartiallyCompleted);
    }

    #[test]
    fn outcome_all_failed() {
        let mut j = job();
        j.results.push(TransferResult::failed(0, "boom".into(), 3));
        assert_eq!(j.outcome_from_results(), JobState::Failed);
    }

    #[test]
    fn report_counts_and_safety() {
        let mut j = job();
        j.manifest = Some(Manifest::new(
            j.source.clone(),
            vec![FileEntry::large("w.bin", 10, "h")],
        ));
        j.results.push(TransferResult::success(0, 0, 0, 0));
        j.results.push(TransferResult::success(1, 1, 10, 1));
        j.verification.push(VerificationRecord {
            relative_path: "w.bin".into(),
            source_hash: Some("h".into()),
            dest_hash: Some("h".into()),
            status: VerifyStatus::Match,
        });
        j.state = JobState::Completed;

        let report = j.report();
        assert_eq!(report.files_transferred, 1);
        assert_eq!(report.bytes_transferred, 10);
        assert_eq!(report.chunks_succeeded, 2);
        assert_eq!(report.verification.matched, 1);
        assert!(report.verified);
        assert!(report.safe_to_delete_source());
    }

    #[test]
    fn failed_job_is_not_safe_to_delete() {
        let mut j = job();
        j.fail("destination namespace missing".into());
        let report = j.report();
        assert_eq!(report.state, JobState::Failed);
        assert!(!report.safe_to_delete_source());
        assert!(j.finished_at.is_some());
    }

    #[test]
    fn job_state_serialization() {
        assert_eq!(
            serde_json::to_string(&JobState::PartiallyCompleted).unwrap(),
            "\"partially_completed\""
        );
    }
}
