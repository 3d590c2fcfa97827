//! File manifest, chunk and per-unit result shapes.

use serde::{Deserialize, Serialize};

use crate::types::{RepoRef, Visibility};

/// One file of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// Path relative to the repository root, `/`-separated.
    pub relative_path: String,
    pub size_bytes: u64,
    /// SHA-256 hex digest, present only when recoverable without a download.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    pub is_large_object: bool,
}

impl FileEntry {
    /// An inline (non large-object) file.
    pub fn ordinary(relative_path: &str, size_bytes: u64) -> Self {
        Self {
            relative_path: relative_path.to_string(),
            size_bytes,
            content_hash: None,
            is_large_object: false,
        }
    }

    /// A large object whose pointer resolved to a size and hash.
    pub fn large(relative_path: &str, size_bytes: u64, content_hash: &str) -> Self {
        Self {
            relative_path: relative_path.to_string(),
            size_bytes,
            content_hash: Some(content_hash.to_string()),
            is_large_object: true,
        }
    }
}

/// Read-only description of a repository's files for one migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub repo: RepoRef,
    pub files: Vec<FileEntry>,
    pub total_bytes: u64,
    pub total_files: usize,
    pub visibility: Visibility,
    /// Paths whose large-object pointer could not be resolved.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unresolved: Vec<String>,
}

impl Manifest {
    /// Builds a manifest, computing the totals from `files`.
    pub fn new(repo: RepoRef, files: Vec<FileEntry>) -> Self {
        let total_bytes = files.iter().map(|f| f.size_bytes).sum();
        let total_files = files.len();
        let visibility = repo.visibility;
        Self {
            repo,
            files,
            total_bytes,
            total_files,
            visibility,
            unresolved: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn large_objects(&self) -> impl Iterator<Item = &FileEntry> {
        self.files.iter().filter(|f| f.is_large_object)
    }

    pub fn ordinary_files(&self) -> impl Iterator<Item = &FileEntry> {
        self.files.iter().filter(|f| !f.is_large_object)
    }

    pub fn get(&self, relative_path: &str) -> Option<&FileEntry> {
        self.files.iter().find(|f| f.relative_path == relative_path)
    }
}

/// A disjoint subset of a manifest assigned to one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub index: usize,
    pub files: Vec<FileEntry>,
    pub total_bytes: u64,
}

impl Chunk {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            files: Vec::new(),
            total_bytes: 0,
        }
    }

    /// Chunk covering the whole manifest, used by single-job mode.
    pub fn whole(manifest: &Manifest) -> Self {
        Self {
            index: 0,
            files: manifest.files.clone(),
            total_bytes: manifest.total_bytes,
        }
    }

    pub fn push(&mut self, entry: FileEntry) {
        self.total_bytes += entry.size_bytes;
        self.files.push(entry);
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Outcome of one transfer unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Success,
    Failed,
    Partial,
}

/// Result reported by one transfer worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResult {
    pub chunk_index: usize,
    pub status: TransferStatus,
    pub files_transferred: usize,
    pub bytes_transferred: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempt_count: u32,
}

impl TransferResult {
    pub fn success(chunk_index: usize, files: usize, bytes: u64, attempts: u32) -> Self {
        Self {
            chunk_index,
            status: TransferStatus::Success,
            files_transferred: files,
            bytes_transferred: bytes,
            error: None,
            attempt_count: attempts,
        }
    }

    pub fn failed(chunk_index: usize, error: String, attempts: u32) -> Self {
        Self {
            chunk_index,
            status: TransferStatus::Failed,
            files_transferred: 0,
            bytes_transferred: 0,
            error: Some(error),
            attempt_count: attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TransferStatus::Success
    }
}

/// Per-file hash comparison outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyStatus {
    Match,
    Mismatch,
    Unverifiable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRecord {
    pub relative_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_hash: Option<String>,
    pub status: VerifyStatus,
}

/// Aggregated counts over a set of verification records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationSummary {
    pub matched: usize,
    pub mismatched: usize,
    pub unverifiable: usize,
}

impl VerificationSummary {
    pub fn from_records(records: &[VerificationRecord]) -> Self {
        let mut summary = Self::default();
        for record in records {
            match record.status {
                VerifyStatus::Match => summary.matched += 1,
                VerifyStatus::Mismatch => summary.mismatched += 1,
                VerifyStatus::Unverifiable => summary.unverifiable += 1,
            }
        }
        summary
    }

    /// True iff every verifiable record matched.
    pub fn is_verified(&self) -> bool {
        self.mismatched == 0
    }
}
