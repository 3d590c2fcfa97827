//! Chunk transfer worker.
//!
//! Materializes exactly one chunk's files from the source, checks large
//! objects against their manifest hash, and commits them to the destination
//! with bounded retries. A worker never returns an error: every outcome is a
//! [`TransferResult`].

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use hubferry_protocol::{Chunk, FileEntry, RepoRef, TransferResult, TransferStatus};
use hubferry_transfer::{RetryPolicy, checksum_bytes, hashes_match, join_repo_path};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::MigrateError;
use crate::fallback::{FallbackDownloader, FetchedFile};
use crate::storage::{StorageBackend, UploadFile};

pub struct TransferWorker {
    downloader: FallbackDownloader,
    dest: Arc<dyn StorageBackend>,
    retry: RetryPolicy,
    timeout: Duration,
    path_in_repo: String,
    existing: Arc<HashMap<String, String>>,
    cancel: CancellationToken,
}

impl TransferWorker {
    pub fn new(source: Arc<dyn StorageBackend>, dest: Arc<dyn StorageBackend>) -> Self {
        Self {
            downloader: FallbackDownloader::new(source),
            dest,
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(crate::config::DEFAULT_WORKER_TIMEOUT_SECS),
            path_in_repo: String::new(),
            existing: Arc::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Destination sub-path every file is written under.
    pub fn with_path_in_repo(mut self, path_in_repo: &str) -> Self {
        self.path_in_repo = path_in_repo.to_string();
        self
    }

    /// Hashes already stored on the destination, keyed by destination path.
    /// Files matching them are not sent again.
    pub fn with_existing(mut self, existing: Arc<HashMap<String, String>>) -> Self {
        self.existing = existing;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Transfers `chunk` from `source` to `dest`.
    pub async fn execute(&self, chunk: &Chunk, source: &RepoRef, dest: &RepoRef) -> TransferResult {
        let attempts = AtomicU32::new(0);
        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                warn!(chunk = chunk.index, "chunk cancelled");
                return TransferResult::failed(
                    chunk.index,
                    "cancelled".into(),
                    attempts.load(Ordering::Relaxed),
                );
            }
            r = tokio::time::timeout(self.timeout, self.run(chunk, source, dest, &attempts)) => r,
        };

        match outcome {
            Ok(result) => result,
            Err(_) => {
                let err = MigrateError::Timeout(self.timeout);
                error!(chunk = chunk.index, error = %err, "chunk timed out");
                TransferResult::failed(chunk.index, err.to_string(), attempts.load(Ordering::Relaxed).max(1))
            }
        }
    }

    async fn run(&self, chunk: &Chunk, source: &RepoRef, dest: &RepoRef, attempts: &AtomicU32) -> TransferResult {
        if chunk.is_empty() {
            debug!(chunk = chunk.index, "empty chunk");
            return TransferResult::success(chunk.index, 0, 0, 0);
        }

        let wanted: Vec<FileEntry> = chunk
            .files
            .iter()
            .filter(|e| !(e.is_large_object && self.is_present(&e.relative_path, e.content_hash.as_deref())))
            .cloned()
            .collect();

        let fetched = match self.downloader.fetch(source, &wanted).await {
            Ok(files) => files,
            Err(e) => {
                error!(chunk = chunk.index, error = %e, "chunk fetch failed");
                return TransferResult::failed(chunk.index, e.to_string(), 1);
            }
        };

        let (mut uploads, rejected) = check_integrity(fetched);
        uploads.retain(|f| {
            f.is_large_object || !self.is_present(&f.path, Some(checksum_bytes(&f.data).as_str()))
        });
        if uploads.is_empty() && rejected.is_empty() {
            debug!(chunk = chunk.index, files = chunk.files.len(), "chunk already present on destination");
            return TransferResult::success(chunk.index, 0, 0, 0);
        }
        if uploads.is_empty() {
            let msg = summarize(&rejected);
            error!(chunk = chunk.index, error = %msg, "every file in chunk failed integrity check");
            return TransferResult::failed(chunk.index, msg, 1);
        }
        let bytes: u64 = uploads.iter().map(|f| f.data.len() as u64).sum();
        let message = commit_message(source, chunk.index);

        let max = self.retry.attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            attempts.store(attempt, Ordering::Relaxed);
            match self
                .dest
                .write_files(dest, &self.path_in_repo, &uploads, &message)
                .await
            {
                Ok(commit) => {
                    info!(
                        chunk = chunk.index,
                        files = commit.files,
                        bytes,
                        attempt,
                        commit = %commit.commit_id,
                        "chunk committed"
                    );
                    break;
                }
                Err(e) if e.is_retryable() && attempt < max => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(chunk = chunk.index, attempt, error = %e, ?delay, "chunk write failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(chunk = chunk.index, attempt, error = %e, "chunk write failed");
                    return TransferResult::failed(chunk.index, e.to_string(), attempt);
                }
            }
        }

        let mut result = TransferResult::success(chunk.index, uploads.len(), bytes, attempt);
        if !rejected.is_empty() {
            result.status = TransferStatus::Partial;
            result.error = Some(summarize(&rejected));
        }
        result
    }

    /// The destination already stores `path` with this content hash.
    fn is_present(&self, path: &str, hash: Option<&str>) -> bool {
        let Some(hash) = hash else {
            return false;
        };
        join_repo_path(&self.path_in_repo, path)
            .ok()
            .and_then(|p| self.existing.get(&p))
            .is_some_and(|stored| hashes_match(stored, hash))
    }
}

/// Splits fetched files into uploads and hash mismatches. Only large
/// objects with a known hash are checked.
fn check_integrity(fetched: Vec<FetchedFile>) -> (Vec<UploadFile>, Vec<MigrateError>) {
    let mut uploads = Vec::with_capacity(fetched.len());
    let mut rejected = Vec::new();
    for file in fetched {
        if file.entry.is_large_object
            && let Some(expected) = &file.entry.content_hash
        {
            let actual = checksum_bytes(&file.data);
            if !hashes_match(expected, &actual) {
                warn!(path = %file.entry.relative_path, expected = %expected, actual = %actual, "hash mismatch");
                rejected.push(MigrateError::HashMismatch {
                    path: file.entry.relative_path,
                    expected: expected.clone(),
                    actual,
                });
                continue;
            }
        }
        uploads.push(UploadFile {
            path: file.entry.relative_path,
            data: file.data,
            is_large_object: file.entry.is_large_object,
        });
    }
    (uploads, rejected)
}

fn summarize(errors: &[MigrateError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Commit message recorded on the destination.
pub fn commit_message(source: &RepoRef, chunk_index: usize) -> String {
    format!(
        "Migrated from {}: {} (chunk {chunk_index})",
        source.platform,
        source.repo_id()
    )
}
