//! Post-transfer integrity check.

use std::collections::HashMap;
use std::sync::Arc;

use hubferry_protocol::{FileEntry, Manifest, RepoRef, VerificationRecord, VerifyStatus};
use hubferry_transfer::{hashes_match, join_repo_path, wildcard_match};
use tracing::{debug, info, warn};

use crate::error::MigrateError;
use crate::storage::StorageBackend;

/// Compares source manifest hashes with the hashes the destination stores.
pub struct Verifier {
    dest: Arc<dyn StorageBackend>,
    skip: Vec<String>,
    path_in_repo: String,
}

impl Verifier {
    pub fn new(dest: Arc<dyn StorageBackend>) -> Self {
        Self {
            dest,
            skip: crate::config::DEFAULT_VERIFY_SKIP
                .iter()
                .map(|s| s.to_string())
                .collect(),
            path_in_repo: String::new(),
        }
    }

    /// Replaces the skip list (paths or wildcards, matched on the
    /// repository-relative path).
    pub fn with_skip(mut self, skip: Vec<String>) -> Self {
        self.skip = skip;
        self
    }

    pub fn with_path_in_repo(mut self, path_in_repo: &str) -> Self {
        self.path_in_repo = path_in_repo.to_string();
        self
    }

    /// One record per manifest entry.
    ///
    /// Large objects with a known source hash are compared; everything else
    /// is unverifiable. A verifiable file absent from the destination is a
    /// mismatch.
    pub async fn verify(&self, manifest: &Manifest, dest: &RepoRef) -> Result<Vec<VerificationRecord>, MigrateError> {
        let stored = stored_hash_map(self.dest.as_ref(), dest).await?;
        let mut records = Vec::with_capacity(manifest.files.len());

        for entry in &manifest.files {
            let dest_path = join_repo_path(&self.path_in_repo, &entry.relative_path)?;
            let dest_hash = stored.get(&dest_path).cloned();
            let status = self.classify(entry, dest_hash.as_deref());
            if status == VerifyStatus::Mismatch {
                warn!(path = %entry.relative_path, dest = %dest, "verification mismatch");
            }
            records.push(VerificationRecord {
                relative_path: entry.relative_path.clone(),
                source_hash: entry.content_hash.clone(),
                dest_hash,
                status,
            });
        }

        let matched = records.iter().filter(|r| r.status == VerifyStatus::Match).count();
        info!(repo = %dest, matched, total = records.len(), "verification finished");
        Ok(records)
    }

    fn classify(&self, entry: &FileEntry, dest_hash: Option<&str>) -> VerifyStatus {
        if self.is_skipped(&entry.relative_path) || !entry.is_large_object {
            return VerifyStatus::Unverifiable;
        }
        let Some(source_hash) = entry.content_hash.as_deref() else {
            return VerifyStatus::Unverifiable;
        };
        match dest_hash {
            Some(h) if hashes_match(source_hash, h) => VerifyStatus::Match,
            _ => VerifyStatus::Mismatch,
        }
    }

    fn is_skipped(&self, path: &str) -> bool {
        self.skip.iter().any(|p| wildcard_match(p, path))
    }
}

/// Every stored hash of `repo`, keyed by destination path. Walks all pages.
pub async fn stored_hash_map(
    backend: &dyn StorageBackend,
    repo: &RepoRef,
) -> Result<HashMap<String, String>, MigrateError> {
    let mut hashes = HashMap::new();
    let mut cursor = None;
    let mut pages = 0usize;
    loop {
        let page = backend.list_stored_hashes(repo, cursor).await?;
        pages += 1;
        hashes.extend(page.entries);
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    debug!(repo = %repo, pages, files = hashes.len(), "stored hashes listed");
    Ok(hashes)
}
