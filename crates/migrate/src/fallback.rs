//! Structured-first access with a permissive fallback.
//!
//! Every listing or fetch starts on [`FetchPath::Structured`]. A storage
//! lock switches to [`FetchPath::Permissive`]; once switched, a fetch stays
//! on the permissive path for its remaining files. Any other error (missing
//! repo, denied access, network) is returned as is.

use std::sync::Arc;

use hubferry_protocol::{FileEntry, RepoRef};
use tracing::{debug, warn};

use crate::error::MigrateError;
use crate::storage::{FetchPath, ListedFile, StorageBackend};

/// Content of one manifest entry, read from the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    pub entry: FileEntry,
    pub data: Vec<u8>,
}

pub struct FallbackDownloader {
    backend: Arc<dyn StorageBackend>,
}

impl FallbackDownloader {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Enumerates the repository tree.
    pub async fn list(&self, repo: &RepoRef) -> Result<Vec<ListedFile>, MigrateError> {
        match self.backend.list_files(repo, FetchPath::Structured).await {
            Err(e) if e.is_storage_lock() => {
                warn!(repo = %repo, error = %e, "structured listing locked, using permissive path");
                self.backend.list_files(repo, FetchPath::Permissive).await
            }
            other => other,
        }
    }

    /// Reads exactly the given entries, in order.
    pub async fn fetch(
        &self,
        repo: &RepoRef,
        entries: &[FileEntry],
    ) -> Result<Vec<FetchedFile>, MigrateError> {
        let mut via = FetchPath::Structured;
        let mut fetched = Vec::with_capacity(entries.len());

        for entry in entries {
            let path = entry.relative_path.as_str();
            let data = match self.backend.read_file(repo, path, via).await {
                Err(e) if e.is_storage_lock() && via == FetchPath::Structured => {
                    warn!(repo = %repo, path, error = %e, "structured fetch locked, using permissive path");
                    via = FetchPath::Permissive;
                    self.backend.read_file(repo, path, via).await?
                }
                other => other?,
            };
            debug!(repo = %repo, path, bytes = data.len(), "fetched");
            fetched.push(FetchedFile {
                entry: entry.clone(),
                data,
            });
        }

        Ok(fetched)
    }
}
