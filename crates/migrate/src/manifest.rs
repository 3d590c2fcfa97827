//! Source repository enumeration.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::join_all;
use hubferry_protocol::{FileEntry, Manifest, RepoRef};
use hubferry_transfer::{PathFilter, validate_repo_path};
use tracing::{debug, info, warn};

use crate::error::MigrateError;
use crate::fallback::FallbackDownloader;
use crate::storage::{ListedFile, StorageBackend};

/// Concurrent pointer resolutions per manifest.
const POINTER_CONCURRENCY: usize = 16;

/// Builds a [`Manifest`] from a source repository without downloading
/// large payloads.
pub struct ManifestBuilder {
    backend: Arc<dyn StorageBackend>,
    downloader: FallbackDownloader,
    filter: PathFilter,
}

impl ManifestBuilder {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            downloader: FallbackDownloader::new(backend.clone()),
            backend,
            filter: PathFilter::default(),
        }
    }

    /// Restricts the manifest to paths accepted by `filter`.
    pub fn with_filter(mut self, filter: PathFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Enumerates `source`.
    ///
    /// Large-object pointers are resolved to size and hash. When some
    /// pointers cannot be resolved, the full manifest is still produced and
    /// returned inside [`MigrateError::PartialManifest`]; those entries carry
    /// no hash.
    pub async fn build(&self, source: &RepoRef) -> Result<Manifest, MigrateError> {
        if !self.backend.repo_exists(source).await? {
            return Err(MigrateError::NotFound(format!("source repository {source}")));
        }
        let visibility = self.backend.repo_visibility(source).await?;
        let listed = self.downloader.list(source).await?;
        let candidates = self.select(listed);

        let mut unresolved = Vec::new();
        let mut files = Vec::with_capacity(candidates.len());
        for batch in candidates.chunks(POINTER_CONCURRENCY) {
            let resolved = join_all(batch.iter().cloned().map(|l| self.resolve(source, l))).await;
            for result in resolved {
                let (entry, ok) = result?;
                if !ok {
                    unresolved.push(entry.relative_path.clone());
                }
                files.push(entry);
            }
        }

        let mut manifest = Manifest::new(source.clone().with_visibility(visibility), files);
        info!(
            repo = %source,
            files = manifest.total_files,
            large = manifest.large_objects().count(),
            bytes = manifest.total_bytes,
            "manifest built"
        );

        if unresolved.is_empty() {
            return Ok(manifest);
        }
        warn!(repo = %source, count = unresolved.len(), "unresolved large-object pointers");
        manifest.unresolved = unresolved.clone();
        Err(MigrateError::PartialManifest {
            manifest: Box::new(manifest),
            unresolved,
        })
    }

    /// Drops duplicates, unsafe paths and filtered paths, keeping listing order.
    fn select(&self, listed: Vec<ListedFile>) -> Vec<ListedFile> {
        let mut seen = HashSet::new();
        let mut kept = Vec::with_capacity(listed.len());
        for file in listed {
            if let Err(e) = validate_repo_path(&file.path) {
                warn!(path = %file.path, error = %e, "skipping unsafe path");
                continue;
            }
            if !seen.insert(file.path.clone()) {
                debug!(path = %file.path, "duplicate listing entry");
                continue;
            }
            if !self.filter.is_included(&file.path) {
                debug!(path = %file.path, "filtered out");
                continue;
            }
            kept.push(file);
        }
        kept
    }

    /// Returns the entry and whether it is fully resolved. Access and
    /// not-found errors abort the build; other pointer failures only mark
    /// the entry unresolved.
    async fn resolve(&self, source: &RepoRef, listed: ListedFile) -> Result<(FileEntry, bool), MigrateError> {
        if !listed.is_pointer {
            return Ok((
                FileEntry::ordinary(&listed.path, listed.size.unwrap_or(0)),
                true,
            ));
        }
        match self.backend.resolve_large_object_pointer(source, &listed.path).await {
            Ok(pointer) => Ok((FileEntry::large(&listed.path, pointer.size, &pointer.oid), true)),
            Err(e @ (MigrateError::AccessDenied(_) | MigrateError::NotFound(_))) => Err(e),
            Err(e) => {
                warn!(path = %listed.path, error = %e, "pointer unresolved");
                Ok((
                    FileEntry {
                        relative_path: listed.path,
                        size_bytes: listed.size.unwrap_or(0),
                        content_hash: None,
                        is_large_object: true,
                    },
                    false,
                ))
            }
        }
    }
}
