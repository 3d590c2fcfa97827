//! Storage capability surface consumed by the engine.
//!
//! Platform adapters (HTTP clients, SDK bridges) implement
//! [`StorageBackend`] and convert their response shapes into the types
//! below, so the engine never branches on platform.

use std::future::Future;
use std::pin::Pin;

use hubferry_protocol::{Platform, RepoRef, Visibility};
use hubferry_transfer::LargeObjectPointer;

use crate::error::MigrateError;

/// Boxed future returned by every backend call.
pub type StorageFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, MigrateError>> + Send + 'a>>;

/// Route used to enumerate or read content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPath {
    /// Fast API-based route.
    Structured,
    /// Slower clone-and-selective-pull route that tolerates storage locks.
    Permissive,
}

/// One entry of a structural listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedFile {
    pub path: String,
    /// Size when the listing carries it.
    pub size: Option<u64>,
    /// The tree holds a large-object pointer for this path.
    pub is_pointer: bool,
}

/// A file to commit to a destination repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    /// Path relative to the write prefix.
    pub path: String,
    pub data: Vec<u8>,
    pub is_large_object: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub commit_id: String,
    pub files: usize,
}

/// One page of stored content hashes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashPage {
    /// `(path, sha256 hex)` pairs.
    pub entries: Vec<(String, String)>,
    /// Cursor for the next page, `None` on the last page.
    pub next_cursor: Option<String>,
}

/// Abstract connection to one storage platform.
///
/// Using a trait keeps the engine decoupled from transport and testable with
/// in-memory stores.
pub trait StorageBackend: Send + Sync {
    fn platform(&self) -> Platform;

    /// Whether the user or organization namespace exists.
    fn namespace_exists<'a>(&'a self, namespace: &'a str) -> StorageFuture<'a, bool>;

    fn repo_exists<'a>(&'a self, repo: &'a RepoRef) -> StorageFuture<'a, bool>;

    fn repo_visibility<'a>(&'a self, repo: &'a RepoRef) -> StorageFuture<'a, Visibility>;

    fn create_repo<'a>(&'a self, repo: &'a RepoRef, visibility: Visibility)
    -> StorageFuture<'a, ()>;

    /// Enumerates the structural tree without large payloads.
    fn list_files<'a>(&'a self, repo: &'a RepoRef, via: FetchPath)
    -> StorageFuture<'a, Vec<ListedFile>>;

    /// Recovers size and hash of a large object from its pointer.
    fn resolve_large_object_pointer<'a>(
        &'a self,
        repo: &'a RepoRef,
        path: &'a str,
    ) -> StorageFuture<'a, LargeObjectPointer>;

    /// Reads the full content of one file.
    fn read_file<'a>(
        &'a self,
        repo: &'a RepoRef,
        path: &'a str,
        via: FetchPath,
    ) -> StorageFuture<'a, Vec<u8>>;

    /// Commits `files` under `path_prefix`, overwriting existing paths.
    fn write_files<'a>(
        &'a self,
        repo: &'a RepoRef,
        path_prefix: &'a str,
        files: &'a [UploadFile],
        message: &'a str,
    ) -> StorageFuture<'a, CommitInfo>;

    /// Pages through stored content hashes of the repository.
    fn list_stored_hashes<'a>(
        &'a self,
        repo: &'a RepoRef,
        cursor: Option<String>,
    ) -> StorageFuture<'a, HashPage>;

    /// Stored hash of one path, walking pages until found.
    fn get_stored_hash<'a>(&'a self, repo: &'a RepoRef, path: &'a str) -> StorageFuture<'a, Option<String>> {
        Box::pin(async move {
            let mut cursor = None;
            loop {
                let page = self.list_stored_hashes(repo, cursor).await?;
                if let Some((_, hash)) = page.entries.into_iter().find(|(p, _)| p == path) {
                    return Ok(Some(hash));
                }
                match page.next_cursor {
                    Some(next) => cursor = Some(next),
                    None => return Ok(None),
                }
            }
        })
    }
}
