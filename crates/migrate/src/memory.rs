//! In-memory [`StorageBackend`] with fault injection.
//!
//! Holds repositories as path -> bytes maps. Faults (storage locks, denied
//! access, failing writes, broken pointers, corrupted reads, slow reads) are
//! switched on per store so engine behavior can be exercised end to end
//! without a network.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use hubferry_protocol::{Platform, RepoKind, RepoRef, Visibility};
use hubferry_transfer::{LargeObjectPointer, checksum_bytes, join_repo_path};

use crate::error::MigrateError;
use crate::storage::{
    CommitInfo, FetchPath, HashPage, ListedFile, StorageBackend, StorageFuture, UploadFile,
};

const DEFAULT_HASH_PAGE_SIZE: usize = 1000;

type RepoKey = (String, String, RepoKind);

fn key(repo: &RepoRef) -> RepoKey {
    (repo.namespace.clone(), repo.name.clone(), repo.kind)
}

/// Error injected into destination writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteFault {
    Transient,
    Denied,
}

impl WriteFault {
    fn to_error(self, path: &str) -> MigrateError {
        match self {
            Self::Transient => MigrateError::TransientNetwork(format!("connection reset writing {path}")),
            Self::Denied => MigrateError::AccessDenied(format!("write rejected for {path}")),
        }
    }
}

/// Call counters, for assertions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub structured_calls: usize,
    pub permissive_calls: usize,
    pub write_calls: usize,
    pub files_written: usize,
    pub bytes_written: u64,
    pub hash_pages_served: usize,
    /// Every path passed to `read_file`, in call order.
    pub read_paths: Vec<String>,
    /// Most `read_file` calls ever in progress at the same time.
    pub peak_concurrent_reads: usize,
}

#[derive(Debug, Clone)]
struct StoredFile {
    data: Vec<u8>,
    sha256: String,
    large: bool,
}

impl StoredFile {
    fn new(data: Vec<u8>, large: bool) -> Self {
        let sha256 = checksum_bytes(&data);
        Self { data, sha256, large }
    }
}

#[derive(Debug, Default)]
struct MemoryRepo {
    visibility: Visibility,
    files: BTreeMap<String, StoredFile>,
    commits: usize,
}

#[derive(Debug, Default)]
struct Faults {
    structured_locked: bool,
    denied: HashSet<String>,
    write_failures: HashMap<String, (u32, WriteFault)>,
    broken_pointers: HashSet<String>,
    corrupt_reads: HashSet<String>,
    extra_listing: Vec<ListedFile>,
    read_delay: Option<Duration>,
    panic_reads: HashSet<String>,
}

#[derive(Debug)]
struct StoreState {
    namespaces: HashSet<String>,
    repos: HashMap<RepoKey, MemoryRepo>,
    faults: Faults,
    stats: StoreStats,
    page_size: usize,
    reads_in_flight: usize,
}

/// A storage platform held entirely in memory.
#[derive(Debug)]
pub struct MemoryStore {
    platform: Platform,
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            state: Mutex::new(StoreState {
                namespaces: HashSet::new(),
                repos: HashMap::new(),
                faults: Faults::default(),
                stats: StoreStats::default(),
                page_size: DEFAULT_HASH_PAGE_SIZE,
                reads_in_flight: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_namespace(&self, namespace: &str) {
        self.lock().namespaces.insert(namespace.to_string());
    }

    /// Creates an empty repository (and its namespace).
    pub fn add_repo(&self, repo: &RepoRef) {
        let mut state = self.lock();
        state.namespaces.insert(repo.namespace.clone());
        state.repos.entry(key(repo)).or_insert_with(|| MemoryRepo {
            visibility: repo.visibility,
            ..MemoryRepo::default()
        });
    }

    /// Stores an inline file, creating the repository if needed.
    pub fn put_file(&self, repo: &RepoRef, path: &str, data: impl Into<Vec<u8>>) {
        self.put(repo, path, data.into(), false);
    }

    /// Stores a large object; listings expose it as a pointer.
    pub fn put_large_file(&self, repo: &RepoRef, path: &str, data: impl Into<Vec<u8>>) {
        self.put(repo, path, data.into(), true);
    }

    fn put(&self, repo: &RepoRef, path: &str, data: Vec<u8>, large: bool) {
        self.add_repo(repo);
        let mut state = self.lock();
        if let Some(r) = state.repos.get_mut(&key(repo)) {
            r.files.insert(path.to_string(), StoredFile::new(data, large));
        }
    }

    /// Content of a stored file.
    pub fn file(&self, repo: &RepoRef, path: &str) -> Option<Vec<u8>> {
        self.lock()
            .repos
            .get(&key(repo))
            .and_then(|r| r.files.get(path))
            .map(|f| f.data.clone())
    }

    pub fn paths(&self, repo: &RepoRef) -> Vec<String> {
        self.lock()
            .repos
            .get(&key(repo))
            .map(|r| r.files.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn commit_count(&self, repo: &RepoRef) -> usize {
        self.lock().repos.get(&key(repo)).map_or(0, |r| r.commits)
    }

    pub fn visibility_of(&self, repo: &RepoRef) -> Option<Visibility> {
        self.lock().repos.get(&key(repo)).map(|r| r.visibility)
    }

    pub fn stats(&self) -> StoreStats {
        self.lock().stats.clone()
    }

    /// Structured listing and reads fail with a storage lock.
    pub fn lock_structured(&self, locked: bool) {
        self.lock().faults.structured_locked = locked;
    }

    /// Every call touching `repo` fails with an access error.
    pub fn deny_access(&self, repo: &RepoRef) {
        self.lock().faults.denied.insert(repo.repo_id());
    }

    /// The next `times` writes containing `path` fail. `u32::MAX` fails forever.
    pub fn fail_writes(&self, path: &str, times: u32, fault: WriteFault) {
        self.lock()
            .faults
            .write_failures
            .insert(path.to_string(), (times, fault));
    }

    /// Pointer resolution for `path` returns malformed pointer text.
    pub fn break_pointer(&self, path: &str) {
        self.lock().faults.broken_pointers.insert(path.to_string());
    }

    /// Reads of `path` return altered bytes.
    pub fn corrupt_reads(&self, path: &str) {
        self.lock().faults.corrupt_reads.insert(path.to_string());
    }

    /// Appends a raw entry to every listing, as a misbehaving API might.
    pub fn inject_listing(&self, entry: ListedFile) {
        self.lock().faults.extra_listing.push(entry);
    }

    /// Each `read_file` call sleeps before answering.
    pub fn set_read_delay(&self, delay: Duration) {
        self.lock().faults.read_delay = Some(delay);
    }

    /// Reading `path` panics, as a crashing client library would.
    pub fn panic_on_read(&self, path: &str) {
        self.lock().faults.panic_reads.insert(path.to_string());
    }

    pub fn set_hash_page_size(&self, size: usize) {
        self.lock().page_size = size.max(1);
    }

    /// Overwrites the stored hash of `path` without touching content.
    pub fn tamper_stored_hash(&self, repo: &RepoRef, path: &str, sha256: &str) {
        let mut state = self.lock();
        if let Some(f) = state
            .repos
            .get_mut(&key(repo))
            .and_then(|r| r.files.get_mut(path))
        {
            f.sha256 = sha256.to_string();
        }
    }
}

impl StoreState {
    fn check_access(&self, repo: &RepoRef) -> Result<(), MigrateError> {
        if self.faults.denied.contains(&repo.repo_id()) {
            return Err(MigrateError::AccessDenied(format!("no access to {repo}")));
        }
        Ok(())
    }

    fn count(&mut self, via: FetchPath) -> Result<(), MigrateError> {
        match via {
            FetchPath::Structured => {
                self.stats.structured_calls += 1;
                if self.faults.structured_locked {
                    return Err(MigrateError::StorageLocked(
                        "repository storage quota exceeded".into(),
                    ));
                }
            }
            FetchPath::Permissive => self.stats.permissive_calls += 1,
        }
        Ok(())
    }

    fn repo(&self, repo: &RepoRef) -> Result<&MemoryRepo, MigrateError> {
        self.check_access(repo)?;
        self.repos
            .get(&key(repo))
            .ok_or_else(|| MigrateError::NotFound(format!("repository {repo}")))
    }
}

impl StorageBackend for MemoryStore {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn namespace_exists<'a>(&'a self, namespace: &'a str) -> StorageFuture<'a, bool> {
        Box::pin(async move { Ok(self.lock().namespaces.contains(namespace)) })
    }

    fn repo_exists<'a>(&'a self, repo: &'a RepoRef) -> StorageFuture<'a, bool> {
        Box::pin(async move {
            let state = self.lock();
            state.check_access(repo)?;
            Ok(state.repos.contains_key(&key(repo)))
        })
    }

    fn repo_visibility<'a>(&'a self, repo: &'a RepoRef) -> StorageFuture<'a, Visibility> {
        Box::pin(async move { Ok(self.lock().repo(repo)?.visibility) })
    }

    fn create_repo<'a>(&'a self, repo: &'a RepoRef, visibility: Visibility) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.lock();
            state.check_access(repo)?;
            if !state.namespaces.contains(&repo.namespace) {
                return Err(MigrateError::NotFound(format!("namespace {}", repo.namespace)));
            }
            state.repos.entry(key(repo)).or_insert_with(|| MemoryRepo {
                visibility,
                ..MemoryRepo::default()
            });
            Ok(())
        })
    }

    fn list_files<'a>(&'a self, repo: &'a RepoRef, via: FetchPath) -> StorageFuture<'a, Vec<ListedFile>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.check_access(repo)?;
            state.count(via)?;
            let mut listed: Vec<ListedFile> = state
                .repo(repo)?
                .files
                .iter()
                .map(|(path, f)| ListedFile {
                    path: path.clone(),
                    size: (!f.large).then_some(f.data.len() as u64),
                    is_pointer: f.large,
                })
                .collect();
            listed.extend(state.faults.extra_listing.iter().cloned());
            Ok(listed)
        })
    }

    fn resolve_large_object_pointer<'a>(
        &'a self,
        repo: &'a RepoRef,
        path: &'a str,
    ) -> StorageFuture<'a, LargeObjectPointer> {
        Box::pin(async move {
            let state = self.lock();
            let file = state
                .repo(repo)?
                .files
                .get(path)
                .ok_or_else(|| MigrateError::NotFound(format!("{path} in {repo}")))?;
            if !file.large {
                return Err(MigrateError::Backend(format!("{path} is not a large object")));
            }
            let text = if state.faults.broken_pointers.contains(path) {
                "version https://git-lfs.github.com/spec/v1\noid sha256:\n".to_string()
            } else {
                LargeObjectPointer::new(&file.sha256, file.data.len() as u64).to_pointer_text()
            };
            Ok(LargeObjectPointer::parse(&text)?)
        })
    }

    fn read_file<'a>(
        &'a self,
        repo: &'a RepoRef,
        path: &'a str,
        via: FetchPath,
    ) -> StorageFuture<'a, Vec<u8>> {
        Box::pin(async move {
            let delay = {
                let mut state = self.lock();
                state.reads_in_flight += 1;
                state.stats.peak_concurrent_reads =
                    state.stats.peak_concurrent_reads.max(state.reads_in_flight);
                state.faults.read_delay
            };
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let mut guard = self.lock();
            let state = &mut *guard;
            state.reads_in_flight = state.reads_in_flight.saturating_sub(1);
            if state.faults.panic_reads.contains(path) {
                drop(guard);
                panic!("read of {path} crashed");
            }
            state.check_access(repo)?;
            state.count(via)?;
            state.stats.read_paths.push(path.to_string());
            let mut data = state
                .repo(repo)?
                .files
                .get(path)
                .map(|f| f.data.clone())
                .ok_or_else(|| MigrateError::NotFound(format!("{path} in {repo}")))?;
            if state.faults.corrupt_reads.contains(path) {
                data.push(0xff);
            }
            Ok(data)
        })
    }

    fn write_files<'a>(
        &'a self,
        repo: &'a RepoRef,
        path_prefix: &'a str,
        files: &'a [UploadFile],
        _message: &'a str,
    ) -> StorageFuture<'a, CommitInfo> {
        Box::pin(async move {
            let mut guard = self.lock();
            let state = &mut *guard;
            state.stats.write_calls += 1;
            state.check_access(repo)?;

            for file in files {
                if let Some((remaining, fault)) = state.faults.write_failures.get_mut(&file.path)
                    && *remaining > 0
                {
                    if *remaining != u32::MAX {
                        *remaining -= 1;
                    }
                    return Err(fault.to_error(&file.path));
                }
            }

            let mut targets = Vec::with_capacity(files.len());
            for file in files {
                targets.push((join_repo_path(path_prefix, &file.path)?, file));
            }

            let stored = state
                .repos
                .get_mut(&key(repo))
                .ok_or_else(|| MigrateError::NotFound(format!("repository {repo}")))?;
            for (path, file) in targets {
                state.stats.bytes_written += file.data.len() as u64;
                stored
                    .files
                    .insert(path, StoredFile::new(file.data.clone(), file.is_large_object));
            }
            stored.commits += 1;
            state.stats.files_written += files.len();

            Ok(CommitInfo {
                commit_id: format!("{:040x}", stored.commits),
                files: files.len(),
            })
        })
    }

    fn list_stored_hashes<'a>(
        &'a self,
        repo: &'a RepoRef,
        cursor: Option<String>,
    ) -> StorageFuture<'a, HashPage> {
        Box::pin(async move {
            let mut guard = self.lock();
            let state = &mut *guard;
            let offset = match cursor {
                Some(c) => c
                    .parse::<usize>()
                    .map_err(|_| MigrateError::Backend(format!("invalid cursor: {c}")))?,
                None => 0,
            };
            let page_size = state.page_size;
            let stored = state.repo(repo)?;
            let entries: Vec<(String, String)> = stored
                .files
                .iter()
                .skip(offset)
                .take(page_size)
                .map(|(path, f)| (path.clone(), f.sha256.clone()))
                .collect();
            let next = offset + entries.len();
            let next_cursor = (next < stored.files.len()).then(|| next.to_string());
            state.stats.hash_pages_served += 1;
            Ok(HashPage { entries, next_cursor })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> RepoRef {
        RepoRef::new(Platform::HuggingFace, "org", "model", RepoKind::Model)
    }

    #[tokio::test]
    async fn lists_pointers_without_size() {
        let store = MemoryStore::new(Platform::HuggingFace);
        store.put_file(&repo(), "config.json", "{}");
        store.put_large_file(&repo(), "w.bin", vec![1u8; 64]);

        let listed = store.list_files(&repo(), FetchPath::Structured).await.unwrap();
        assert_eq!(listed.len(), 2);
        let w = listed.iter().find(|f| f.path == "w.bin").unwrap();
        assert!(w.is_pointer);
        assert_eq!(w.size, None);
        let c = listed.iter().find(|f| f.path == "config.json").unwrap();
        assert_eq!(c.size, Some(2));
    }

    #[tokio::test]
    async fn pointer_resolves_to_size_and_hash() {
        let store = MemoryStore::new(Platform::HuggingFace);
        store.put_large_file(&repo(), "w.bin", vec![7u8; 100]);

        let ptr = store.resolve_large_object_pointer(&repo(), "w.bin").await.unwrap();
        assert_eq!(ptr.size, 100);
        assert_eq!(ptr.oid, checksum_bytes(&[7u8; 100]));
    }

    #[tokio::test]
    async fn broken_pointer_is_an_error() {
        let store = MemoryStore::new(Platform::HuggingFace);
        store.put_large_file(&repo(), "w.bin", vec![7u8; 100]);
        store.break_pointer("w.bin");

        let err = store.resolve_large_object_pointer(&repo(), "w.bin").await.unwrap_err();
        assert!(matches!(err, MigrateError::Transfer(_)));
    }

    #[tokio::test]
    async fn structured_lock_spares_permissive_path() {
        let store = MemoryStore::new(Platform::ModelScope);
        store.put_file(&repo(), "a.txt", "a");
        store.lock_structured(true);

        let err = store.read_file(&repo(), "a.txt", FetchPath::Structured).await.unwrap_err();
        assert!(err.is_storage_lock());
        let data = store.read_file(&repo(), "a.txt", FetchPath::Permissive).await.unwrap();
        assert_eq!(data, b"a");

        let stats = store.stats();
        assert_eq!(stats.structured_calls, 1);
        assert_eq!(stats.permissive_calls, 1);
    }

    #[tokio::test]
    async fn write_failures_count_down() {
        let store = MemoryStore::new(Platform::ModelScope);
        store.add_repo(&repo());
        store.fail_writes("a.txt", 1, WriteFault::Transient);
        let files = vec![UploadFile {
            path: "a.txt".into(),
            data: b"a".to_vec(),
            is_large_object: false,
        }];

        let err = store.write_files(&repo(), "", &files, "m").await.unwrap_err();
        assert!(err.is_retryable());
        let commit = store.write_files(&repo(), "mirror", &files, "m").await.unwrap();
        assert_eq!(commit.files, 1);
        assert_eq!(store.file(&repo(), "mirror/a.txt").unwrap(), b"a");
        assert_eq!(store.commit_count(&repo()), 1);
    }

    #[tokio::test]
    async fn write_to_missing_repo_is_not_found() {
        let store = MemoryStore::new(Platform::ModelScope);
        let err = store.write_files(&repo(), "", &[], "m").await.unwrap_err();
        assert!(matches!(err, MigrateError::NotFound(_)));
    }

    #[tokio::test]
    async fn create_repo_requires_namespace() {
        let store = MemoryStore::new(Platform::ModelScope);
        let err = store.create_repo(&repo(), Visibility::Private).await.unwrap_err();
        assert!(matches!(err, MigrateError::NotFound(_)));

        store.add_namespace("org");
        store.create_repo(&repo(), Visibility::Private).await.unwrap();
        assert_eq!(store.visibility_of(&repo()), Some(Visibility::Private));
    }

    #[tokio::test]
    async fn hashes_are_paginated() {
        let store = MemoryStore::new(Platform::HuggingFace);
        for i in 0..5 {
            store.put_large_file(&repo(), &format!("w{i}.bin"), vec![i as u8; 8]);
        }
        store.set_hash_page_size(2);

        let first = store.list_stored_hashes(&repo(), None).await.unwrap();
        assert_eq!(first.entries.len(), 2);
        assert_eq!(first.next_cursor.as_deref(), Some("2"));

        let hash = store.get_stored_hash(&repo(), "w4.bin").await.unwrap();
        assert_eq!(hash, Some(checksum_bytes(&[4u8; 8])));
        assert_eq!(store.get_stored_hash(&repo(), "absent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn denied_repo_rejects_calls() {
        let store = MemoryStore::new(Platform::HuggingFace);
        store.add_repo(&repo());
        store.deny_access(&repo());
        let err = store.repo_exists(&repo()).await.unwrap_err();
        assert!(matches!(err, MigrateError::AccessDenied(_)));
    }

    #[tokio::test]
    async fn tracks_overlapping_reads() {
        let store = MemoryStore::new(Platform::HuggingFace);
        store.put_file(&repo(), "a.txt", "a");
        store.put_file(&repo(), "b.txt", "b");
        store.set_read_delay(Duration::from_millis(10));

        let r = repo();
        let (a, b) = tokio::join!(
            store.read_file(&r, "a.txt", FetchPath::Structured),
            store.read_file(&r, "b.txt", FetchPath::Structured),
        );
        assert_eq!(a.unwrap(), b"a");
        assert_eq!(b.unwrap(), b"b");
        assert_eq!(store.stats().peak_concurrent_reads, 2);

        store.read_file(&repo(), "a.txt", FetchPath::Structured).await.unwrap();
        assert_eq!(store.stats().peak_concurrent_reads, 2);
    }
}
