//! Migration coordinator.
//!
//! Drives a job through preflight, manifest, planning, bounded chunk
//! dispatch and verification, and runs batches of jobs. One chunk failing
//! never stops the others; the job state is derived from all results.

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures_util::FutureExt;
use futures_util::future::join_all;
use hubferry_protocol::{
    BatchReport, Chunk, JobMode, JobState, Manifest, MigrationJob, RepoKind, RepoRef,
    TransferResult,
};
use hubferry_transfer::{ChunkPlanner, format_duration, format_size};
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::MigrateConfig;
use crate::error::MigrateError;
use crate::events::MigrationEvent;
use crate::handle::JobHandle;
use crate::manifest::ManifestBuilder;
use crate::storage::StorageBackend;
use crate::verifier::{Verifier, stored_hash_map};
use crate::worker::TransferWorker;

/// Capacity of the progress event channel.
const EVENT_CAPACITY: usize = 256;

/// Coordinates migrations from one source platform to one destination
/// platform.
pub struct TransferCoordinator {
    inner: Arc<Inner>,
    events_rx: Option<mpsc::Receiver<MigrationEvent>>,
}

struct Inner {
    source: Arc<dyn StorageBackend>,
    dest: Arc<dyn StorageBackend>,
    config: MigrateConfig,
    events_tx: mpsc::Sender<MigrationEvent>,
    cancel: CancellationToken,
    /// Shared by every chunk worker of every job this coordinator runs.
    workers: Arc<Semaphore>,
}

impl TransferCoordinator {
    /// Fails with [`MigrateError::Config`] when `config` does not validate.
    pub fn new(
        source: Arc<dyn StorageBackend>,
        dest: Arc<dyn StorageBackend>,
        config: MigrateConfig,
    ) -> Result<Self, MigrateError> {
        config.validate()?;
        let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);
        let workers = Arc::new(Semaphore::new(config.max_concurrency));
        Ok(Self {
            inner: Arc::new(Inner {
                source,
                dest,
                config,
                events_tx,
                cancel: CancellationToken::new(),
                workers,
            }),
            events_rx: Some(events_rx),
        })
    }

    /// Takes the event receiver. Can only be called once.
    ///
    /// Events are dropped, not buffered without bound, when the receiver
    /// falls behind.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<MigrationEvent>> {
        self.events_rx.take()
    }

    /// Cancelling stops chunks that have not finished; they report failure.
    pub fn cancel_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    pub fn config(&self) -> &MigrateConfig {
        &self.inner.config
    }

    /// Runs one migration to completion.
    pub async fn run(&self, source: RepoRef, dest: RepoRef, mode: JobMode) -> MigrationJob {
        let job = MigrationJob::new(source, dest, mode);
        let (state_tx, _) = watch::channel(JobState::Pending);
        self.inner.execute(job, state_tx).await
    }

    /// Launches one migration in the background and returns immediately.
    pub fn spawn(&self, source: RepoRef, dest: RepoRef, mode: JobMode) -> JobHandle {
        let job = MigrationJob::new(source, dest, mode);
        let id = job.id;
        let (state_tx, state_rx) = watch::channel(JobState::Pending);
        let inner = self.inner.clone();
        let task = tokio::spawn(async move { inner.execute(job, state_tx).await });
        JobHandle::new(id, state_rx, task)
    }

    /// Migrates many repositories.
    ///
    /// Destination existence is checked for every pair concurrently first;
    /// pairs whose destination already exists are skipped. The rest run as
    /// concurrent jobs, at most `max_concurrency` at a time, and their chunk
    /// workers draw on the coordinator's single worker cap. Jobs are
    /// reported in input order.
    pub async fn run_batch(&self, pairs: Vec<(RepoRef, RepoRef)>) -> BatchReport {
        let inner = &self.inner;
        let checks = join_all(pairs.iter().map(|(_, dest)| inner.dest.repo_exists(dest))).await;

        let mut report = BatchReport {
            jobs: Vec::new(),
            skipped: Vec::new(),
        };
        let mut finished: Vec<(usize, MigrationJob)> = Vec::new();
        let semaphore = Arc::new(Semaphore::new(inner.config.max_concurrency));
        let mut set = JoinSet::new();

        for (position, ((source, dest), exists)) in pairs.into_iter().zip(checks).enumerate() {
            match exists {
                Ok(true) => {
                    info!(dest = %dest, "destination exists, skipping");
                    inner.emit(MigrationEvent::Skipped {
                        dest: dest.clone(),
                        reason: "destination already exists".into(),
                    });
                    report.skipped.push(dest);
                }
                Ok(false) => {
                    let inner = inner.clone();
                    let semaphore = semaphore.clone();
                    set.spawn(async move {
                        let _permit = semaphore.acquire_owned().await;
                        let job = MigrationJob::new(source.clone(), dest.clone(), JobMode::BatchMember);
                        let (state_tx, _) = watch::channel(JobState::Pending);
                        let job = AssertUnwindSafe(inner.execute(job, state_tx))
                            .catch_unwind()
                            .await
                            .unwrap_or_else(|_| {
                                let mut job = MigrationJob::new(source, dest, JobMode::BatchMember);
                                job.fail("job panicked".into());
                                job
                            });
                        (position, job)
                    });
                }
                Err(e) => {
                    warn!(dest = %dest, error = %e, "destination pre-check failed");
                    let mut job = MigrationJob::new(source, dest, JobMode::BatchMember);
                    job.fail(format!("destination pre-check failed: {e}"));
                    finished.push((position, job));
                }
            }
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(entry) => finished.push(entry),
                Err(e) => error!(error = %e, "batch task failed"),
            }
        }

        finished.sort_by_key(|(position, _)| *position);
        report.jobs = finished.into_iter().map(|(_, job)| job).collect();
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            skipped = report.skipped_count(),
            "batch finished"
        );
        report
    }
}

impl Inner {
    async fn execute(&self, mut job: MigrationJob, state_tx: watch::Sender<JobState>) -> MigrationJob {
        let started = Instant::now();
        info!(
            job = %job.id,
            source = %job.source,
            dest = %job.dest,
            mode = ?job.mode,
            "migration started"
        );

        self.set_state(&mut job, &state_tx, JobState::Preflight);
        let dest_existed = match self.preflight(&mut job).await {
            Ok(existed) => existed,
            Err(e) => return self.fail(job, &state_tx, e.to_string(), started),
        };

        let manifest = match self.build_manifest(&job.source).await {
            Ok(m) => m,
            Err(e) => return self.fail(job, &state_tx, e.to_string(), started),
        };
        job.manifest = Some(manifest.clone());

        let chunks = self.plan(&job, &manifest);
        self.emit(MigrationEvent::Planned {
            job_id: job.id,
            chunks: chunks.len(),
            total_bytes: manifest.total_bytes,
        });
        job.chunks = Some(chunks.clone());

        let existing = if dest_existed {
            self.existing_hashes(&job.dest).await
        } else {
            HashMap::new()
        };

        self.set_state(&mut job, &state_tx, JobState::Transferring);
        job.results = self.dispatch(&job, chunks, existing).await;

        let outcome = job.outcome_from_results();
        if outcome == JobState::Failed {
            let msg = format!("all {} chunk(s) failed", job.results.len());
            return self.fail(job, &state_tx, msg, started);
        }

        self.set_state(&mut job, &state_tx, JobState::Verifying);
        match self.verifier().verify(&manifest, &job.dest).await {
            Ok(records) => job.verification = records,
            Err(e) => {
                warn!(job = %job.id, error = %e, "verification failed");
                job.error = Some(format!("verification failed: {e}"));
            }
        }

        job.finished_at = Some(Utc::now());
        self.set_state(&mut job, &state_tx, outcome);
        self.finished(&job, started);
        job
    }

    /// Checks both ends and creates the destination shell. Returns whether
    /// the destination already existed.
    async fn preflight(&self, job: &mut MigrationJob) -> Result<bool, MigrateError> {
        if !self.dest.namespace_exists(&job.dest.namespace).await? {
            return Err(MigrateError::NotFound(format!(
                "destination namespace {} on {}",
                job.dest.namespace, job.dest.platform
            )));
        }
        if !self.source.repo_exists(&job.source).await? {
            return Err(MigrateError::NotFound(format!("source repository {}", job.source)));
        }

        let visibility = self.source.repo_visibility(&job.source).await?;
        job.source.visibility = visibility;
        job.dest.visibility = visibility;

        if self.dest.repo_exists(&job.dest).await? {
            let conflict = MigrateError::DestinationConflict(job.dest.to_string());
            if job.mode == JobMode::BatchMember {
                return Err(conflict);
            }
            warn!(job = %job.id, error = %conflict, "existing files will be overwritten");
            return Ok(true);
        }
        self.dest.create_repo(&job.dest, visibility).await?;
        info!(job = %job.id, dest = %job.dest, ?visibility, "destination created");
        Ok(false)
    }

    /// Hashes already on an existing destination. A failed listing only
    /// disables skipping.
    async fn existing_hashes(&self, dest: &RepoRef) -> HashMap<String, String> {
        match stored_hash_map(self.dest.as_ref(), dest).await {
            Ok(hashes) => hashes,
            Err(e) => {
                warn!(repo = %dest, error = %e, "could not list destination hashes");
                HashMap::new()
            }
        }
    }

    async fn build_manifest(&self, source: &RepoRef) -> Result<Manifest, MigrateError> {
        let builder = ManifestBuilder::new(self.source.clone()).with_filter(self.config.filter());
        match builder.build(source).await {
            Err(MigrateError::PartialManifest { manifest, unresolved }) => {
                warn!(
                    repo = %source,
                    unresolved = unresolved.len(),
                    "continuing with unresolved large objects"
                );
                Ok(*manifest)
            }
            other => other,
        }
    }

    fn plan(&self, job: &MigrationJob, manifest: &Manifest) -> Vec<Chunk> {
        match job.mode {
            JobMode::Single => vec![Chunk::whole(manifest)],
            JobMode::Parallel | JobMode::BatchMember => {
                ChunkPlanner::new(self.config.target_chunk_bytes, self.config.max_chunks).plan(manifest)
            }
        }
    }

    fn worker(&self, existing: HashMap<String, String>) -> TransferWorker {
        TransferWorker::new(self.source.clone(), self.dest.clone())
            .with_existing(Arc::new(existing))
            .with_retry(self.config.retry.clone())
            .with_timeout(self.config.worker_timeout())
            .with_path_in_repo(&self.config.path_in_repo)
            .with_cancel(self.cancel.child_token())
    }

    fn verifier(&self) -> Verifier {
        Verifier::new(self.dest.clone())
            .with_skip(self.config.verify_skip.clone())
            .with_path_in_repo(&self.config.path_in_repo)
    }

    /// Runs chunk 0 first, then the rest concurrently. Every chunk holds a
    /// permit of the shared worker cap while it runs. Empty chunks are not
    /// dispatched. Results come back ordered by chunk index.
    async fn dispatch(
        &self,
        job: &MigrationJob,
        chunks: Vec<Chunk>,
        existing: HashMap<String, String>,
    ) -> Vec<TransferResult> {
        let mut chunks: Vec<Chunk> = chunks.into_iter().filter(|c| !c.is_empty()).collect();
        let total = chunks.len();
        let worker = Arc::new(self.worker(existing));
        let source = Arc::new(job.source.clone());
        let dest = Arc::new(job.dest.clone());
        let mut results = Vec::with_capacity(total);

        if chunks.first().is_some_and(|c| c.index == 0) {
            let first = chunks.remove(0);
            let result = run_guarded(&self.workers, &worker, &first, &source, &dest).await;
            self.chunk_finished(job, &result, 1, total);
            results.push(result);
        }

        let mut set = JoinSet::new();
        let mut pending = HashSet::new();
        for chunk in chunks {
            pending.insert(chunk.index);
            let worker = worker.clone();
            let source = source.clone();
            let dest = dest.clone();
            let workers = self.workers.clone();
            set.spawn(async move {
                run_guarded(&workers, &worker, &chunk, &source, &dest).await
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(result) => {
                    pending.remove(&result.chunk_index);
                    self.chunk_finished(job, &result, results.len() + 1, total);
                    results.push(result);
                }
                Err(e) => error!(job = %job.id, error = %e, "chunk task failed"),
            }
        }
        for index in pending {
            results.push(TransferResult::failed(
                index,
                MigrateError::Task("chunk task lost".into()).to_string(),
                0,
            ));
        }

        results.sort_by_key(|r| r.chunk_index);
        results
    }

    fn chunk_finished(&self, job: &MigrationJob, result: &TransferResult, completed: usize, total: usize) {
        debug!(
            job = %job.id,
            chunk = result.chunk_index,
            status = ?result.status,
            completed,
            total,
            "chunk finished"
        );
        self.emit(MigrationEvent::ChunkFinished {
            job_id: job.id,
            result: result.clone(),
            completed,
            total,
        });
    }

    fn set_state(&self, job: &mut MigrationJob, state_tx: &watch::Sender<JobState>, state: JobState) {
        job.state = state;
        state_tx.send_replace(state);
        debug!(job = %job.id, ?state, "state changed");
        self.emit(MigrationEvent::StateChanged {
            job_id: job.id,
            state,
        });
    }

    fn fail(
        &self,
        mut job: MigrationJob,
        state_tx: &watch::Sender<JobState>,
        error: String,
        started: Instant,
    ) -> MigrationJob {
        error!(job = %job.id, source = %job.source, error = %error, "migration failed");
        job.fail(error);
        state_tx.send_replace(JobState::Failed);
        self.emit(MigrationEvent::StateChanged {
            job_id: job.id,
            state: JobState::Failed,
        });
        self.finished(&job, started);
        job
    }

    fn finished(&self, job: &MigrationJob, started: Instant) {
        let report = job.report();
        info!(
            job = %job.id,
            state = ?job.state,
            files = report.files_transferred,
            size = %format_size(report.bytes_transferred),
            elapsed = %format_duration(started.elapsed()),
            verified = report.verified,
            "migration finished"
        );
        self.emit(MigrationEvent::Finished {
            job_id: job.id,
            report,
        });
    }

    fn emit(&self, event: MigrationEvent) {
        if let Err(e) = self.events_tx.try_send(event) {
            debug!(error = %e, "progress event dropped");
        }
    }
}

/// Runs one chunk while holding a worker permit. A panicking worker becomes
/// a failed result.
async fn run_guarded(
    workers: &Semaphore,
    worker: &TransferWorker,
    chunk: &Chunk,
    source: &RepoRef,
    dest: &RepoRef,
) -> TransferResult {
    let _permit = workers.acquire().await;
    AssertUnwindSafe(worker.execute(chunk, source, dest))
        .catch_unwind()
        .await
        .unwrap_or_else(|_| {
            error!(chunk = chunk.index, "chunk worker panicked");
            TransferResult::failed(
                chunk.index,
                MigrateError::Task("chunk worker panicked".into()).to_string(),
                0,
            )
        })
}

/// Finds whether `namespace/name` is a model, dataset or space, trying in
/// that order.
pub async fn detect_repo_kind(
    backend: &dyn StorageBackend,
    namespace: &str,
    name: &str,
) -> Result<RepoKind, MigrateError> {
    for kind in RepoKind::DETECTION_ORDER {
        let probe = RepoRef::new(backend.platform(), namespace, name, kind);
        if backend.repo_exists(&probe).await? {
            debug!(repo = %probe, "repository kind detected");
            return Ok(kind);
        }
    }
    Err(MigrateError::NotFound(format!(
        "{namespace}/{name} on {}",
        backend.platform()
    )))
}
