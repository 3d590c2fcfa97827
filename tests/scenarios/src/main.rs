fn main() {
    println!("Run `cargo test -p scenarios` to execute end-to-end migration scenarios.");
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use hubferry_migrate::{
        MemoryStore, MigrateConfig, MigrationEvent, TransferCoordinator, Verifier, WriteFault,
        detect_repo_kind,
    };
    use hubferry_protocol::{
        JobMode, JobReport, JobState, MigrationJob, Platform, RepoKind, RepoRef, TransferStatus,
        Visibility, VerificationSummary, detect_direction, parse_repo_id, split_repo_id,
    };
    use hubferry_transfer::RetryPolicy;

    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Routes engine logs through the test harness; `RUST_LOG` overrides.
    fn init_tracing() {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    }

    fn src() -> RepoRef {
        RepoRef::new(Platform::HuggingFace, "acme", "llm-7b", RepoKind::Model)
    }

    fn dst() -> RepoRef {
        src().on_platform(Platform::ModelScope)
    }

    /// 60-byte bins stand in for 60 GB ones; the packing is size-relative.
    fn config(max_chunks: usize) -> MigrateConfig {
        MigrateConfig {
            target_chunk_bytes: 60,
            max_chunks,
            retry: RetryPolicy {
                initial_delay_ms: 1,
                jitter: false,
                ..RetryPolicy::default()
            },
            ..MigrateConfig::default()
        }
    }

    /// Three ordinary files and five large objects sized 50/40/30/20/10.
    fn seeded_source() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new(Platform::HuggingFace));
        store.add_repo(&src());
        store.put_file(&src(), "config.json", r#"{"arch":"llama"}"#);
        store.put_file(&src(), "tokenizer.json", r#"{"v":1}"#);
        store.put_file(&src(), "README.md", "# llm-7b");
        for size in [50usize, 40, 30, 20, 10] {
            store.put_large_file(&src(), &format!("shard-{size}.safetensors"), vec![size as u8; size]);
        }
        store
    }

    fn empty_dest() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new(Platform::ModelScope));
        store.add_namespace("acme");
        store
    }

    fn chunk_paths(job: &MigrationJob) -> Vec<Vec<String>> {
        job.chunks
            .as_ref()
            .expect("job was planned")
            .iter()
            .map(|c| c.files.iter().map(|f| f.relative_path.clone()).collect())
            .collect()
    }

    fn shards(sizes: &[usize]) -> Vec<String> {
        sizes
            .iter()
            .map(|s| format!("shard-{s}.safetensors"))
            .collect()
    }

    // --- Planning scenarios ---

    #[tokio::test]
    async fn scenario_a_first_fit_packing() {
        init_tracing();
        let source = seeded_source();
        let dest = empty_dest();
        let coordinator = TransferCoordinator::new(source, dest.clone(), config(100))
            .expect("valid config");

        let job = coordinator.run(src(), dst(), JobMode::Parallel).await;

        assert_eq!(job.state, JobState::Completed);
        let chunks = chunk_paths(&job);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].len(), 3);
        assert_eq!(chunks[1], shards(&[50]));
        assert_eq!(chunks[2], shards(&[40, 20]));
        assert_eq!(chunks[3], shards(&[30, 10]));
        assert!(job.results.iter().all(|r| r.is_success()));
        assert_eq!(dest.paths(&dst()).len(), 8);
    }

    #[tokio::test]
    async fn scenario_b_chunk_budget_escalates() {
        init_tracing();
        let coordinator = TransferCoordinator::new(seeded_source(), empty_dest(), config(2))
            .expect("valid config");

        let job = coordinator.run(src(), dst(), JobMode::Parallel).await;

        assert_eq!(job.state, JobState::Completed);
        let chunks = chunk_paths(&job);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1], shards(&[50, 20]));
        assert_eq!(chunks[2], shards(&[40, 30, 10]));
    }

    // --- Idempotency and verification ---

    #[tokio::test]
    async fn scenario_c_rerun_is_verified_noop() {
        init_tracing();
        let source = seeded_source();
        let dest = empty_dest();
        let coordinator = TransferCoordinator::new(source, dest.clone(), config(100))
            .expect("valid config");

        let first = coordinator.run(src(), dst(), JobMode::Parallel).await;
        assert!(first.report().safe_to_delete_source());
        let bytes_written = dest.stats().bytes_written;

        let rerun = coordinator.run(src(), dst(), JobMode::Parallel).await;
        assert_eq!(rerun.state, JobState::Completed);
        let report = rerun.report();
        assert_eq!(report.bytes_transferred, 0);
        assert_eq!(report.verification.matched, 5);
        assert_eq!(report.verification.mismatched, 0);
        assert!(report.verified);
        assert_eq!(dest.stats().bytes_written, bytes_written);
    }

    #[tokio::test]
    async fn standalone_verifier_reports_every_match() {
        init_tracing();
        let source = seeded_source();
        let dest = empty_dest();
        let job = TransferCoordinator::new(source, dest.clone(), config(100))
            .expect("valid config")
            .run(src(), dst(), JobMode::Single)
            .await;

        let records = Verifier::new(dest)
            .verify(job.manifest.as_ref().expect("manifest built"), &dst())
            .await
            .expect("destination exists");
        let summary = VerificationSummary::from_records(&records);
        assert_eq!(summary.matched, 5);
        assert_eq!(summary.unverifiable, 3);
    }

    // --- Failure isolation ---

    #[tokio::test]
    async fn scenario_d_one_chunk_exhausts_retries() {
        init_tracing();
        let source = Arc::new(MemoryStore::new(Platform::HuggingFace));
        for i in 0..5u8 {
            source.put_large_file(&src(), &format!("part-{i}.bin"), vec![i; 50]);
        }
        let dest = empty_dest();
        dest.fail_writes("part-3.bin", u32::MAX, WriteFault::Transient);

        let job = TransferCoordinator::new(source, dest, config(100))

            .expect("valid config")
            .run(src(), dst(), JobMode::Parallel)
            .await;

        assert_eq!(job.state, JobState::PartiallyCompleted);
        let dispatched: Vec<_> = job.results.iter().filter(|r| r.chunk_index > 0).collect();
        assert_eq!(dispatched.len(), 5);
        let failed: Vec<_> = dispatched
            .iter()
            .filter(|r| r.status == TransferStatus::Failed)
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].attempt_count, 3);
        assert_eq!(
            dispatched
                .iter()
                .filter(|r| r.status == TransferStatus::Success)
                .count(),
            4
        );
        assert!(!job.report().safe_to_delete_source());
    }

    #[tokio::test]
    async fn storage_lock_falls_back_end_to_end() {
        init_tracing();
        let source = seeded_source();
        source.lock_structured(true);
        let dest = empty_dest();

        let job = TransferCoordinator::new(source.clone(), dest, config(100))

            .expect("valid config")
            .run(src(), dst(), JobMode::Parallel)
            .await;

        assert_eq!(job.state, JobState::Completed);
        assert!(source.stats().permissive_calls > 0);
    }

    #[tokio::test]
    async fn missing_source_never_uses_fallback() {
        init_tracing();
        let source = Arc::new(MemoryStore::new(Platform::HuggingFace));
        let job = TransferCoordinator::new(source.clone(), empty_dest(), config(100))
            .expect("valid config")
            .run(src(), dst(), JobMode::Parallel)
            .await;

        assert_eq!(job.state, JobState::Failed);
        assert_eq!(source.stats().permissive_calls, 0);
    }

    #[tokio::test]
    async fn denied_source_fails_preflight() {
        init_tracing();
        let source = seeded_source();
        source.deny_access(&src());
        let job = TransferCoordinator::new(source.clone(), empty_dest(), config(100))
            .expect("valid config")
            .run(src(), dst(), JobMode::Parallel)
            .await;

        assert_eq!(job.state, JobState::Failed);
        assert!(job.error.expect("error recorded").contains("access denied"));
        assert_eq!(source.stats().permissive_calls, 0);
    }

    #[tokio::test]
    async fn unresolved_pointer_still_transfers() {
        init_tracing();
        let source = seeded_source();
        source.break_pointer("shard-30.safetensors");
        let dest = empty_dest();

        let job = TransferCoordinator::new(source, dest.clone(), config(100))

            .expect("valid config")
            .run(src(), dst(), JobMode::Parallel)
            .await;

        assert_eq!(job.state, JobState::Completed);
        let manifest = job.manifest.as_ref().expect("manifest built");
        assert_eq!(manifest.unresolved, vec!["shard-30.safetensors".to_string()]);
        assert!(dest.file(&dst(), "shard-30.safetensors").is_some());
        assert_eq!(job.report().verification.unverifiable, 4);
    }

    // --- Batch ---

    #[tokio::test]
    async fn batch_reports_k_of_n() {
        init_tracing();
        let source = seeded_source();
        let names = ["alpha", "beta", "gamma", "delta"];
        for name in names {
            let repo = RepoRef::new(Platform::HuggingFace, "acme", name, RepoKind::Model);
            source.put_large_file(&repo, "w.bin", name.as_bytes().to_vec());
        }
        let dest = empty_dest();
        dest.add_repo(&RepoRef::new(Platform::ModelScope, "acme", "beta", RepoKind::Model));
        dest.fail_writes("w.bin", u32::MAX, WriteFault::Denied);

        let mut coordinator = TransferCoordinator::new(source, dest, config(100))

            .expect("valid config");
        let mut events = coordinator.take_events().expect("events available");
        let pairs = std::iter::once((src(), dst()))
            .chain(names.iter().map(|name| {
                let repo = RepoRef::new(Platform::HuggingFace, "acme", name, RepoKind::Model);
                let dest = repo.on_platform(Platform::ModelScope);
                (repo, dest)
            }))
            .collect();

        let report = coordinator.run_batch(pairs).await;

        assert_eq!(report.jobs.len(), 4);
        assert_eq!(report.skipped_count(), 1);
        assert_eq!(report.skipped[0].name, "beta");
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 3);
        assert_eq!(report.jobs[0].source.name, "llm-7b");
        assert_eq!(report.jobs[1].source.name, "alpha");

        drop(coordinator);
        let mut skipped_events = 0;
        while let Some(event) = events.recv().await {
            if matches!(event, MigrationEvent::Skipped { .. }) {
                skipped_events += 1;
            }
        }
        assert_eq!(skipped_events, 1);
    }

    // --- Caller-facing inputs ---

    #[tokio::test]
    async fn prefixed_repo_id_drives_a_migration() {
        init_tracing();
        let store_hf = Arc::new(MemoryStore::new(Platform::HuggingFace));
        let corpus = RepoRef::new(Platform::HuggingFace, "acme", "corpus", RepoKind::Dataset)
            .with_visibility(Visibility::Private);
        store_hf.put_large_file(&corpus, "train.parquet", vec![1u8; 32]);
        let store_ms = empty_dest();

        let (repo_id, prefixed) = parse_repo_id("hf:acme/corpus").expect("valid repo id");
        let (from, to) = detect_direction(prefixed, None).expect("direction");
        assert_eq!((from, to), (Platform::HuggingFace, Platform::ModelScope));
        let (namespace, name) = split_repo_id(&repo_id).expect("namespace/name");
        let kind = detect_repo_kind(store_hf.as_ref(), namespace, name)
            .await
            .expect("repository exists");
        assert_eq!(kind, RepoKind::Dataset);

        let source = RepoRef::new(from, namespace, name, kind);
        let dest = source.on_platform(to);
        let job = TransferCoordinator::new(store_hf, store_ms.clone(), config(100))
            .expect("valid config")
            .run(source, dest.clone(), JobMode::Parallel)
            .await;

        assert_eq!(job.state, JobState::Completed);
        assert_eq!(store_ms.visibility_of(&dest), Some(Visibility::Private));
        assert_eq!(
            dest.web_url("https://www.modelscope.ai/"),
            "https://www.modelscope.ai/datasets/acme/corpus"
        );
    }

    #[tokio::test]
    async fn spawned_jobs_run_detached() {
        init_tracing();
        let coordinator = TransferCoordinator::new(seeded_source(), empty_dest(), config(100))
            .expect("valid config");
        let handle = coordinator.spawn(src(), dst(), JobMode::Parallel);
        drop(coordinator);

        let job = handle.wait().await.expect("job task joined");
        assert_eq!(job.state, JobState::Completed);
        assert!(job.finished_at.is_some());
    }

    // --- Fixtures ---

    #[test]
    fn fixture_config_loads() {
        let config = MigrateConfig::load(&fixtures_dir().join("migrate.toml")).expect("valid config");
        assert_eq!(config.max_chunks, 2);
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.retry.initial_delay_ms, 1);
        assert!(!config.filter().is_included("model.onnx"));
        assert_eq!(config.ms_host(), "www.modelscope.ai");
        assert_eq!(config.verify_skip.len(), 3);
    }

    #[test]
    fn fixture_job_report_shape() {
        let path = fixtures_dir().join("job_report.json");
        let data = std::fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        let fixture: serde_json::Value = serde_json::from_str(&data).expect("valid JSON");

        let report: JobReport = serde_json::from_value(fixture.clone()).expect("report shape");
        assert_eq!(report.state, JobState::PartiallyCompleted);
        assert!(!report.safe_to_delete_source());

        let reserialized = serde_json::to_value(report).expect("serializable");
        assert_eq!(fixture, reserialized);
    }
}
