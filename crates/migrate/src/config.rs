//! Migration engine configuration.
//!
//! Stored as TOML. Every field has a default, so a partial file (or no file
//! at all) is valid:
//! - Linux: `~/.config/hubferry/migrate.toml`
//! - Windows: `%APPDATA%/hubferry/migrate.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use hubferry_protocol::normalize_ms_domain;
use hubferry_transfer::{DEFAULT_MAX_CHUNKS, DEFAULT_TARGET_CHUNK_BYTES, PathFilter, RetryPolicy};
use serde::{Deserialize, Serialize};

use crate::error::MigrateError;

/// Environment variable overriding the ModelScope domain.
pub const MS_DOMAIN_ENV: &str = "MODELSCOPE_DOMAIN";

/// Destination files ignored by verification (auto-generated on repo creation).
pub const DEFAULT_VERIFY_SKIP: [&str; 3] = [".gitattributes", "README.md", "configuration.json"];

/// Default concurrent chunk workers per job.
pub const DEFAULT_MAX_CONCURRENCY: usize = 100;

/// Default per-chunk wall clock limit (24 h).
pub const DEFAULT_WORKER_TIMEOUT_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrateConfig {
    /// Bin capacity used by the chunk planner.
    pub target_chunk_bytes: u64,
    /// Upper bound on large-object chunks per job.
    pub max_chunks: usize,
    /// Concurrent chunk workers per job (and concurrent jobs per batch).
    pub max_concurrency: usize,
    /// Per-chunk timeout, in seconds.
    pub worker_timeout_secs: u64,
    pub retry: RetryPolicy,
    /// Destination sub-path all files are written under.
    pub path_in_repo: String,
    /// Destination paths (wildcards allowed) never verified.
    pub verify_skip: Vec<String>,
    pub allow_patterns: Vec<String>,
    pub ignore_patterns: Vec<String>,
    pub ms_domain: String,
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self {
            target_chunk_bytes: DEFAULT_TARGET_CHUNK_BYTES,
            max_chunks: DEFAULT_MAX_CHUNKS,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            worker_timeout_secs: DEFAULT_WORKER_TIMEOUT_SECS,
            retry: RetryPolicy::default(),
            path_in_repo: String::new(),
            verify_skip: DEFAULT_VERIFY_SKIP.iter().map(|s| s.to_string()).collect(),
            allow_patterns: Vec::new(),
            ignore_patterns: Vec::new(),
            ms_domain: hubferry_protocol::DEFAULT_MS_DOMAIN.into(),
        }
    }
}

impl MigrateConfig {
    /// Loads configuration from `path`, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> Result<Self, MigrateError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no configuration file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, MigrateError> {
        let config: MigrateConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the configuration to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), MigrateError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Applies `MODELSCOPE_DOMAIN` when set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(domain) = std::env::var(MS_DOMAIN_ENV)
            && !domain.trim().is_empty()
        {
            self.ms_domain = domain;
        }
        self
    }

    pub fn validate(&self) -> Result<(), MigrateError> {
        if self.target_chunk_bytes == 0 {
            return Err(MigrateError::Config("target_chunk_bytes must be > 0".into()));
        }
        if self.max_chunks == 0 {
            return Err(MigrateError::Config("max_chunks must be > 0".into()));
        }
        if self.max_concurrency == 0 {
            return Err(MigrateError::Config("max_concurrency must be > 0".into()));
        }
        if self.worker_timeout_secs == 0 {
            return Err(MigrateError::Config("worker_timeout_secs must be > 0".into()));
        }
        if !self.path_in_repo.is_empty() {
            hubferry_transfer::join_repo_path(&self.path_in_repo, "file")?;
        }
        Ok(())
    }

    pub fn filter(&self) -> PathFilter {
        PathFilter::new(self.allow_patterns.clone(), self.ignore_patterns.clone())
    }

    pub fn worker_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_timeout_secs)
    }

    /// Bare ModelScope host, scheme and trailing slash removed.
    pub fn ms_host(&self) -> String {
        normalize_ms_domain(&self.ms_domain)
    }
}

/// Returns the platform-specific configuration file path.
pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("hubferry").join("migrate.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("hubferry")
            .join("migrate.toml")
    }
}
