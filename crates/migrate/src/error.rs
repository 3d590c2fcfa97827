//! Migration error taxonomy.

use std::time::Duration;

use hubferry_protocol::Manifest;

/// Errors produced while migrating a repository.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// Source or destination repository (or namespace) is absent.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Platform-side storage/quota lock on the structured API.
    #[error("storage locked: {0}")]
    StorageLocked(String),

    #[error("transient network error: {0}")]
    TransientNetwork(String),

    #[error("hash mismatch for {path}: expected {expected}, got {actual}")]
    HashMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("destination already exists: {0}")]
    DestinationConflict(String),

    /// Enumeration succeeded but some pointers could not be resolved. The
    /// manifest is complete; the listed entries lack a hash.
    #[error("manifest incomplete: {} large object(s) unresolved", unresolved.len())]
    PartialManifest {
        manifest: Box<Manifest>,
        unresolved: Vec<String>,
    },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transfer error: {0}")]
    Transfer(#[from] hubferry_transfer::TransferError),

    #[error("task error: {0}")]
    Task(String),
}

impl MigrateError {
    /// Whether a destination write failing with this error may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientNetwork(_) | Self::Timeout(_) | Self::Backend(_)
        )
    }

    /// The lockout signature that enables the permissive fetch path.
    pub fn is_storage_lock(&self) -> bool {
        matches!(self, Self::StorageLocked(_))
    }
}
