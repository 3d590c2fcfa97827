//! Repository migration engine.
//!
//! Moves repositories between hosting platforms: enumerates the source into
//! a manifest, plans chunks, runs bounded concurrent transfer workers with a
//! structured-first, permissive-fallback fetch path, and verifies large
//! objects by hash on the destination.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod fallback;
pub mod handle;
pub mod manifest;
pub mod memory;
pub mod storage;
pub mod verifier;
pub mod worker;

pub use config::MigrateConfig;
pub use coordinator::{TransferCoordinator, detect_repo_kind};
pub use error::MigrateError;
pub use events::MigrationEvent;
pub use fallback::{FallbackDownloader, FetchedFile};
pub use handle::JobHandle;
pub use manifest::ManifestBuilder;
pub use memory::{MemoryStore, StoreStats, WriteFault};
pub use storage::{
    CommitInfo, FetchPath, HashPage, ListedFile, StorageBackend, StorageFuture, UploadFile,
};
pub use verifier::Verifier;
pub use worker::TransferWorker;
