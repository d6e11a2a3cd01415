//! Storage abstractions for snapshot persistence.
//!
//! A snapshot consists of two artifacts:
//!
//! ```text
//! data.js      # header line, then the accepted catalog as a JSON array,
//!              # sorted by ascending popularity
//! skips.json   # skip list, a JSON object keyed by identity, sorted keys
//! ```
//!
//! Checkpoints taken during a run are staged separately and never touch
//! these artifacts.

pub mod local;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::Snapshot;

// Re-export for convenience
pub use local::LocalStorage;

/// Metadata about a storage write operation.
#[derive(Debug, Clone)]
pub struct WriteMetadata {
    /// Number of accepted entries written
    pub accepted_count: usize,
    /// Number of skip entries written
    pub skipped_count: usize,
    /// Timestamp of the write
    pub timestamp: DateTime<Utc>,
}

/// Trait for snapshot storage backends.
#[async_trait]
pub trait SnapshotStorage: Send + Sync {
    /// Load the previous snapshot; missing artifacts load as empty.
    async fn load(&self) -> Result<Snapshot>;

    /// Replace the persisted snapshot.
    async fn store(&self, snapshot: &Snapshot) -> Result<WriteMetadata>;

    /// Stage an intermediate snapshot; the persisted one is left alone.
    async fn store_checkpoint(&self, snapshot: &Snapshot) -> Result<WriteMetadata>;

    /// Discard any staged checkpoint.
    async fn clear_checkpoint(&self) -> Result<()>;
}
