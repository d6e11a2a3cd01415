// src/models/mod.rs

//! Domain models for the catalog synchronizer.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod blacklist;
mod config;
mod entry;
mod overrides;
mod repo;

// Re-export all public types
pub use blacklist::Blacklist;
pub use config::{
    CatalogConfig, Config, EnrichmentConfig, GithubConfig, LimitsConfig, PathsConfig,
    SearchConfig, StructureConfig,
};
pub use entry::{CatalogEntry, EnrichmentResult, SkipEntry, SkipReason, Snapshot};
pub use overrides::{OFFSET_VAR, RunOverrides, TEST_REPO_VAR};
pub use repo::{ContentEntry, ContentKind, Release, RepoInfo, latest_stable};

/// One page of search results.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    /// Total matches reported by the service, beyond what it exposes
    pub total_count: usize,

    /// Repositories on this page, most recently updated first
    pub items: Vec<RepoInfo>,
}
