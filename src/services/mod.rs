//! Service layer: the external collaborators of the synchronizer.
//!
//! The reconciler only talks to these traits:
//! - `RepoSource`: search feed and per-identity lookups (`GithubSource`)
//! - `Materializer`: local copy of a repository (`GitMaterializer`)
//! - `Enricher`: analyses of a local copy (`CommandEnricher`)

mod enrich;
mod github;
mod materialize;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ContentEntry, EnrichmentResult, Release, RepoInfo, SearchPage};

pub use enrich::CommandEnricher;
pub use github::GithubSource;
pub use materialize::GitMaterializer;

/// Read access to the repository hosting service.
#[async_trait]
pub trait RepoSource: Send + Sync {
    /// Fetch one page (1-based) of the search feed.
    async fn search(
        &self,
        query: &str,
        sort: &str,
        page: usize,
        per_page: usize,
    ) -> Result<SearchPage>;

    /// Look up a repository; moved or deleted ones are `NotFound`.
    async fn get_item(&self, full_name: &str) -> Result<RepoInfo>;

    /// Releases of a repository, newest first.
    async fn get_releases(&self, full_name: &str) -> Result<Vec<Release>>;

    /// Directory listing (or the single file) at `path`.
    async fn get_contents(&self, full_name: &str, path: &str) -> Result<Vec<ContentEntry>>;
}

/// Produces a local copy of a repository.
#[async_trait]
pub trait Materializer: Send + Sync {
    /// Copy `repo` below `target` and return the repository root.
    ///
    /// `release` is the snapshot to prefer over the live branch head.
    async fn materialize(
        &self,
        repo: &RepoInfo,
        release: Option<&Release>,
        target: &Path,
    ) -> Result<PathBuf>;
}

/// A repository copied to scratch space, ready for analysis.
#[derive(Debug, Clone)]
pub struct MaterializedItem {
    pub full_name: String,

    /// Repository root on disk
    pub root: PathBuf,

    /// Base directory that passed the structure check
    pub base_dir: String,
}

/// Runs the external analyses on a materialized repository.
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(&self, item: &MaterializedItem) -> Result<EnrichmentResult>;
}
