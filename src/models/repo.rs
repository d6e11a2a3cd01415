//! Repository data as reported by the search service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A repository returned by the search feed or an identity lookup.
///
/// Read-only to the synchronizer; catalog records are derived from it
/// through [`crate::models::CatalogEntry::from_repo`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepoInfo {
    /// Globally unique identity, `owner/name`
    pub full_name: String,

    /// Short name
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Browser URL
    pub html_url: String,

    /// Clone URL for `git clone`
    pub clone_url: String,

    #[serde(default)]
    pub stargazers_count: u64,

    #[serde(default)]
    pub subscribers_count: Option<u64>,

    #[serde(default)]
    pub topics: Vec<String>,

    /// Last modification of the repository itself
    pub updated_at: DateTime<Utc>,
}

impl RepoInfo {
    /// Freshness marker of this repository given its latest release.
    ///
    /// A new release can change which artifact is analysed without
    /// touching `updated_at`, so the release time participates.
    pub fn freshness(&self, latest_release: Option<&Release>) -> i64 {
        let own = self.updated_at.timestamp();
        latest_release
            .map(|release| release.created_at.timestamp().max(own))
            .unwrap_or(own)
    }
}

/// A published release of a repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Release {
    pub tag_name: String,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub prerelease: bool,

    #[serde(default)]
    pub draft: bool,

    /// Source archive of the tagged tree
    #[serde(default)]
    pub zipball_url: Option<String>,
}

impl Release {
    /// Whether this release is a stable, published one.
    pub fn is_stable(&self) -> bool {
        !self.prerelease && !self.draft
    }
}

/// Pick the release whose snapshot should be analysed.
///
/// Releases are expected newest first, as the API lists them.
pub fn latest_stable(releases: &[Release]) -> Option<&Release> {
    releases.iter().find(|release| release.is_stable())
}

/// Kind of an entry in a directory listing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    File,
    Dir,
    Symlink,
    Submodule,
}

/// One entry of a repository directory listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContentEntry {
    pub name: String,

    pub path: String,

    #[serde(rename = "type")]
    pub kind: ContentKind,
}

impl ContentEntry {
    pub fn file(path: &str) -> Self {
        Self::new(path, ContentKind::File)
    }

    pub fn dir(path: &str) -> Self {
        Self::new(path, ContentKind::Dir)
    }

    fn new(path: &str, kind: ContentKind) -> Self {
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        Self {
            name,
            path: path.to_string(),
            kind,
        }
    }
}
