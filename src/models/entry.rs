//! Catalog records and the persisted snapshot.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::repo::{Release, RepoInfo};

/// Output of the enrichment step, passed through uninterpreted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EnrichmentResult {
    pub fields: Map<String, Value>,
}

impl EnrichmentResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert of one payload field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// One processed, accepted repository.
///
/// Entries are never edited: a reprocessing run replaces them wholesale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogEntry {
    /// Stable identity, `owner/name`
    pub full_name: String,

    /// Freshness marker at the time of acceptance
    pub last_update: i64,

    /// Schema version the entry was produced with
    pub data_format: u32,

    #[serde(default)]
    pub stargazers_count: u64,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub html_url: String,

    #[serde(default)]
    pub topics: Vec<String>,

    /// Tag of the release that was analysed, if any
    #[serde(default)]
    pub latest_release: Option<String>,

    /// Enrichment payload
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl CatalogEntry {
    /// Map a repository and its enrichment output to a catalog record.
    ///
    /// Payload keys that collide with record fields are dropped with a
    /// warning instead of shadowing them.
    pub fn from_repo(
        repo: &RepoInfo,
        release: Option<&Release>,
        freshness: i64,
        data_format: u32,
        enrichment: EnrichmentResult,
    ) -> Self {
        let mut payload = enrichment.fields;
        for reserved in Self::RESERVED_KEYS {
            if payload.remove(*reserved).is_some() {
                log::warn!(
                    "Dropping enrichment field '{}' of {}: reserved",
                    reserved,
                    repo.full_name
                );
            }
        }

        Self {
            full_name: repo.full_name.clone(),
            last_update: freshness,
            data_format,
            stargazers_count: repo.stargazers_count,
            description: repo.description.clone(),
            html_url: repo.html_url.clone(),
            topics: repo.topics.clone(),
            latest_release: release.map(|r| r.tag_name.clone()),
            payload,
        }
    }

    const RESERVED_KEYS: &'static [&'static str] = &[
        "full_name",
        "last_update",
        "data_format",
        "stargazers_count",
        "description",
        "html_url",
        "topics",
        "latest_release",
    ];
}

/// Why a repository was left out of the catalog.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingEntryPoint,
    InvalidModules,
    Vanished,
    TransferFailed,
    EnrichmentFailed,
}

/// One repository excluded from the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkipEntry {
    pub full_name: String,

    pub last_update: i64,

    pub data_format: u32,

    /// Informational only, not part of the cache key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<SkipReason>,
}

impl SkipEntry {
    pub fn new(full_name: &str, last_update: i64, data_format: u32, reason: SkipReason) -> Self {
        Self {
            full_name: full_name.to_string(),
            last_update,
            data_format,
            reason: Some(reason),
        }
    }
}

/// Accepted catalog and skip list, both keyed by identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub accepted: BTreeMap<String, CatalogEntry>,
    pub skipped: BTreeMap<String, SkipEntry>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from loaded records, later duplicates win.
    pub fn from_records(
        accepted: impl IntoIterator<Item = CatalogEntry>,
        skipped: impl IntoIterator<Item = SkipEntry>,
    ) -> Self {
        Self {
            accepted: accepted
                .into_iter()
                .map(|entry| (entry.full_name.clone(), entry))
                .collect(),
            skipped: skipped
                .into_iter()
                .map(|entry| (entry.full_name.clone(), entry))
                .collect(),
        }
    }

    pub fn contains(&self, full_name: &str) -> bool {
        self.accepted.contains_key(full_name) || self.skipped.contains_key(full_name)
    }

    /// Number of distinct identities across both collections.
    pub fn identity_count(&self) -> usize {
        self.accepted.len()
            + self
                .skipped
                .keys()
                .filter(|name| !self.accepted.contains_key(*name))
                .count()
    }

    /// Insert an accepted entry, evicting a skip for the same identity.
    pub fn accept(&mut self, entry: CatalogEntry) {
        self.skipped.remove(&entry.full_name);
        self.accepted.insert(entry.full_name.clone(), entry);
    }

    /// Insert a skip entry, evicting an accepted one for the same identity.
    pub fn skip(&mut self, entry: SkipEntry) {
        self.accepted.remove(&entry.full_name);
        self.skipped.insert(entry.full_name.clone(), entry);
    }

    /// Whether no identity is present in both collections.
    pub fn is_partitioned(&self) -> bool {
        self.accepted
            .keys()
            .all(|name| !self.skipped.contains_key(name))
    }

    /// Accepted entries ordered by ascending popularity, then identity.
    pub fn accepted_by_popularity(&self) -> Vec<&CatalogEntry> {
        let mut entries: Vec<&CatalogEntry> = self.accepted.values().collect();
        entries.sort_by_key(|entry| entry.stargazers_count);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn repo() -> RepoInfo {
        RepoInfo {
            full_name: "octo/flow".into(),
            name: "flow".into(),
            description: Some("A workflow".into()),
            html_url: "https://github.com/octo/flow".into(),
            clone_url: "https://github.com/octo/flow.git".into(),
            stargazers_count: 12,
            subscribers_count: Some(2),
            topics: vec!["bioinformatics".into()],
            updated_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    fn entry(name: &str, stars: u64) -> CatalogEntry {
        CatalogEntry {
            full_name: name.into(),
            last_update: 10,
            data_format: 2,
            stargazers_count: stars,
            description: None,
            html_url: String::new(),
            topics: vec![],
            latest_release: None,
            payload: Map::new(),
        }
    }

    #[test]
    fn test_from_repo_maps_fields() {
        let enrichment = EnrichmentResult::new()
            .with("linting", Value::Null)
            .with("formatting", "would reformat Snakefile");
        let entry = CatalogEntry::from_repo(&repo(), None, 1_700_000_000, 2, enrichment);

        assert_eq!(entry.full_name, "octo/flow");
        assert_eq!(entry.last_update, 1_700_000_000);
        assert_eq!(entry.stargazers_count, 12);
        assert_eq!(entry.latest_release, None);
        assert_eq!(entry.payload["formatting"], json!("would reformat Snakefile"));
    }

    #[test]
    fn test_from_repo_drops_reserved_payload_keys() {
        let enrichment = EnrichmentResult::new().with("last_update", 1);
        let entry = CatalogEntry::from_repo(&repo(), None, 99, 2, enrichment);
        assert_eq!(entry.last_update, 99);
        assert!(entry.payload.is_empty());
    }

    #[test]
    fn test_catalog_entry_payload_flattens() {
        let mut e = entry("octo/flow", 1);
        e.payload.insert("linting".into(), json!("missing log directive"));

        let value = serde_json::to_value(&e).unwrap();
        assert_eq!(value["linting"], json!("missing log directive"));

        let back: CatalogEntry = serde_json::from_value(value).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn test_skip_reason_is_optional_on_load() {
        let skip: SkipEntry = serde_json::from_value(json!({
            "full_name": "octo/old",
            "last_update": 5,
            "data_format": 1
        }))
        .unwrap();
        assert_eq!(skip.reason, None);
    }

    #[test]
    fn test_accept_and_skip_keep_partition() {
        let mut snapshot = Snapshot::new();
        snapshot.skip(SkipEntry::new("octo/flow", 1, 2, SkipReason::MissingEntryPoint));
        snapshot.accept(entry("octo/flow", 1));

        assert!(snapshot.is_partitioned());
        assert!(snapshot.skipped.is_empty());

        snapshot.skip(SkipEntry::new("octo/flow", 2, 2, SkipReason::TransferFailed));
        assert!(snapshot.is_partitioned());
        assert!(snapshot.accepted.is_empty());
    }

    #[test]
    fn test_accepted_by_popularity() {
        let snapshot = Snapshot::from_records(
            vec![entry("c/c", 5), entry("a/a", 1), entry("b/b", 5)],
            vec![],
        );
        let order: Vec<&str> = snapshot
            .accepted_by_popularity()
            .iter()
            .map(|e| e.full_name.as_str())
            .collect();
        assert_eq!(order, vec!["a/a", "b/b", "c/c"]);
    }

    #[test]
    fn test_identity_count_ignores_overlap() {
        let snapshot = Snapshot::from_records(
            vec![entry("a/a", 1)],
            vec![
                SkipEntry::new("a/a", 1, 2, SkipReason::Vanished),
                SkipEntry::new("b/b", 1, 2, SkipReason::Vanished),
            ],
        );
        assert_eq!(snapshot.identity_count(), 2);
    }
}
