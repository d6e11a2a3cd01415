//! Diff calculation between catalog snapshots.
//!
//! Identifies added, updated and removed catalog entries for the run
//! summary.

use serde::{Deserialize, Serialize};

use crate::models::Snapshot;

/// Identities that changed between two accepted catalogs, each sorted.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Diff {
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
}

impl Diff {
    /// Check if there are any changes.
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.updated.is_empty() || !self.removed.is_empty()
    }
}

/// Calculate the diff between the accepted collections of two snapshots.
///
/// An entry counts as updated when its freshness or schema version changed.
pub fn calculate_diff(previous: &Snapshot, current: &Snapshot) -> Diff {
    // BTreeMap iteration keeps every list sorted.
    let added = current
        .accepted
        .keys()
        .filter(|name| !previous.accepted.contains_key(*name))
        .cloned()
        .collect();

    let removed = previous
        .accepted
        .keys()
        .filter(|name| !current.accepted.contains_key(*name))
        .cloned()
        .collect();

    let updated = current
        .accepted
        .iter()
        .filter(|(name, curr)| {
            previous.accepted.get(*name).is_some_and(|prev| {
                prev.last_update != curr.last_update || prev.data_format != curr.data_format
            })
        })
        .map(|(name, _)| name.clone())
        .collect();

    Diff {
        added,
        updated,
        removed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CatalogEntry;
    use serde_json::Map;

    fn make_entry(name: &str, ts: i64) -> CatalogEntry {
        CatalogEntry {
            full_name: name.to_string(),
            last_update: ts,
            data_format: 2,
            stargazers_count: 0,
            description: None,
            html_url: format!("https://github.com/{}", name),
            topics: vec![],
            latest_release: None,
            payload: Map::new(),
        }
    }

    fn snapshot(entries: &[(&str, i64)]) -> Snapshot {
        Snapshot::from_records(
            entries.iter().map(|(name, ts)| make_entry(name, *ts)),
            Vec::new(),
        )
    }

    #[test]
    fn test_no_changes() {
        let prev = snapshot(&[("octo/a", 1), ("octo/b", 2)]);
        let result = calculate_diff(&prev, &prev.clone());
        assert!(!result.has_changes());
    }

    #[test]
    fn test_additions() {
        let prev = snapshot(&[("octo/a", 1)]);
        let curr = snapshot(&[("octo/a", 1), ("octo/c", 3), ("octo/b", 2)]);

        let result = calculate_diff(&prev, &curr);
        assert_eq!(result.added, vec!["octo/b", "octo/c"]);
    }

    #[test]
    fn test_mixed_changes() {
        let prev = snapshot(&[("octo/keep", 1), ("octo/update", 1), ("octo/remove", 1)]);
        let curr = snapshot(&[("octo/keep", 1), ("octo/update", 9), ("octo/new", 1)]);

        let result = calculate_diff(&prev, &curr);
        assert_eq!(result.added, vec!["octo/new"]);
        assert_eq!(result.updated, vec!["octo/update"]);
        assert_eq!(result.removed, vec!["octo/remove"]);
    }

    #[test]
    fn test_schema_change_is_update() {
        let prev = snapshot(&[("octo/a", 1)]);
        let mut curr = prev.clone();
        if let Some(entry) = curr.accepted.get_mut("octo/a") {
            entry.data_format = 3;
        }

        let result = calculate_diff(&prev, &curr);
        assert_eq!(result.updated, vec!["octo/a"]);
        assert!(result.added.is_empty());
    }

    #[test]
    fn test_full_to_empty() {
        let prev = snapshot(&[("octo/a", 1)]);
        let result = calculate_diff(&prev, &Snapshot::new());
        assert!(result.added.is_empty());
        assert_eq!(result.removed, vec!["octo/a"]);
    }
}
