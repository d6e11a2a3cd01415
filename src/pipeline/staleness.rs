// src/pipeline/staleness.rs

//! Cache validity of previously processed repositories.

use crate::models::Snapshot;

/// What to do with a candidate given the previous snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    /// The accepted entry is current; copy it verbatim.
    ReuseAccepted,
    /// The skip entry is current; copy it verbatim.
    ReuseSkipped,
    /// Anything changed, or the identity is unknown.
    Reprocess,
}

impl Staleness {
    pub fn is_reuse(self) -> bool {
        !matches!(self, Staleness::Reprocess)
    }
}

/// Classify a candidate by exact freshness and schema version match.
///
/// Any difference, including an older freshness marker, forces
/// reprocessing. The accepted collection is consulted first.
pub fn classify(
    full_name: &str,
    freshness: i64,
    previous: &Snapshot,
    data_format: u32,
) -> Staleness {
    if let Some(entry) = previous.accepted.get(full_name) {
        if entry.data_format == data_format && entry.last_update == freshness {
            return Staleness::ReuseAccepted;
        }
    }
    if let Some(entry) = previous.skipped.get(full_name) {
        if entry.data_format == data_format && entry.last_update == freshness {
            return Staleness::ReuseSkipped;
        }
    }
    Staleness::Reprocess
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CatalogEntry, SkipEntry, SkipReason};
    use serde_json::Map;

    fn accepted(name: &str, ts: i64, format: u32) -> CatalogEntry {
        CatalogEntry {
            full_name: name.into(),
            last_update: ts,
            data_format: format,
            stargazers_count: 0,
            description: None,
            html_url: String::new(),
            topics: vec![],
            latest_release: None,
            payload: Map::new(),
        }
    }

    fn previous() -> Snapshot {
        Snapshot::from_records(
            vec![accepted("octo/a", 10, 2)],
            vec![SkipEntry::new("octo/s", 30, 2, SkipReason::MissingEntryPoint)],
        )
    }

    #[test]
    fn test_exact_match_reuses() {
        let prev = previous();
        assert_eq!(classify("octo/a", 10, &prev, 2), Staleness::ReuseAccepted);
        assert_eq!(classify("octo/s", 30, &prev, 2), Staleness::ReuseSkipped);
    }

    #[test]
    fn test_any_freshness_change_reprocesses() {
        let prev = previous();
        assert_eq!(classify("octo/a", 20, &prev, 2), Staleness::Reprocess);
        assert_eq!(classify("octo/a", 5, &prev, 2), Staleness::Reprocess);
        assert_eq!(classify("octo/s", 31, &prev, 2), Staleness::Reprocess);
    }

    #[test]
    fn test_schema_change_reprocesses() {
        let prev = previous();
        assert_eq!(classify("octo/a", 10, &prev, 3), Staleness::Reprocess);
        assert_eq!(classify("octo/s", 30, &prev, 1), Staleness::Reprocess);
    }

    #[test]
    fn test_unknown_identity_reprocesses() {
        assert_eq!(classify("octo/new", 10, &previous(), 2), Staleness::Reprocess);
        assert!(!Staleness::Reprocess.is_reuse());
        assert!(Staleness::ReuseSkipped.is_reuse());
    }
}
