// src/models/overrides.rs

//! Per-invocation overrides taken from the environment.

use crate::error::{AppError, Result};

/// Environment variable naming a single repository to process.
pub const TEST_REPO_VAR: &str = "TEST_REPO";

/// Environment variable with the percentage offset into the candidate space.
pub const OFFSET_VAR: &str = "OFFSET";

/// Overrides read once at startup and carried in the run context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOverrides {
    /// Process exactly this identity instead of searching
    pub test_repo: Option<String>,

    /// Start the scan this many percent into the candidate space
    pub offset_percent: u8,
}

impl RunOverrides {
    /// Read overrides from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let test_repo = lookup(TEST_REPO_VAR)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let offset_percent = match lookup(OFFSET_VAR) {
            Some(raw) if !raw.trim().is_empty() => {
                let value: u8 = raw.trim().parse().map_err(|_| {
                    AppError::config(format!("{OFFSET_VAR} must be an integer, got '{raw}'"))
                })?;
                if value > 100 {
                    return Err(AppError::config(format!(
                        "{OFFSET_VAR} must be a percentage in 0..=100, got {value}"
                    )));
                }
                value
            }
            _ => 0,
        };

        Ok(Self {
            test_repo,
            offset_percent,
        })
    }

    /// Translate the percentage into an index into `len` candidates.
    pub fn offset_index(&self, len: usize) -> usize {
        len * usize::from(self.offset_percent) / 100
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let overrides = RunOverrides::from_lookup(lookup(&[])).unwrap();
        assert_eq!(overrides, RunOverrides::default());
    }

    #[test]
    fn test_reads_both_variables() {
        let overrides =
            RunOverrides::from_lookup(lookup(&[("TEST_REPO", "octo/flow"), ("OFFSET", "30")]))
                .unwrap();
        assert_eq!(overrides.test_repo.as_deref(), Some("octo/flow"));
        assert_eq!(overrides.offset_percent, 30);
        assert_eq!(overrides.offset_index(200), 60);
    }

    #[test]
    fn test_rejects_malformed_offset() {
        assert!(RunOverrides::from_lookup(lookup(&[("OFFSET", "ten")])).is_err());
        assert!(RunOverrides::from_lookup(lookup(&[("OFFSET", "150")])).is_err());
    }
}
