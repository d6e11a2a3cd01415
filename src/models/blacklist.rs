// src/models/blacklist.rs

//! Identities that must never enter the catalog.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::{AppError, Result};

/// Set of blacklisted repository identities.
#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    names: HashSet<String>,
}

impl Blacklist {
    /// Parse one identity per line; blank lines and `#` comments are ignored.
    pub fn parse(content: &str) -> Self {
        let names = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();
        Self { names }
    }

    /// Load the blacklist, treating a missing file as empty.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        match fs::read_to_string(path.as_ref()) {
            Ok(content) => Ok(Self::parse(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No blacklist at {:?}", path.as_ref());
                Ok(Self::default())
            }
            Err(e) => Err(AppError::Io(e)),
        }
    }

    pub fn contains(&self, full_name: &str) -> bool {
        self.names.contains(full_name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for Blacklist {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ignores_comments_and_blanks() {
        let blacklist = Blacklist::parse("# spam\nocto/spam\n\n  octo/fork  \n");
        assert_eq!(blacklist.len(), 2);
        assert!(blacklist.contains("octo/spam"));
        assert!(blacklist.contains("octo/fork"));
        assert!(!blacklist.contains("# spam"));
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let tmp = tempfile::TempDir::new().unwrap();
        let blacklist = Blacklist::load(tmp.path().join("blacklist.txt")).unwrap();
        assert!(blacklist.is_empty());
    }
}
