//! Local filesystem storage implementation.
//!
//! ## Storage Layout
//!
//! ```text
//! {data_file}    # "var data =" followed by the catalog JSON array
//! {skips_file}   # {"owner/name": {...}, ...}
//! {data_file}.checkpoint
//! {skips_file}.checkpoint    # staged mid-run, removed after the final store
//! ```
//!
//! All files are written atomically (temp file, then rename), so an
//! interrupted run leaves the previous snapshot intact.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{CatalogEntry, PathsConfig, SkipEntry, Snapshot};
use crate::storage::{SnapshotStorage, WriteMetadata};

/// Skip lists are written as a map; older ones were plain lists.
#[derive(Deserialize)]
#[serde(untagged)]
enum SkipFile {
    Map(BTreeMap<String, SkipEntry>),
    List(Vec<SkipEntry>),
}

impl SkipFile {
    fn into_entries(self) -> Vec<SkipEntry> {
        match self {
            SkipFile::Map(map) => map.into_values().collect(),
            SkipFile::List(list) => list,
        }
    }
}

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    data_file: PathBuf,
    skips_file: PathBuf,
    header: String,
}

impl LocalStorage {
    /// Create a LocalStorage writing to the given files.
    pub fn new(
        data_file: impl Into<PathBuf>,
        skips_file: impl Into<PathBuf>,
        header: impl Into<String>,
    ) -> Self {
        Self {
            data_file: data_file.into(),
            skips_file: skips_file.into(),
            header: header.into(),
        }
    }

    /// Create a LocalStorage from the configured paths, relative to `root`.
    pub fn from_config(root: &Path, paths: &PathsConfig) -> Self {
        Self::new(
            root.join(&paths.data_file),
            root.join(&paths.skips_file),
            paths.data_header.clone(),
        )
    }

    /// Staging location next to `path`.
    fn checkpoint_path(path: &Path) -> PathBuf {
        let mut staged = path.as_os_str().to_owned();
        staged.push(".checkpoint");
        PathBuf::from(staged)
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
        Self::ensure_dir(path).await?;

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Remove a file; a missing one is fine.
    async fn remove_file(path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Read a file, returning None if it doesn't exist.
    async fn read_string(path: &Path) -> Result<Option<String>> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Parse the data file: the first line is the header, the rest JSON.
    fn parse_data(&self, content: &str) -> Result<Vec<CatalogEntry>> {
        let body = match content.split_once('\n') {
            Some((_header, body)) => body,
            None => "",
        };
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(body)?)
    }

    fn render_data(&self, snapshot: &Snapshot) -> Result<String> {
        let entries = snapshot.accepted_by_popularity();
        let json = serde_json::to_string_pretty(&entries)?;
        Ok(format!("{}\n{}\n", self.header, json))
    }

    fn render_skips(snapshot: &Snapshot) -> Result<String> {
        // Going through Value sorts the keys of every object.
        let value = serde_json::to_value(&snapshot.skipped)?;
        let json = serde_json::to_string_pretty(&value)?;
        Ok(format!("{json}\n"))
    }

    async fn write_snapshot(
        &self,
        data_file: &Path,
        skips_file: &Path,
        snapshot: &Snapshot,
    ) -> Result<WriteMetadata> {
        let data = self.render_data(snapshot)?;
        let skips = Self::render_skips(snapshot)?;

        Self::write_bytes(data_file, data.as_bytes()).await?;
        Self::write_bytes(skips_file, skips.as_bytes()).await?;

        log::info!(
            "Stored {} accepted entries to {} and {} skips to {}",
            snapshot.accepted.len(),
            data_file.display(),
            snapshot.skipped.len(),
            skips_file.display()
        );

        Ok(WriteMetadata {
            accepted_count: snapshot.accepted.len(),
            skipped_count: snapshot.skipped.len(),
            timestamp: Utc::now(),
        })
    }
}

#[async_trait]
impl SnapshotStorage for LocalStorage {
    async fn load(&self) -> Result<Snapshot> {
        let accepted = match Self::read_string(&self.data_file).await? {
            Some(content) => self.parse_data(&content)?,
            None => {
                log::warn!("No catalog found at {}", self.data_file.display());
                Vec::new()
            }
        };

        let skipped = match Self::read_string(&self.skips_file).await? {
            Some(content) if !content.trim().is_empty() => {
                serde_json::from_str::<SkipFile>(&content)?.into_entries()
            }
            _ => {
                log::warn!("No skip list found at {}", self.skips_file.display());
                Vec::new()
            }
        };

        let snapshot = Snapshot::from_records(accepted, skipped);
        log::info!(
            "Loaded snapshot: {} accepted, {} skipped",
            snapshot.accepted.len(),
            snapshot.skipped.len()
        );
        Ok(snapshot)
    }

    async fn store(&self, snapshot: &Snapshot) -> Result<WriteMetadata> {
        self.write_snapshot(&self.data_file, &self.skips_file, snapshot).await
    }

    async fn store_checkpoint(&self, snapshot: &Snapshot) -> Result<WriteMetadata> {
        let data_file = Self::checkpoint_path(&self.data_file);
        let skips_file = Self::checkpoint_path(&self.skips_file);
        self.write_snapshot(&data_file, &skips_file, snapshot).await
    }

    async fn clear_checkpoint(&self) -> Result<()> {
        Self::remove_file(&Self::checkpoint_path(&self.data_file)).await?;
        Self::remove_file(&Self::checkpoint_path(&self.skips_file)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SkipReason;
    use serde_json::{Map, json};
    use tempfile::TempDir;

    fn storage(tmp: &TempDir) -> LocalStorage {
        LocalStorage::new(
            tmp.path().join("data.js"),
            tmp.path().join("skips.json"),
            "var data =",
        )
    }

    fn entry(name: &str, stars: u64) -> CatalogEntry {
        let mut payload = Map::new();
        payload.insert("linting".into(), json!(null));
        CatalogEntry {
            full_name: name.into(),
            last_update: 100,
            data_format: 2,
            stargazers_count: stars,
            description: Some("desc".into()),
            html_url: format!("https://github.com/{name}"),
            topics: vec![],
            latest_release: Some("v1".into()),
            payload,
        }
    }

    fn snapshot() -> Snapshot {
        Snapshot::from_records(
            vec![entry("octo/b", 7), entry("octo/a", 3)],
            vec![SkipEntry::new("octo/z", 50, 2, SkipReason::MissingEntryPoint)],
        )
    }

    #[tokio::test]
    async fn test_load_missing_files_is_empty() {
        let tmp = TempDir::new().unwrap();
        let loaded = storage(&tmp).load().await.unwrap();
        assert_eq!(loaded, Snapshot::new());
    }

    #[tokio::test]
    async fn test_store_and_load() {
        let tmp = TempDir::new().unwrap();
        let storage = storage(&tmp);

        let meta = storage.store(&snapshot()).await.unwrap();
        assert_eq!(meta.accepted_count, 2);
        assert_eq!(meta.skipped_count, 1);

        let loaded = storage.load().await.unwrap();
        assert_eq!(loaded, snapshot());
    }

    #[tokio::test]
    async fn test_data_file_layout() {
        let tmp = TempDir::new().unwrap();
        storage(&tmp).store(&snapshot()).await.unwrap();

        let content = std::fs::read_to_string(tmp.path().join("data.js")).unwrap();
        let (header, body) = content.split_once('\n').unwrap();
        assert_eq!(header, "var data =");

        let value: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(value[0]["full_name"], "octo/a");
        assert_eq!(value[1]["full_name"], "octo/b");
        assert!(!tmp.path().join("data.tmp").exists());
    }

    #[tokio::test]
    async fn test_store_is_deterministic() {
        let tmp = TempDir::new().unwrap();
        let storage = storage(&tmp);

        storage.store(&snapshot()).await.unwrap();
        let first = std::fs::read(tmp.path().join("skips.json")).unwrap();
        let reloaded = storage.load().await.unwrap();
        storage.store(&reloaded).await.unwrap();
        let second = std::fs::read(tmp.path().join("skips.json")).unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_checkpoint_is_staged_separately() {
        let tmp = TempDir::new().unwrap();
        let storage = storage(&tmp);
        storage.store(&snapshot()).await.unwrap();
        let before = std::fs::read(tmp.path().join("data.js")).unwrap();

        let meta = storage.store_checkpoint(&Snapshot::new()).await.unwrap();
        assert_eq!(meta.accepted_count, 0);
        assert_eq!(std::fs::read(tmp.path().join("data.js")).unwrap(), before);
        assert!(tmp.path().join("data.js.checkpoint").exists());
        assert!(tmp.path().join("skips.json.checkpoint").exists());
        assert_eq!(storage.load().await.unwrap(), snapshot());

        storage.clear_checkpoint().await.unwrap();
        assert!(!tmp.path().join("data.js.checkpoint").exists());
        assert!(!tmp.path().join("skips.json.checkpoint").exists());
        storage.clear_checkpoint().await.unwrap();
    }

    #[tokio::test]
    async fn test_load_legacy_skip_list() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("skips.json"),
            r#"[{"full_name": "octo/z", "last_update": 5, "data_format": 1}]"#,
        )
        .unwrap();

        let loaded = storage(&tmp).load().await.unwrap();
        assert_eq!(loaded.skipped["octo/z"].last_update, 5);
        assert_eq!(loaded.skipped["octo/z"].reason, None);
    }

    #[tokio::test]
    async fn test_load_corrupt_catalog_fails() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("data.js"), "var data =\n[{\"full_name\": ").unwrap();
        assert!(storage(&tmp).load().await.is_err());
    }
}
