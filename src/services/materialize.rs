// src/services/materialize.rs

//! Local copies of repositories for analysis.
//!
//! A release archive is preferred over the live branch: it is immutable and
//! matches what the freshness marker was computed from. Without a usable
//! release the default branch is shallow-cloned.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::Client;
use tokio::process::Command;

use crate::error::{AppError, Result};
use crate::models::{Release, RepoInfo};
use crate::services::Materializer;
use crate::utils::http::check_response;

/// Materializes repositories from release archives or `git clone`.
pub struct GitMaterializer {
    client: Client,
}

impl GitMaterializer {
    /// `client` must carry the API credentials; archive downloads count
    /// against the same quota.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Download and unpack a release zipball below `target`.
    async fn extract_release(&self, repo: &RepoInfo, url: &str, target: &Path) -> Result<PathBuf> {
        let response = self.client.get(url).send().await?;
        let response = check_response(response, &repo.full_name).await?;
        let bytes = response.bytes().await?;

        let dest = target.join("release");
        let extract_to = dest.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
            archive.extract(&extract_to)?;
            Ok(())
        })
        .await
        .map_err(|e| AppError::transfer(&repo.full_name, e))??;

        single_top_level_dir(&dest).await
    }

    /// Shallow clone of the default branch into `target/clone`.
    async fn clone_head(&self, repo: &RepoInfo, target: &Path) -> Result<PathBuf> {
        let dest = target.join("clone");
        let output = Command::new("git")
            .args(["clone", "--depth", "1", "--filter=blob:limit=1m", "--quiet"])
            .arg(&repo.clone_url)
            .arg(&dest)
            .env("GIT_LFS_SKIP_SMUDGE", "1")
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .await
            .map_err(|e| AppError::transfer(&repo.full_name, format!("failed to run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::transfer(
                &repo.full_name,
                format!("git clone failed: {}", stderr.trim()),
            ));
        }
        Ok(dest)
    }
}

#[async_trait]
impl Materializer for GitMaterializer {
    async fn materialize(
        &self,
        repo: &RepoInfo,
        release: Option<&Release>,
        target: &Path,
    ) -> Result<PathBuf> {
        if let Some(release) = release {
            if let Some(url) = release.zipball_url.as_deref() {
                match self.extract_release(repo, url, target).await {
                    Ok(root) => {
                        log::debug!("Extracted {} at {}", repo.full_name, release.tag_name);
                        return Ok(root);
                    }
                    Err(e @ AppError::Throttled { .. }) => return Err(e),
                    Err(e) => log::warn!(
                        "Release archive of {} unusable ({}), cloning instead",
                        repo.full_name,
                        e
                    ),
                }
            }
        }
        self.clone_head(repo, target).await
    }
}

/// Archives wrap the tree in one `owner-name-sha/` directory; unwrap it.
async fn single_top_level_dir(dest: &Path) -> Result<PathBuf> {
    let mut entries = tokio::fs::read_dir(dest).await?;
    let mut dirs = Vec::new();
    let mut others = 0usize;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            dirs.push(entry.path());
        } else {
            others += 1;
        }
    }

    if dirs.len() == 1 && others == 0 {
        Ok(dirs.remove(0))
    } else {
        Ok(dest.to_path_buf())
    }
}
