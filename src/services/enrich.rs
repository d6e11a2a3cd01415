// src/services/enrich.rs

//! Lint and format checks run inside a materialized repository.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use crate::error::{AppError, Result};
use crate::models::{EnrichmentConfig, EnrichmentResult, StructureConfig};
use crate::services::{Enricher, MaterializedItem};
use crate::utils::repo_path;

/// Enricher that shells out to the configured lint and format tools.
///
/// A failing tool is a finding, not an error: its output is recorded in
/// the payload (`null` when the check passes).
pub struct CommandEnricher {
    config: EnrichmentConfig,
    structure: StructureConfig,
}

impl CommandEnricher {
    pub fn new(config: EnrichmentConfig, structure: StructureConfig) -> Self {
        Self { config, structure }
    }

    /// Run `argv` (plus `extra` arguments) in `cwd`; `null` means the check passed.
    async fn run_check(&self, argv: &[String], extra: &[PathBuf], cwd: &Path) -> Result<Value> {
        let Some((program, args)) = argv.split_first() else {
            return Ok(Value::Null);
        };

        let output = Command::new(program)
            .args(args)
            .args(extra)
            .current_dir(cwd)
            .output()
            .await
            .map_err(|e| AppError::config(format!("Cannot run '{program}': {e}")))?;

        if output.status.success() {
            return Ok(Value::Null);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let text = if stderr.trim().is_empty() {
            String::from_utf8_lossy(&output.stdout).into_owned()
        } else {
            stderr.into_owned()
        };
        Ok(Value::String(text.trim().to_string()))
    }

    /// Files handed to the format command, relative to the repository root.
    ///
    /// Configured targets that do not exist in the item are left out.
    async fn module_files(&self, item: &MaterializedItem) -> Result<Vec<PathBuf>> {
        if !self.config.format_targets.is_empty() {
            let mut files = Vec::new();
            for target in &self.config.format_targets {
                let path = repo_path(&item.base_dir, target);
                if tokio::fs::try_exists(item.root.join(&path)).await? {
                    files.push(PathBuf::from(path));
                }
            }
            return Ok(files);
        }

        let mut files = vec![PathBuf::from(repo_path(
            &item.base_dir,
            &self.structure.entry_point,
        ))];

        let module_dir = repo_path(&item.base_dir, &self.structure.module_dir);
        let mut modules = Vec::new();
        match tokio::fs::read_dir(item.root.join(&module_dir)).await {
            Ok(mut entries) => {
                while let Some(entry) = entries.next_entry().await? {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    if name.ends_with(&self.structure.module_suffix) {
                        modules.push(Path::new(&module_dir).join(name));
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(AppError::Io(e)),
        }
        modules.sort();
        files.extend(modules);
        Ok(files)
    }

    /// Parse the per-repository settings file, if configured and present.
    ///
    /// Unparsable settings count as absent; they never block acceptance.
    async fn read_settings(&self, item: &MaterializedItem) -> Value {
        let Some(relative) = self.config.settings_file.as_deref() else {
            return Value::Null;
        };

        let content = match tokio::fs::read_to_string(item.root.join(relative)).await {
            Ok(content) => content,
            Err(_) => return Value::Null,
        };

        let parsed = serde_yaml::from_str::<serde_yaml::Value>(&content)
            .map_err(|e| e.to_string())
            .and_then(|yaml| serde_json::to_value(yaml).map_err(|e| e.to_string()));
        match parsed {
            Ok(value) => value,
            Err(e) => {
                log::warn!(
                    "Ignoring malformed {} of {}: {}",
                    relative,
                    item.full_name,
                    e
                );
                Value::Null
            }
        }
    }
}

#[async_trait]
impl Enricher for CommandEnricher {
    async fn enrich(&self, item: &MaterializedItem) -> Result<EnrichmentResult> {
        let linting = self
            .run_check(&self.config.lint_command, &[], &item.root)
            .await?;

        let files = self.module_files(item).await?;
        let formatting = self
            .run_check(&self.config.format_command, &files, &item.root)
            .await?;

        let settings = self.read_settings(item).await;

        Ok(EnrichmentResult::new()
            .with("linting", linting)
            .with("formatting", formatting)
            .with("settings", settings))
    }
}
