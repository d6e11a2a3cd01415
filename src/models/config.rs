//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Search feed settings
    #[serde(default)]
    pub search: SearchConfig,

    /// GitHub API client settings
    #[serde(default)]
    pub github: GithubConfig,

    /// Rate limits, delays and checkpointing
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Required repository layout
    #[serde(default)]
    pub structure: StructureConfig,

    /// External analysis commands
    #[serde(default)]
    pub enrichment: EnrichmentConfig,

    /// Catalog schema and scan behavior
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Snapshot and blacklist locations
    #[serde(default)]
    pub paths: PathsConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.search.query.trim().is_empty() {
            return Err(AppError::validation("search.query is empty"));
        }
        if self.search.page_size == 0 || self.search.page_size > 100 {
            return Err(AppError::validation("search.page_size must be in 1..=100"));
        }
        if self.search.max_results == 0 {
            return Err(AppError::validation("search.max_results must be > 0"));
        }
        if self.github.user_agent.trim().is_empty() {
            return Err(AppError::validation("github.user_agent is empty"));
        }
        if self.github.timeout_secs == 0 {
            return Err(AppError::validation("github.timeout_secs must be > 0"));
        }
        if self.limits.calls_per_window == 0 {
            return Err(AppError::validation("limits.calls_per_window must be > 0"));
        }
        if self.limits.window_secs == 0 {
            return Err(AppError::validation("limits.window_secs must be > 0"));
        }
        if self.structure.entry_point.trim().is_empty() {
            return Err(AppError::validation("structure.entry_point is empty"));
        }
        if self.structure.base_dirs.is_empty() {
            return Err(AppError::validation("structure.base_dirs is empty"));
        }
        if self.catalog.max_drop_percent > 100 {
            return Err(AppError::validation("catalog.max_drop_percent must be in 0..=100"));
        }
        Ok(())
    }
}

/// Search feed settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Repository search query
    #[serde(default = "defaults::query")]
    pub query: String,

    /// Sort key of the feed; early stop relies on "updated"
    #[serde(default = "defaults::sort")]
    pub sort: String,

    /// Number of results the search API exposes at most
    #[serde(default = "defaults::max_results")]
    pub max_results: usize,

    /// Results per page
    #[serde(default = "defaults::page_size")]
    pub page_size: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            query: defaults::query(),
            sort: defaults::sort(),
            max_results: defaults::max_results(),
            page_size: defaults::page_size(),
        }
    }
}

/// GitHub API client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    /// REST API base URL
    #[serde(default = "defaults::api_url")]
    pub api_url: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Environment variable holding the API token
    #[serde(default = "defaults::token_env")]
    pub token_env: String,
}

impl GithubConfig {
    /// Read the API token from the configured environment variable.
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .filter(|token| !token.trim().is_empty())
    }
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: defaults::api_url(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            token_env: defaults::token_env(),
        }
    }
}

/// Rate limits, delays and checkpointing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Calls issued at most per rolling window
    #[serde(default = "defaults::calls_per_window")]
    pub calls_per_window: usize,

    /// Length of the rolling window in seconds
    #[serde(default = "defaults::window_secs")]
    pub window_secs: u64,

    /// Added to the reported reset time before retrying
    #[serde(default = "defaults::safety_margin_secs")]
    pub safety_margin_secs: u64,

    /// Pause before the structural lookups of a reprocessed candidate
    #[serde(default = "defaults::lookup_delay_secs")]
    pub lookup_delay_secs: u64,

    /// Pause between existence checks of the back-fill pass
    #[serde(default = "defaults::existence_check_delay_secs")]
    pub existence_check_delay_secs: u64,

    /// Write a checkpoint after this many accepted items (0 disables)
    #[serde(default = "defaults::checkpoint_every")]
    pub checkpoint_every: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            calls_per_window: defaults::calls_per_window(),
            window_secs: defaults::window_secs(),
            safety_margin_secs: defaults::safety_margin_secs(),
            lookup_delay_secs: defaults::lookup_delay_secs(),
            existence_check_delay_secs: defaults::existence_check_delay_secs(),
            checkpoint_every: defaults::checkpoint_every(),
        }
    }
}

/// Layout a repository must have to be cataloged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureConfig {
    /// Candidate base directories, probed in order
    #[serde(default = "defaults::base_dirs")]
    pub base_dirs: Vec<String>,

    /// Required entry point file, relative to the base directory
    #[serde(default = "defaults::entry_point")]
    pub entry_point: String,

    /// Optional module directory, relative to the base directory
    #[serde(default = "defaults::module_dir")]
    pub module_dir: String,

    /// Suffix every module file must carry
    #[serde(default = "defaults::module_suffix")]
    pub module_suffix: String,
}

impl Default for StructureConfig {
    fn default() -> Self {
        Self {
            base_dirs: defaults::base_dirs(),
            entry_point: defaults::entry_point(),
            module_dir: defaults::module_dir(),
            module_suffix: defaults::module_suffix(),
        }
    }
}

/// External analysis commands run inside a materialized repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Lint command (argv); its failure output is recorded
    #[serde(default = "defaults::lint_command")]
    pub lint_command: Vec<String>,

    /// Format check command (argv); module files are appended
    #[serde(default = "defaults::format_command")]
    pub format_command: Vec<String>,

    /// Files handed to the format command, relative to the base directory.
    /// Empty means the entry point plus every module file.
    #[serde(default)]
    pub format_targets: Vec<String>,

    /// Per-item settings file, relative to the repository root
    #[serde(default = "defaults::settings_file")]
    pub settings_file: Option<String>,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            lint_command: defaults::lint_command(),
            format_command: defaults::format_command(),
            format_targets: Vec::new(),
            settings_file: defaults::settings_file(),
        }
    }
}

/// Catalog schema and scan behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Schema version stamped on every entry
    #[serde(default = "defaults::data_format")]
    pub data_format: u32,

    /// Stop the active scan at the first unchanged candidate
    #[serde(default = "defaults::early_stop")]
    pub early_stop: bool,

    /// Largest tolerated drop of accepted entries, in percent
    #[serde(default = "defaults::max_drop_percent")]
    pub max_drop_percent: u8,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            data_format: defaults::data_format(),
            early_stop: defaults::early_stop(),
            max_drop_percent: defaults::max_drop_percent(),
        }
    }
}

/// Snapshot and blacklist locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Accepted catalog (header line followed by JSON)
    #[serde(default = "defaults::data_file")]
    pub data_file: PathBuf,

    /// Skip list (JSON object keyed by identity)
    #[serde(default = "defaults::skips_file")]
    pub skips_file: PathBuf,

    /// Blacklisted identities, one per line
    #[serde(default = "defaults::blacklist_file")]
    pub blacklist_file: PathBuf,

    /// First line of the data file
    #[serde(default = "defaults::data_header")]
    pub data_header: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_file: defaults::data_file(),
            skips_file: defaults::skips_file(),
            blacklist_file: defaults::blacklist_file(),
            data_header: defaults::data_header(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Search defaults
    pub fn query() -> String {
        "snakemake workflow in:readme archived:false".into()
    }
    pub fn sort() -> String {
        "updated".into()
    }
    pub fn max_results() -> usize {
        1000
    }
    pub fn page_size() -> usize {
        100
    }

    // GitHub defaults
    pub fn api_url() -> String {
        "https://api.github.com".into()
    }
    pub fn user_agent() -> String {
        "catalog-sync/0.1".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn token_env() -> String {
        "GITHUB_TOKEN".into()
    }

    // Limit defaults
    pub fn calls_per_window() -> usize {
        990
    }
    pub fn window_secs() -> u64 {
        3600
    }
    pub fn safety_margin_secs() -> u64 {
        5
    }
    pub fn lookup_delay_secs() -> u64 {
        60
    }
    pub fn existence_check_delay_secs() -> u64 {
        5
    }
    pub fn checkpoint_every() -> usize {
        20
    }

    // Structure defaults
    pub fn base_dirs() -> Vec<String> {
        vec!["workflow/".into(), "".into()]
    }
    pub fn entry_point() -> String {
        "Snakefile".into()
    }
    pub fn module_dir() -> String {
        "rules".into()
    }
    pub fn module_suffix() -> String {
        ".smk".into()
    }

    // Enrichment defaults
    pub fn lint_command() -> Vec<String> {
        vec!["snakemake".into(), "--lint".into()]
    }
    pub fn format_command() -> Vec<String> {
        vec!["snakefmt".into(), "--check".into()]
    }
    pub fn settings_file() -> Option<String> {
        Some("config/config.yaml".into())
    }

    // Catalog defaults
    pub fn data_format() -> u32 {
        2
    }
    pub fn early_stop() -> bool {
        true
    }
    pub fn max_drop_percent() -> u8 {
        50
    }

    // Path defaults
    pub fn data_file() -> PathBuf {
        PathBuf::from("data.js")
    }
    pub fn skips_file() -> PathBuf {
        PathBuf::from("skips.json")
    }
    pub fn blacklist_file() -> PathBuf {
        PathBuf::from("blacklist.txt")
    }
    pub fn data_header() -> String {
        "var data =".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [search]
            query = "topic:pipeline"

            [limits]
            checkpoint_every = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.search.query, "topic:pipeline");
        assert_eq!(config.search.max_results, 1000);
        assert_eq!(config.limits.checkpoint_every, 5);
        assert_eq!(config.limits.calls_per_window, 990);
        assert_eq!(config.structure.entry_point, "Snakefile");
    }

    #[test]
    fn test_validate_rejects_bad_page_size() {
        let mut config = Config::default();
        config.search.page_size = 0;
        assert!(config.validate().is_err());
        config.search.page_size = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_query() {
        let mut config = Config::default();
        config.search.query = "  ".into();
        assert!(matches!(config.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_catalog_and_enrichment_keys() {
        let config: Config = toml::from_str(
            r#"
            [catalog]
            max_drop_percent = 20

            [enrichment]
            format_targets = ["Snakefile", "rules/common.smk"]
            "#,
        )
        .unwrap();

        assert_eq!(config.catalog.max_drop_percent, 20);
        assert!(config.catalog.early_stop);
        assert_eq!(config.enrichment.format_targets, ["Snakefile", "rules/common.smk"]);
        assert_eq!(Config::default().catalog.max_drop_percent, 50);
        assert!(Config::default().enrichment.format_targets.is_empty());
    }

    #[test]
    fn test_validate_rejects_drop_over_hundred() {
        let mut config = Config::default();
        config.catalog.max_drop_percent = 101;
        assert!(matches!(config.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = Config::load_or_default("/definitely/not/here.toml");
        assert_eq!(config.catalog.data_format, 2);
    }
}
