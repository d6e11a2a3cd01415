//! Catalog Sync CLI
//!
//! Local execution entry point.

use std::path::{Path, PathBuf};

use catalog_sync::{
    error::Result,
    models::{Blacklist, Config, RunOverrides},
    pipeline::{self, RateLimitedCaller, SyncContext},
    services::{CommandEnricher, GitMaterializer, GithubSource},
    storage::{LocalStorage, SnapshotStorage},
};
use clap::{Parser, Subcommand};

/// catalog-sync - Incremental repository catalog
#[derive(Parser, Debug)]
#[command(
    name = "catalog-sync",
    version,
    about = "Incrementally builds a catalog of repositories matching a search query"
)]
struct Cli {
    /// Path to the configuration file; paths in it are relative to its directory
    #[arg(short, long, default_value = "catalog.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconcile the search results with the stored catalog
    Generate,

    /// Remove stored entries whose repositories were deleted or moved
    Cleanup,

    /// Validate the configuration file
    Validate,

    /// Show stored catalog info
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    log::info!("catalog-sync starting...");

    let config = Config::load_or_default(&cli.config);
    let root = cli
        .config
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let storage = LocalStorage::from_config(&root, &config.paths);

    match cli.command {
        Command::Generate | Command::Cleanup => {
            config.validate()?;
            let overrides = RunOverrides::from_env()?;
            let blacklist = Blacklist::load(root.join(&config.paths.blacklist_file))?;

            let source = GithubSource::new(&config.github)?;
            let materializer = GitMaterializer::new(source.client().clone());
            let enricher =
                CommandEnricher::new(config.enrichment.clone(), config.structure.clone());
            let caller = RateLimitedCaller::from_limits(&config.limits);

            let ctx = SyncContext {
                config: &config,
                overrides: &overrides,
                blacklist: &blacklist,
                source: &source,
                materializer: &materializer,
                enricher: &enricher,
                caller: &caller,
            };

            if matches!(cli.command, Command::Generate) {
                let summary = pipeline::run_generate(ctx, &storage).await?;
                log::info!(
                    "Wrote {} entries and {} skips",
                    summary.written.accepted_count,
                    summary.written.skipped_count
                );
            } else {
                pipeline::run_cleanup(ctx, &storage).await?;
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK");

            let overrides = RunOverrides::from_env()?;
            if let Some(repo) = &overrides.test_repo {
                log::info!("Single repository override: {}", repo);
            }
            if overrides.offset_percent > 0 {
                log::info!("Offset: {}%", overrides.offset_percent);
            }

            log::info!("All validations passed!");
        }

        Command::Info => {
            log::info!("Catalog: {}", config.paths.data_file.display());
            log::info!("Skip list: {}", config.paths.skips_file.display());

            let snapshot = storage.load().await?;
            log::info!("Stored snapshot: {}", pipeline::describe(&snapshot));

            let blacklist = Blacklist::load(root.join(&config.paths.blacklist_file))?;
            log::info!("Blacklist: {} entries", blacklist.len());
        }
    }

    log::info!("Done!");

    Ok(())
}
