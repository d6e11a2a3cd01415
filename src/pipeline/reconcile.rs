// src/pipeline/reconcile.rs

//! Incremental reconciliation of the search feed against the previous
//! snapshot.
//!
//! A pass has two phases:
//!
//! 1. **Active scan**: walk the feed (most recently updated first), reuse
//!    unchanged records and reprocess everything else.
//! 2. **Back-fill**: every previously known identity the scan did not reach
//!    is re-checked for existence and carried forward unchanged, or dropped
//!    if it is gone.
//!
//! Per-item failures never abort the pass. They turn into skip entries or
//! preserve the previous record.

use std::collections::{BTreeSet, HashSet};

use crate::error::{AppError, Result};
use crate::models::{
    Blacklist, CatalogEntry, Config, ContentEntry, ContentKind, RepoInfo, RunOverrides,
    SearchPage, SkipEntry, SkipReason, Snapshot, TEST_REPO_VAR, latest_stable,
};
use crate::pipeline::circuit_breaker::CircuitBreaker;
use crate::pipeline::rate_limit::RateLimitedCaller;
use crate::pipeline::staleness::{Staleness, classify};
use crate::services::{Enricher, MaterializedItem, Materializer, RepoSource};
use crate::storage::SnapshotStorage;
use crate::utils::{pause, repo_path};

/// Everything a pass needs, constructed once per run.
#[derive(Clone, Copy)]
pub struct SyncContext<'a> {
    pub config: &'a Config,
    pub overrides: &'a RunOverrides,
    pub blacklist: &'a Blacklist,
    pub source: &'a dyn RepoSource,
    pub materializer: &'a dyn Materializer,
    pub enricher: &'a dyn Enricher,
    pub caller: &'a RateLimitedCaller,
}

/// Counters reported at the end of a pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Feed items examined during the active scan
    pub scanned: usize,
    pub reused_accepted: usize,
    pub reused_skipped: usize,
    pub reprocessed: usize,
    /// Fresh accepted entries built by enrichment
    pub accepted: usize,
    /// Fresh skip entries
    pub skipped: usize,
    pub blacklisted: usize,
    /// Previous entries verified and carried forward
    pub backfilled: usize,
    /// Previous entries that no longer exist
    pub dropped: usize,
    /// Previous entries kept because verification failed
    pub preserved: usize,
    pub checkpoints: usize,
    pub early_stopped: bool,
}

/// Result of a reconciliation pass.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub snapshot: Snapshot,
    pub stats: ReconcileStats,
}

/// Outcome of the structural precondition check.
enum Structure {
    /// Layout is valid, rooted at this base directory
    Valid(String),
    Invalid(SkipReason),
}

/// Single-pass reconciler; owns the working copies of both collections.
pub struct Reconciler<'a> {
    ctx: SyncContext<'a>,
    previous: &'a Snapshot,
    checkpoint: Option<&'a dyn SnapshotStorage>,
    next: Snapshot,
    seen: HashSet<String>,
    stats: ReconcileStats,
    fresh_accepts: usize,
}

impl<'a> Reconciler<'a> {
    pub fn new(ctx: SyncContext<'a>, previous: &'a Snapshot) -> Self {
        Self {
            ctx,
            previous,
            checkpoint: None,
            next: Snapshot::new(),
            seen: HashSet::new(),
            stats: ReconcileStats::default(),
            fresh_accepts: 0,
        }
    }

    /// Periodically stage intermediate results in `storage`.
    pub fn with_checkpoints(mut self, storage: &'a dyn SnapshotStorage) -> Self {
        self.checkpoint = Some(storage);
        self
    }

    /// Run the pass and return the new snapshot.
    pub async fn run(mut self) -> Result<ReconcileOutcome> {
        let overrides = self.ctx.overrides;
        match overrides.test_repo.as_deref() {
            Some(full_name) => {
                log::info!("Processing only {} ({} is set)", full_name, TEST_REPO_VAR);
                self.process_single(full_name).await?;
                self.carry_forward_unseen();
            }
            None => {
                self.scan().await?;
                self.backfill().await;
            }
        }

        debug_assert!(self.next.is_partitioned());
        Ok(ReconcileOutcome {
            snapshot: self.next,
            stats: self.stats,
        })
    }

    // ------------------------------------------------------------------
    // Active scan
    // ------------------------------------------------------------------

    async fn search_page(&self, page: usize) -> Result<SearchPage> {
        let search = &self.ctx.config.search;
        let source = self.ctx.source;
        let (query, sort) = (search.query.as_str(), search.sort.as_str());
        let per_page = search.page_size;
        self.ctx
            .caller
            .call(move || source.search(query, sort, page, per_page))
            .await
    }

    /// Whether the feed ordering allows stopping at the first unchanged item.
    fn early_stop_enabled(&self) -> bool {
        self.ctx.config.catalog.early_stop && self.ctx.config.search.sort == "updated"
    }

    async fn scan(&mut self) -> Result<()> {
        let page_size = self.ctx.config.search.page_size.max(1);

        let first = match self.search_page(1).await {
            Ok(page) => page,
            Err(e) => {
                log::warn!("Search failed, continuing with back-fill only: {}", e);
                return Ok(());
            }
        };

        let visible = first.total_count.min(self.ctx.config.search.max_results);
        let start = self.ctx.overrides.offset_index(visible);
        log::info!(
            "Search reports {} matches, {} visible, starting at {}",
            first.total_count,
            visible,
            start
        );

        let mut page_number = start / page_size + 1;
        let mut position = (page_number - 1) * page_size;
        let mut page = if page_number == 1 {
            first
        } else {
            match self.search_page(page_number).await {
                Ok(page) => page,
                Err(e) => {
                    log::warn!("Search page {} failed, ending scan: {}", page_number, e);
                    return Ok(());
                }
            }
        };

        loop {
            if page.items.is_empty() {
                break;
            }

            for repo in page.items {
                if position >= visible {
                    return Ok(());
                }
                let index = position;
                position += 1;
                if index < start || !self.seen.insert(repo.full_name.clone()) {
                    continue;
                }

                self.stats.scanned += 1;
                let verdict = self.process(repo).await?;
                if self.early_stop_enabled() && verdict.is_some_and(Staleness::is_reuse) {
                    log::info!(
                        "Reached unchanged entries after {} items, stopping scan",
                        self.stats.scanned
                    );
                    self.stats.early_stopped = true;
                    return Ok(());
                }
            }

            if position >= visible {
                break;
            }
            page_number += 1;
            page = match self.search_page(page_number).await {
                Ok(page) => page,
                Err(e) => {
                    log::warn!("Search page {} failed, ending scan: {}", page_number, e);
                    break;
                }
            };
        }
        Ok(())
    }

    async fn process_single(&mut self, full_name: &str) -> Result<()> {
        let source = self.ctx.source;
        match self.ctx.caller.call(move || source.get_item(full_name)).await {
            Ok(repo) => {
                self.seen.insert(repo.full_name.clone());
                self.stats.scanned += 1;
                self.process(repo).await?;
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                log::warn!("{} does not exist, nothing to process", full_name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    // ------------------------------------------------------------------
    // Per-candidate state machine
    // ------------------------------------------------------------------

    /// Process one feed item. `None` means no verdict was reached.
    async fn process(&mut self, repo: RepoInfo) -> Result<Option<Staleness>> {
        let full_name = repo.full_name.as_str();

        if self.ctx.blacklist.contains(full_name) {
            log::debug!("Ignoring blacklisted {}", full_name);
            self.stats.blacklisted += 1;
            return Ok(None);
        }

        let source = self.ctx.source;
        let releases = match self.ctx.caller.call(move || source.get_releases(full_name)).await {
            Ok(releases) => releases,
            Err(e) if e.is_not_found() => {
                let freshness = repo.freshness(None);
                self.record_skip(full_name, freshness, SkipReason::Vanished);
                return Ok(Some(Staleness::Reprocess));
            }
            Err(e) => {
                self.preserve(full_name, &e);
                return Ok(None);
            }
        };

        let release = latest_stable(&releases);
        let freshness = repo.freshness(release);
        let data_format = self.ctx.config.catalog.data_format;

        let verdict = classify(full_name, freshness, self.previous, data_format);
        match verdict {
            Staleness::ReuseAccepted => {
                log::debug!("Reusing {} (unchanged since {})", full_name, freshness);
                if let Some(entry) = self.previous.accepted.get(full_name) {
                    self.next.accept(entry.clone());
                }
                self.stats.reused_accepted += 1;
                return Ok(Some(verdict));
            }
            Staleness::ReuseSkipped => {
                log::debug!("Reusing skip of {} (unchanged since {})", full_name, freshness);
                if let Some(entry) = self.previous.skipped.get(full_name) {
                    self.next.skip(entry.clone());
                }
                self.stats.reused_skipped += 1;
                return Ok(Some(verdict));
            }
            Staleness::Reprocess => {}
        }

        log::info!("Processing {}", full_name);
        self.stats.reprocessed += 1;
        pause(self.ctx.config.limits.lookup_delay_secs).await;

        let base_dir = match self.check_structure(full_name).await {
            Ok(Structure::Valid(base_dir)) => base_dir,
            Ok(Structure::Invalid(reason)) => {
                self.record_skip(full_name, freshness, reason);
                return Ok(Some(verdict));
            }
            Err(e) => {
                self.preserve(full_name, &e);
                return Ok(None);
            }
        };

        let scratch = tempfile::Builder::new()
            .prefix("catalog-sync-")
            .tempdir()?;

        let materializer = self.ctx.materializer;
        let repo_ref = &repo;
        let target = scratch.path();
        let root = match self
            .ctx
            .caller
            .call(move || materializer.materialize(repo_ref, release, target))
            .await
        {
            Ok(root) => root,
            Err(e) => {
                log::warn!("Could not materialize {}: {}", full_name, e);
                self.record_skip(full_name, freshness, SkipReason::TransferFailed);
                return Ok(Some(verdict));
            }
        };

        let item = MaterializedItem {
            full_name: full_name.to_string(),
            root,
            base_dir,
        };
        let enrichment = self.ctx.enricher.enrich(&item).await;
        drop(scratch);

        match enrichment {
            Ok(result) => {
                let entry = CatalogEntry::from_repo(&repo, release, freshness, data_format, result);
                self.record_accept(entry).await;
            }
            Err(e) if e.is_environment() => {
                log::error!("Cannot enrich {}: {}", full_name, e);
                return Err(e);
            }
            Err(e) => {
                log::warn!("Enrichment of {} failed: {}", full_name, e);
                self.record_skip(full_name, freshness, SkipReason::EnrichmentFailed);
            }
        }
        Ok(Some(verdict))
    }

    /// Locate the entry point and validate module naming.
    ///
    /// The first configured base directory that exists is used; an empty
    /// base directory (the repository root) always exists.
    async fn check_structure(&self, full_name: &str) -> Result<Structure> {
        let structure = &self.ctx.config.structure;

        for base_dir in &structure.base_dirs {
            let base = repo_path(base_dir, "");
            if !base.is_empty() && self.contents(full_name, &base).await?.is_none() {
                continue;
            }

            let entry_point = repo_path(base_dir, &structure.entry_point);
            if self.contents(full_name, &entry_point).await?.is_none() {
                log::info!("Skipping {}: missing {}", full_name, entry_point);
                return Ok(Structure::Invalid(SkipReason::MissingEntryPoint));
            }

            let module_dir = repo_path(base_dir, &structure.module_dir);
            let modules = self.contents(full_name, &module_dir).await?.unwrap_or_default();
            let misnamed = modules.iter().find(|entry| {
                entry.kind == ContentKind::File && !entry.name.ends_with(&structure.module_suffix)
            });
            if let Some(entry) = misnamed {
                log::info!(
                    "Skipping {}: module {} does not use the {} extension",
                    full_name,
                    entry.path,
                    structure.module_suffix
                );
                return Ok(Structure::Invalid(SkipReason::InvalidModules));
            }

            return Ok(Structure::Valid(base_dir.clone()));
        }

        log::info!("Skipping {}: no base directory found", full_name);
        Ok(Structure::Invalid(SkipReason::MissingEntryPoint))
    }

    /// Directory listing or file entry at `path`; `None` if it does not exist.
    async fn contents(&self, full_name: &str, path: &str) -> Result<Option<Vec<ContentEntry>>> {
        let source = self.ctx.source;
        match self
            .ctx
            .caller
            .call(move || source.get_contents(full_name, path))
            .await
        {
            Ok(entries) => Ok(Some(entries)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    // ------------------------------------------------------------------
    // Recording results
    // ------------------------------------------------------------------

    fn record_skip(&mut self, full_name: &str, freshness: i64, reason: SkipReason) {
        log::info!("Skipped {} ({:?})", full_name, reason);
        let data_format = self.ctx.config.catalog.data_format;
        self.next
            .skip(SkipEntry::new(full_name, freshness, data_format, reason));
        self.stats.skipped += 1;
    }

    async fn record_accept(&mut self, entry: CatalogEntry) {
        log::info!("Accepted {}", entry.full_name);
        self.next.accept(entry);
        self.stats.accepted += 1;
        self.fresh_accepts += 1;

        let every = self.ctx.config.limits.checkpoint_every;
        if every > 0 && self.fresh_accepts % every == 0 {
            self.write_checkpoint().await;
        }
    }

    /// Copy the previous record of `full_name`, if any, into the new snapshot.
    fn carry_forward(&mut self, full_name: &str) -> bool {
        if let Some(entry) = self.previous.accepted.get(full_name) {
            self.next.accept(entry.clone());
            true
        } else if let Some(entry) = self.previous.skipped.get(full_name) {
            self.next.skip(entry.clone());
            true
        } else {
            false
        }
    }

    /// Keep the previous state of an item whose processing failed.
    fn preserve(&mut self, full_name: &str, error: &AppError) {
        if self.carry_forward(full_name) {
            log::warn!("Keeping previous record of {}: {}", full_name, error);
            self.stats.preserved += 1;
        } else {
            log::warn!("Leaving out {} for now: {}", full_name, error);
        }
    }

    /// Previous identities not reached by the scan, in identity order.
    fn unseen_previous(&self) -> Vec<String> {
        self.previous
            .accepted
            .keys()
            .chain(self.previous.skipped.keys())
            .filter(|name| !self.seen.contains(*name))
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    // ------------------------------------------------------------------
    // Back-fill
    // ------------------------------------------------------------------

    async fn backfill(&mut self) {
        let pending = self.unseen_previous();
        if pending.is_empty() {
            return;
        }
        log::info!("Back-filling {} entries outside the scan window", pending.len());

        let delay = self.ctx.config.limits.existence_check_delay_secs;
        let source = self.ctx.source;
        let mut checked = 0usize;

        for full_name in &pending {
            if self.ctx.blacklist.contains(full_name) {
                log::debug!("Dropping blacklisted {}", full_name);
                self.stats.blacklisted += 1;
                continue;
            }

            if checked > 0 {
                pause(delay).await;
            }
            checked += 1;

            let name = full_name.as_str();
            match self.ctx.caller.call(move || source.get_item(name)).await {
                Ok(_) => {
                    self.carry_forward(full_name);
                    self.stats.backfilled += 1;
                }
                Err(e) if e.is_not_found() => {
                    log::info!("Dropping {}: no longer exists", full_name);
                    self.stats.dropped += 1;
                }
                Err(e) => self.preserve(full_name, &e),
            }
        }
    }

    /// Carry every unseen previous entry forward without verification.
    fn carry_forward_unseen(&mut self) {
        for full_name in self.unseen_previous() {
            if self.ctx.blacklist.contains(&full_name) {
                self.stats.blacklisted += 1;
            } else if self.carry_forward(&full_name) {
                self.stats.preserved += 1;
            }
        }
    }

    // ------------------------------------------------------------------
    // Checkpoints
    // ------------------------------------------------------------------

    /// Results so far merged with the previous entries not yet reached.
    fn provisional(&self) -> Snapshot {
        let mut merged = self.next.clone();
        for full_name in self.unseen_previous() {
            if self.ctx.blacklist.contains(&full_name) || merged.contains(&full_name) {
                continue;
            }
            if let Some(entry) = self.previous.accepted.get(&full_name) {
                merged.accept(entry.clone());
            } else if let Some(entry) = self.previous.skipped.get(&full_name) {
                merged.skip(entry.clone());
            }
        }
        merged
    }

    async fn write_checkpoint(&mut self) {
        let Some(storage) = self.checkpoint else {
            return;
        };

        let merged = self.provisional();
        let guard = CircuitBreaker::with_max_drop(self.ctx.config.catalog.max_drop_percent);
        if let Err(e) = guard.validate(merged.accepted.len(), self.previous.accepted.len()) {
            log::warn!("Skipping checkpoint: {}", e);
            return;
        }

        match storage.store_checkpoint(&merged).await {
            Ok(meta) => {
                self.stats.checkpoints += 1;
                log::info!(
                    "Checkpoint: {} accepted, {} skipped",
                    meta.accepted_count,
                    meta.skipped_count
                );
            }
            Err(e) => log::warn!("Checkpoint failed: {}", e),
        }
    }
}

/// Run one reconciliation pass.
pub async fn reconcile(
    ctx: SyncContext<'_>,
    previous: &Snapshot,
    checkpoint: Option<&dyn SnapshotStorage>,
) -> Result<ReconcileOutcome> {
    let mut reconciler = Reconciler::new(ctx, previous);
    if let Some(storage) = checkpoint {
        reconciler = reconciler.with_checkpoints(storage);
    }
    reconciler.run().await
}
