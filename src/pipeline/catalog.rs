// src/pipeline/catalog.rs

//! Catalog generation and cleanup runs.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::Snapshot;
use crate::pipeline::circuit_breaker::CircuitBreaker;
use crate::pipeline::diff::{Diff, calculate_diff};
use crate::pipeline::reconcile::{ReconcileStats, SyncContext, reconcile};
use crate::storage::{SnapshotStorage, WriteMetadata};
use crate::utils::pause;

/// Summary of a completed generate run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub stats: ReconcileStats,
    pub diff: Diff,
    pub written: WriteMetadata,
}

/// Summary of a completed cleanup run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub checked: usize,
    pub removed: usize,
    pub kept: usize,
}

/// Reconcile the search feed against the stored snapshot and write back.
///
/// Nothing is written if the new catalog collapsed relative to the
/// previous one. Checkpoints staged during the pass are discarded once the
/// final snapshot is stored.
pub async fn run_generate(
    ctx: SyncContext<'_>,
    storage: &dyn SnapshotStorage,
) -> Result<RunSummary> {
    let start_time = Utc::now();
    log::info!("Catalog generation starting...");

    let previous = storage.load().await?;
    log::info!(
        "Previous catalog: {} accepted, {} skipped, {} blacklisted identities",
        previous.accepted.len(),
        previous.skipped.len(),
        ctx.blacklist.len()
    );

    let outcome = reconcile(ctx, &previous, Some(storage)).await?;

    CircuitBreaker::with_max_drop(ctx.config.catalog.max_drop_percent)
        .validate(outcome.snapshot.accepted.len(), previous.accepted.len())?;

    let diff = calculate_diff(&previous, &outcome.snapshot);
    let written = storage.store(&outcome.snapshot).await?;
    if let Err(e) = storage.clear_checkpoint().await {
        log::warn!("Could not remove checkpoint files: {}", e);
    }
    let end_time = Utc::now();

    log_summary(&outcome.stats, &diff);
    log::info!(
        "Catalog generation complete in {}s",
        (end_time - start_time).num_seconds()
    );

    Ok(RunSummary {
        start_time,
        end_time,
        stats: outcome.stats,
        diff,
        written,
    })
}

fn log_summary(stats: &ReconcileStats, diff: &Diff) {
    log::info!(
        "Scanned {} items: {} reused, {} reused skips, {} reprocessed ({} accepted, {} skipped)",
        stats.scanned,
        stats.reused_accepted,
        stats.reused_skipped,
        stats.reprocessed,
        stats.accepted,
        stats.skipped
    );
    log::info!(
        "Back-fill: {} carried forward, {} dropped, {} preserved after errors, {} blacklisted",
        stats.backfilled,
        stats.dropped,
        stats.preserved,
        stats.blacklisted
    );
    if stats.early_stopped {
        log::info!("Scan stopped early at the first unchanged entry");
    }

    if diff.has_changes() {
        log::info!(
            "Catalog changes: {} added, {} updated, {} removed",
            diff.added.len(),
            diff.updated.len(),
            diff.removed.len()
        );
        for name in &diff.added {
            log::debug!("  + {}", name);
        }
        for name in &diff.updated {
            log::debug!("  ~ {}", name);
        }
        for name in &diff.removed {
            log::debug!("  - {}", name);
        }
    } else {
        log::info!("Catalog unchanged");
    }
}

/// Check a slice of the stored snapshot for deleted or moved repositories.
///
/// A tenth of each collection is checked per run, starting at the
/// configured percentage offset, so repeated runs cover everything.
pub async fn run_cleanup(
    ctx: SyncContext<'_>,
    storage: &dyn SnapshotStorage,
) -> Result<CleanupStats> {
    log::info!("Catalog cleanup starting...");
    let previous = storage.load().await?;
    let mut snapshot = previous.clone();
    let mut stats = CleanupStats::default();

    log::info!("Removing vanished catalog entries");
    let accepted: Vec<String> = snapshot.accepted.keys().cloned().collect();
    for name in check_chunk(ctx, &accepted, &mut stats).await {
        snapshot.accepted.remove(&name);
    }

    log::info!("Removing vanished skip entries");
    let skipped: Vec<String> = snapshot.skipped.keys().cloned().collect();
    for name in check_chunk(ctx, &skipped, &mut stats).await {
        snapshot.skipped.remove(&name);
    }

    CircuitBreaker::with_max_drop(ctx.config.catalog.max_drop_percent)
        .validate(snapshot.accepted.len(), previous.accepted.len())?;
    storage.store(&snapshot).await?;

    log::info!(
        "Cleanup complete: {} checked, {} removed, {} kept",
        stats.checked,
        stats.removed,
        stats.kept
    );
    Ok(stats)
}

/// Existence-check the configured chunk of `names`; returns the vanished ones.
async fn check_chunk(
    ctx: SyncContext<'_>,
    names: &[String],
    stats: &mut CleanupStats,
) -> Vec<String> {
    let len = names.len();
    let start = ctx.overrides.offset_index(len).min(len);
    let end = (start + len.div_ceil(10)).min(len);
    log::info!("Checking {} entries for existence", end - start);

    let source = ctx.source;
    let mut vanished = Vec::new();
    for (i, name) in names[start..end].iter().enumerate() {
        if i != 0 {
            pause(ctx.config.limits.existence_check_delay_secs).await;
        }
        stats.checked += 1;

        let full_name = name.as_str();
        match ctx.caller.call(move || source.get_item(full_name)).await {
            Ok(_) => {
                log::info!("{} still exists, keeping data", name);
                stats.kept += 1;
            }
            Err(e) if e.is_not_found() => {
                log::info!("{} has been deleted or moved", name);
                stats.removed += 1;
                vanished.push(name.clone());
            }
            Err(e) => {
                log::warn!("Could not check {}, keeping data: {}", name, e);
                stats.kept += 1;
            }
        }
    }
    vanished
}

/// Sizes of a stored snapshot, for the `info` command.
pub fn describe(snapshot: &Snapshot) -> String {
    format!(
        "{} accepted, {} skipped, {} distinct identities",
        snapshot.accepted.len(),
        snapshot.skipped.len(),
        snapshot.identity_count()
    )
}
