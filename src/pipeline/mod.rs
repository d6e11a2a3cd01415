//! Pipeline entry points for catalog operations.
//!
//! - `run_generate`: Reconcile the search feed with the stored catalog
//! - `run_cleanup`: Drop stored entries whose repositories vanished

pub mod catalog;
pub mod circuit_breaker;
pub mod diff;
pub mod rate_limit;
pub mod reconcile;
pub mod staleness;

pub use catalog::{CleanupStats, RunSummary, describe, run_cleanup, run_generate};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerResult};
pub use diff::{Diff, calculate_diff};
pub use rate_limit::{CallQuota, RateLimitedCaller, RetryPolicy};
pub use reconcile::{ReconcileOutcome, ReconcileStats, Reconciler, SyncContext, reconcile};
pub use staleness::{Staleness, classify};
