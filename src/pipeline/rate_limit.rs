// src/pipeline/rate_limit.rs

//! Rate-limited calls against the remote service.
//!
//! Two mechanisms work together:
//!
//! - [`CallQuota`] proactively caps the number of calls issued within a
//!   rolling window, so the server-side limiter is rarely hit at all.
//! - [`RetryPolicy`] reacts to throttling errors by sleeping until the
//!   reported reset time plus a safety margin.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::error::{AppError, Result};
use crate::models::LimitsConfig;

/// Decides whether and how long to wait before retrying a failed call.
///
/// Retries are unbounded but always tied to a deadline reported by the
/// service; errors without a deadline are never retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    safety_margin: Duration,
}

impl RetryPolicy {
    pub fn new(safety_margin: Duration) -> Self {
        Self { safety_margin }
    }

    /// Sleep before the next attempt, or `None` if `error` is final.
    pub fn sleep_for(&self, error: &AppError, now: DateTime<Utc>) -> Option<Duration> {
        let reset_at = error.retry_at()?;
        let remaining = (reset_at - now).to_std().unwrap_or(Duration::ZERO);
        Some(remaining + self.safety_margin)
    }
}

/// Rolling-window call budget.
#[derive(Debug)]
pub struct CallQuota {
    limit: usize,
    window: Duration,
    issued: Mutex<VecDeque<Instant>>,
}

impl CallQuota {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            issued: Mutex::new(VecDeque::with_capacity(limit)),
        }
    }

    /// Wait until a call may be issued and record it.
    pub async fn acquire(&self) {
        loop {
            let wait_until = {
                let mut issued = self.issued.lock().unwrap_or_else(|e| e.into_inner());
                let now = Instant::now();
                while issued
                    .front()
                    .is_some_and(|&at| now.duration_since(at) >= self.window)
                {
                    issued.pop_front();
                }

                let oldest = issued.front().copied();
                match oldest {
                    Some(oldest) if issued.len() >= self.limit => oldest + self.window,
                    _ => {
                        issued.push_back(now);
                        return;
                    }
                }
            };

            log::info!(
                "Call quota of {} per {}s reached, waiting {}s",
                self.limit,
                self.window.as_secs(),
                wait_until.saturating_duration_since(Instant::now()).as_secs()
            );
            tokio::time::sleep_until(wait_until).await;
        }
    }

    /// Calls issued within the current window.
    pub fn in_window(&self) -> usize {
        let issued = self.issued.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        issued
            .iter()
            .filter(|&&at| now.duration_since(at) < self.window)
            .count()
    }
}

/// Wraps remote calls with the call quota and the throttling retry policy.
#[derive(Debug)]
pub struct RateLimitedCaller {
    quota: CallQuota,
    policy: RetryPolicy,
}

impl RateLimitedCaller {
    pub fn new(quota: CallQuota, policy: RetryPolicy) -> Self {
        Self { quota, policy }
    }

    pub fn from_limits(limits: &LimitsConfig) -> Self {
        Self::new(
            CallQuota::new(limits.calls_per_window, Duration::from_secs(limits.window_secs)),
            RetryPolicy::new(Duration::from_secs(limits.safety_margin_secs)),
        )
    }

    /// Run `op` until it succeeds or fails with a non-throttling error.
    pub async fn call<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        loop {
            self.quota.acquire().await;
            let error = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            match self.policy.sleep_for(&error, Utc::now()) {
                Some(delay) => {
                    log::warn!("{}; sleeping {}s before retrying", error, delay.as_secs());
                    tokio::time::sleep(delay).await;
                }
                None => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn throttled(secs_from_now: i64) -> AppError {
        AppError::Throttled {
            reset_at: Utc::now() + chrono::Duration::seconds(secs_from_now),
        }
    }

    #[test]
    fn test_policy_sleeps_until_reset_plus_margin() {
        let policy = RetryPolicy::new(Duration::from_secs(5));
        let now = Utc::now();
        let error = AppError::Throttled {
            reset_at: now + chrono::Duration::seconds(30),
        };
        assert_eq!(policy.sleep_for(&error, now), Some(Duration::from_secs(35)));
    }

    #[test]
    fn test_policy_past_reset_waits_margin_only() {
        let policy = RetryPolicy::new(Duration::from_secs(5));
        let now = Utc::now();
        let error = AppError::Throttled {
            reset_at: now - chrono::Duration::seconds(30),
        };
        assert_eq!(policy.sleep_for(&error, now), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_policy_does_not_retry_other_errors() {
        let policy = RetryPolicy::new(Duration::from_secs(5));
        assert_eq!(policy.sleep_for(&AppError::not_found("octo/x"), Utc::now()), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quota_waits_for_window() {
        let quota = CallQuota::new(2, Duration::from_secs(60));
        let start = Instant::now();

        quota.acquire().await;
        quota.acquire().await;
        assert_eq!(quota.in_window(), 2);
        assert!(start.elapsed() < Duration::from_secs(1));

        quota.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(60));
        assert_eq!(quota.in_window(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_retries_throttled_calls() {
        let caller = RateLimitedCaller::new(
            CallQuota::new(100, Duration::from_secs(3600)),
            RetryPolicy::new(Duration::from_secs(5)),
        );
        let counter = AtomicUsize::new(0);
        let attempts = &counter;

        let value = caller
            .call(move || async move {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(throttled(10))
                } else {
                    Ok(42)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_returns_final_errors() {
        let caller = RateLimitedCaller::from_limits(&LimitsConfig::default());
        let counter = AtomicUsize::new(0);
        let attempts = &counter;

        let result: Result<()> = caller
            .call(move || async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(AppError::not_found("octo/gone"))
            })
            .await;

        assert!(result.unwrap_err().is_not_found());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
