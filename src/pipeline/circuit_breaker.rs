//! Circuit Breaker guarding the catalog write-back.
//!
//! Prevents publishing a truncated catalog when the accepted count drops
//! implausibly compared to the previous snapshot.
//!
//! > With the default threshold of 50%, if the new catalog holds fewer
//! > than **half** the entries of the previous one, the write operation
//! > is aborted.

use crate::error::{AppError, Result};

/// Circuit breaker for preventing bad catalog updates.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    /// Maximum allowed drop percentage (0-100)
    max_drop_percent: u8,
}

/// Result of circuit breaker check.
#[derive(Debug, Clone, PartialEq)]
pub enum CircuitBreakerResult {
    /// Safe to proceed with the write
    Safe {
        current_count: usize,
        previous_count: usize,
    },
    /// First run, no previous catalog
    ColdStart { current_count: usize },
    /// Circuit breaker triggered - abort write
    Triggered {
        current_count: usize,
        previous_count: usize,
        drop_percent: f64,
    },
}

impl CircuitBreaker {
    /// Create a circuit breaker tolerating a drop of up to `max_drop_percent`.
    pub fn with_max_drop(max_drop_percent: u8) -> Self {
        Self { max_drop_percent }
    }

    /// Check whether `current_count` accepted entries may replace
    /// `previous_count`.
    pub fn check(&self, current_count: usize, previous_count: usize) -> CircuitBreakerResult {
        if previous_count == 0 {
            return CircuitBreakerResult::ColdStart { current_count };
        }

        // Integer form of `current < previous * (1 - max_drop)`.
        let keep_percent = 100 - self.max_drop_percent.min(100) as usize;
        if current_count * 100 < previous_count * keep_percent {
            let drop = previous_count - current_count;
            let drop_percent = (drop as f64 / previous_count as f64) * 100.0;
            return CircuitBreakerResult::Triggered {
                current_count,
                previous_count,
                drop_percent,
            };
        }

        CircuitBreakerResult::Safe {
            current_count,
            previous_count,
        }
    }

    /// Validate and return Ok if safe, Err if circuit breaker triggered.
    pub fn validate(&self, current_count: usize, previous_count: usize) -> Result<()> {
        match self.check(current_count, previous_count) {
            CircuitBreakerResult::Safe {
                current_count,
                previous_count,
            } => {
                log::info!(
                    "Circuit breaker: SAFE ({} entries, was {})",
                    current_count,
                    previous_count
                );
                Ok(())
            }
            CircuitBreakerResult::ColdStart { current_count } => {
                log::info!(
                    "Circuit breaker: COLD START ({} entries, no previous catalog)",
                    current_count
                );
                Ok(())
            }
            CircuitBreakerResult::Triggered {
                current_count,
                previous_count,
                drop_percent,
            } => {
                log::error!(
                    "Circuit breaker: TRIGGERED! {} → {} entries ({:.1}% drop > {}% threshold)",
                    previous_count,
                    current_count,
                    drop_percent,
                    self.max_drop_percent
                );
                Err(AppError::Collapse {
                    current_count,
                    previous_count,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_no_drop() {
        let cb = CircuitBreaker::with_max_drop(50);
        assert!(matches!(cb.check(100, 100), CircuitBreakerResult::Safe { .. }));
    }

    #[test]
    fn test_exactly_half_is_safe() {
        let cb = CircuitBreaker::with_max_drop(50);
        assert!(matches!(cb.check(50, 100), CircuitBreakerResult::Safe { .. }));
        assert!(matches!(cb.check(2, 3), CircuitBreakerResult::Safe { .. }));
    }

    #[test]
    fn test_triggered_below_half() {
        let cb = CircuitBreaker::with_max_drop(50);
        assert!(matches!(
            cb.check(49, 100),
            CircuitBreakerResult::Triggered { .. }
        ));
        assert!(matches!(
            cb.check(0, 100),
            CircuitBreakerResult::Triggered { .. }
        ));
    }

    #[test]
    fn test_cold_start() {
        let cb = CircuitBreaker::with_max_drop(50);
        assert_eq!(
            cb.check(0, 0),
            CircuitBreakerResult::ColdStart { current_count: 0 }
        );
        assert!(matches!(
            cb.check(50, 0),
            CircuitBreakerResult::ColdStart { .. }
        ));
    }

    #[test]
    fn test_increase_is_safe() {
        let cb = CircuitBreaker::with_max_drop(50);
        assert!(matches!(cb.check(150, 100), CircuitBreakerResult::Safe { .. }));
    }

    #[test]
    fn test_custom_threshold() {
        let cb = CircuitBreaker::with_max_drop(20);
        assert!(matches!(cb.check(80, 100), CircuitBreakerResult::Safe { .. }));
        assert!(matches!(
            cb.check(79, 100),
            CircuitBreakerResult::Triggered { .. }
        ));
    }

    #[test]
    fn test_validate_returns_error() {
        let cb = CircuitBreaker::with_max_drop(50);
        let result = cb.validate(49, 100);
        assert!(matches!(
            result.unwrap_err(),
            AppError::Collapse {
                current_count: 49,
                previous_count: 100
            }
        ));
    }
}
