use crate::{Error, Result};
use std::time::Duration;

/// Configuration for retry behavior with exponential backoff.
///
/// The same policy drives two loops: blocking retries of storage commits that
/// hit a busy store, and the scheduler's async retries of failed sync passes.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (not including the initial attempt)
    pub max_attempts: u32,

    /// Initial backoff duration in milliseconds
    pub initial_backoff_ms: u64,

    /// Maximum backoff duration in milliseconds
    pub max_backoff_ms: u64,

    /// Multiplier applied to backoff after each retry
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        initial_backoff_ms: u64,
        max_backoff_ms: u64,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms,
            max_backoff_ms,
            backoff_multiplier,
        }
    }

    /// Returns a policy with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 0,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            backoff_multiplier: 1.0,
        }
    }

    /// Returns a policy for quick transient failures such as a busy store.
    pub fn fast() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 10,
            max_backoff_ms: 100,
            backoff_multiplier: 2.0,
        }
    }

    /// Returns a policy for network round trips.
    pub fn standard() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }

    /// Calculates the backoff duration for a given attempt number (0-indexed).
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        let backoff_ms = (self.initial_backoff_ms as f64
            * self.backoff_multiplier.powi(attempt as i32))
            .min(self.max_backoff_ms as f64) as u64;
        Duration::from_millis(backoff_ms)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.backoff_multiplier < 1.0 {
            return Err("backoff_multiplier must be at least 1.0".to_string());
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err("initial_backoff_ms must not exceed max_backoff_ms".to_string());
        }
        Ok(())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

/// Retries a blocking operation according to the specified policy.
///
/// Only retries if the error is retryable (as determined by `Error::is_retryable()`).
pub fn retry_with_policy<F, T>(policy: &RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut last_error = match operation() {
        Ok(result) => return Ok(result),
        Err(e) if !e.is_retryable() => return Err(e),
        Err(e) => e,
    };

    for attempt in 0..policy.max_attempts {
        std::thread::sleep(policy.backoff_duration(attempt));

        match operation() {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                tracing::debug!(attempt = attempt + 1, error = %e, "retryable storage error");
                last_error = e;
            }
        }
    }

    Err(last_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_backoff_duration_exponential() {
        let policy = RetryPolicy::new(5, 100, 10_000, 2.0);

        assert_eq!(policy.backoff_duration(0).as_millis(), 100);
        assert_eq!(policy.backoff_duration(1).as_millis(), 200);
        assert_eq!(policy.backoff_duration(2).as_millis(), 400);
    }

    #[test]
    fn test_backoff_duration_respects_max() {
        let policy = RetryPolicy::new(10, 100, 500, 2.0);
        assert_eq!(policy.backoff_duration(5).as_millis(), 500);
        assert_eq!(policy.backoff_duration(30).as_millis(), 500);
    }

    #[test]
    fn test_retry_succeeds_after_busy() {
        let calls = Cell::new(0);
        let result = retry_with_policy(&RetryPolicy::new(3, 1, 5, 2.0), || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(Error::StorageBusy("locked".to_string()))
            } else {
                Ok(7)
            }
        });

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_retry_stops_on_non_retryable() {
        let calls = Cell::new(0);
        let result: Result<()> = retry_with_policy(&RetryPolicy::fast(), || {
            calls.set(calls.get() + 1);
            Err(Error::InvalidNote("missing id".to_string()))
        });

        assert!(matches!(result, Err(Error::InvalidNote(_))));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_retry_exhausts_attempts() {
        let calls = Cell::new(0);
        let result: Result<()> = retry_with_policy(&RetryPolicy::new(2, 1, 2, 1.5), || {
            calls.set(calls.get() + 1);
            Err(Error::StorageBusy("locked".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_validate() {
        assert!(RetryPolicy::standard().validate().is_ok());
        assert!(RetryPolicy::new(1, 10, 5, 2.0).validate().is_err());
        assert!(RetryPolicy::new(1, 1, 5, 0.5).validate().is_err());
    }
}
