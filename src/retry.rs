//! Retry strategies and the attempt loop.
//!
//! Every failure marked retryable by [`Error::is_retryable`] is retried under
//! the configured [`RetryStrategy`]. Connection failures, non-2xx statuses and
//! response decoding failures are treated alike.

use crate::cancel::CancelToken;
use crate::{Error, Result};
use rand::Rng;
use std::time::Duration;

/// Delay before the first retry under the default strategy.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(100);

/// Upper bound on a single backoff delay under the default strategy.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Defines how many times and how long to wait before retrying.
///
/// # Examples
///
/// ```
/// use restbind::RetryStrategy;
/// use std::time::Duration;
///
/// // 100ms, 200ms, 400ms
/// let strategy = RetryStrategy::exponential(3);
/// assert_eq!(strategy.delay_for_attempt(3), Some(Duration::from_millis(400)));
/// assert_eq!(strategy.delay_for_attempt(4), None);
///
/// let fixed = RetryStrategy::Fixed {
///     delay: Duration::from_secs(1),
///     max_retries: 2,
/// };
/// assert_eq!(fixed.max_retries(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub enum RetryStrategy {
    /// Make a single attempt.
    #[default]
    None,

    /// Wait `initial_delay * 2^(retry - 1)`, capped at `max_delay`.
    ExponentialBackoff {
        /// The delay before the first retry.
        initial_delay: Duration,
        /// The maximum delay between retries.
        max_delay: Duration,
        /// The maximum number of retries after the first attempt.
        max_retries: usize,
        /// Scale each delay by a random factor between 0.5 and 1.0.
        jitter: bool,
    },

    /// Wait the same delay before every retry.
    Fixed {
        /// The delay between attempts.
        delay: Duration,
        /// The maximum number of retries after the first attempt.
        max_retries: usize,
    },
}

impl RetryStrategy {
    /// Exponential backoff from 100ms without jitter, as configured by
    /// [`crate::ClientBuilder::max_retries`].
    pub fn exponential(max_retries: usize) -> Self {
        if max_retries == 0 {
            return RetryStrategy::None;
        }
        RetryStrategy::ExponentialBackoff {
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_retries,
            jitter: false,
        }
    }

    /// Returns the delay before the given retry, or `None` once retries are exhausted.
    ///
    /// `retry` is 1-indexed: 1 is the first retry, made after the first attempt failed.
    pub fn delay_for_attempt(&self, retry: usize) -> Option<Duration> {
        match self {
            RetryStrategy::None => None,
            RetryStrategy::ExponentialBackoff {
                initial_delay,
                max_delay,
                max_retries,
                jitter,
            } => {
                if retry == 0 || retry > *max_retries {
                    return None;
                }

                let multiplier = 2u32.saturating_pow((retry - 1).min(31) as u32);
                let delay = initial_delay.saturating_mul(multiplier).min(*max_delay);

                if *jitter {
                    let factor = rand::thread_rng().gen_range(0.5..=1.0);
                    Some(delay.mul_f64(factor))
                } else {
                    Some(delay)
                }
            }
            RetryStrategy::Fixed { delay, max_retries } => {
                (retry > 0 && retry <= *max_retries).then_some(*delay)
            }
        }
    }

    /// The maximum number of retries after the first attempt.
    pub fn max_retries(&self) -> usize {
        match self {
            RetryStrategy::None => 0,
            RetryStrategy::ExponentialBackoff { max_retries, .. } => *max_retries,
            RetryStrategy::Fixed { max_retries, .. } => *max_retries,
        }
    }
}

/// Runs `attempt` until it succeeds, fails with a fatal error, or retries run out.
///
/// The closure receives the 1-indexed attempt number. Backoff sleeps observe
/// `cancel`. When retries were configured and all of them failed, the last
/// error is wrapped in [`Error::MaxRetriesExceeded`].
pub(crate) fn with_retries<T>(
    strategy: &RetryStrategy,
    cancel: &CancelToken,
    mut attempt: impl FnMut(usize) -> Result<T>,
) -> Result<T> {
    let mut attempt_no = 0;
    loop {
        attempt_no += 1;
        let error = match attempt(attempt_no) {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if !error.is_retryable() {
            tracing::debug!(attempt = attempt_no, error = %error, "Fatal error, not retrying");
            return Err(error);
        }

        match strategy.delay_for_attempt(attempt_no) {
            Some(delay) => {
                tracing::warn!(
                    attempt = attempt_no,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Attempt failed, retrying after delay"
                );
                cancel.sleep(delay)?;
            }
            None if strategy.max_retries() == 0 => return Err(error),
            None => {
                tracing::error!(attempts = attempt_no, error = %error, "All attempts failed");
                return Err(Error::MaxRetriesExceeded {
                    attempts: attempt_no,
                    last_error: Box::new(error),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_exponential_backoff_delays() {
        let strategy = RetryStrategy::ExponentialBackoff {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            max_retries: 4,
            jitter: false,
        };

        assert_eq!(strategy.delay_for_attempt(1), Some(Duration::from_millis(100)));
        assert_eq!(strategy.delay_for_attempt(2), Some(Duration::from_millis(200)));
        assert_eq!(strategy.delay_for_attempt(3), Some(Duration::from_millis(400)));
        assert_eq!(strategy.delay_for_attempt(4), Some(Duration::from_millis(500)));
        assert_eq!(strategy.delay_for_attempt(5), None);
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let strategy = RetryStrategy::ExponentialBackoff {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            max_retries: 1,
            jitter: true,
        };
        let delay = strategy.delay_for_attempt(1).unwrap();
        assert!(delay >= Duration::from_millis(50) && delay <= Duration::from_millis(100));
    }

    #[test]
    fn test_zero_retries_is_none() {
        assert!(matches!(RetryStrategy::exponential(0), RetryStrategy::None));
        assert_eq!(RetryStrategy::None.delay_for_attempt(1), None);
    }

    #[test]
    fn test_attempt_count_and_backoff() {
        let cancel = CancelToken::new();
        let mut calls = 0;
        let start = Instant::now();
        let result: Result<()> = with_retries(&RetryStrategy::exponential(2), &cancel, |n| {
            calls += 1;
            assert_eq!(n, calls);
            Err(Error::Timeout("read".into()))
        });

        assert_eq!(calls, 3);
        assert!(start.elapsed() >= Duration::from_millis(300));
        match result {
            Err(Error::MaxRetriesExceeded { attempts, last_error }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last_error, Error::Timeout(_)));
            }
            other => panic!("expected MaxRetriesExceeded, got {other:?}"),
        }
    }

    #[test]
    fn test_fatal_error_is_not_retried() {
        let cancel = CancelToken::new();
        let mut calls = 0;
        let result: Result<()> = with_retries(&RetryStrategy::exponential(5), &cancel, |_| {
            calls += 1;
            Err(Error::ConfigurationError("no verb".into()))
        });
        assert_eq!(calls, 1);
        assert!(matches!(result, Err(Error::ConfigurationError(_))));
    }

    #[test]
    fn test_single_attempt_returns_error_unwrapped() {
        let cancel = CancelToken::new();
        let result: Result<()> = with_retries(&RetryStrategy::None, &cancel, |_| {
            Err(Error::Timeout("connect".into()))
        });
        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[test]
    fn test_success_after_failures() {
        let cancel = CancelToken::new();
        let strategy = RetryStrategy::Fixed {
            delay: Duration::from_millis(1),
            max_retries: 3,
        };
        let value = with_retries(&strategy, &cancel, |n| {
            if n < 3 {
                Err(Error::FormatError("partial".into()))
            } else {
                Ok(n)
            }
        })
        .unwrap();
        assert_eq!(value, 3);
    }

    #[test]
    fn test_cancelled_backoff_is_interrupted() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let result: Result<()> = with_retries(&RetryStrategy::exponential(3), &cancel, |_| {
            Err(Error::Timeout("read".into()))
        });
        assert!(matches!(result, Err(Error::Interrupted(_))));
    }
}
