//! Retry with exponential backoff, and call throttling, for remote calls
//!
//! Every call to the activity service goes through a [`Throttle`] that keeps
//! a minimum gap between consecutive requests, and through [`with_retry`]
//! which repeats transient failures (rate limits, transport errors, 5xx)
//! a bounded number of times.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{self, Result};

/// Retry policy for remote calls
///
/// Controls how many times a failed request is retried and how long to wait
/// between attempts using exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the first call
    pub max_retries: u32,
    /// Base delay between retries (doubles each attempt)
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }
}

/// Returns `true` for HTTP statuses worth retrying: 429 and 5xx.
#[must_use]
pub fn is_recoverable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// Compute the delay before the next retry attempt.
///
/// A server-provided `retry_after` wins, capped at `policy.max_delay`.
/// Otherwise the delay is `min(base_delay * 2^attempt + jitter, max_delay)`
/// where jitter is 0-25% of the exponential term.
#[must_use]
pub fn delay_for_attempt(
    policy: &RetryPolicy,
    attempt: u32,
    retry_after: Option<Duration>,
) -> Duration {
    if let Some(ra) = retry_after {
        return ra.min(policy.max_delay);
    }

    let base = policy
        .base_delay
        .saturating_mul(2u32.saturating_pow(attempt))
        .min(policy.max_delay);

    let jitter_fraction: f64 = rand::rng().random_range(0.0..=0.25);
    (base + base.mul_f64(jitter_fraction)).min(policy.max_delay)
}

/// Enforces a minimum interval between consecutive remote calls.
#[derive(Debug)]
pub struct Throttle {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// Sleep until at least `min_interval` has passed since the previous
    /// call, then record this one.
    pub async fn wait(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.min_interval;
            let now = Instant::now();
            if ready_at > now {
                tokio::time::sleep(ready_at - now).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Run `op` under `throttle`, retrying transient failures per `policy`.
///
/// Non-transient errors are returned immediately. When retries are
/// exhausted the last error is returned unchanged.
///
/// # Errors
///
/// Returns whatever error `op` produced on its final attempt
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    throttle: &Throttle,
    operation: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        throttle.wait().await;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if error::is_transient(&e) && attempt < policy.max_retries => {
                let delay = delay_for_attempt(policy, attempt, error::retry_after(&e));
                tracing::warn!(
                    operation,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Transient failure, retrying: {}",
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FitchatError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    // -- is_recoverable_status ------------------------------------------------

    #[test]
    fn recoverable_on_rate_limit_and_server_errors() {
        assert!(is_recoverable_status(429));
        assert!(is_recoverable_status(500));
        assert!(is_recoverable_status(503));
        assert!(is_recoverable_status(599));
    }

    #[test]
    fn not_recoverable_on_client_errors() {
        assert!(!is_recoverable_status(400));
        assert!(!is_recoverable_status(401));
        assert!(!is_recoverable_status(404));
        assert!(!is_recoverable_status(200));
    }

    // -- delay_for_attempt ----------------------------------------------------

    #[test]
    fn delay_grows_exponentially_within_jitter() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
        };
        for attempt in 0..4 {
            let expected = 100u64 * 2u64.pow(attempt);
            let delay = delay_for_attempt(&policy, attempt, None).as_millis() as u64;
            assert!(delay >= expected, "attempt {attempt}: {delay} < {expected}");
            assert!(delay <= expected + expected / 4 + 1);
        }
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        };
        assert_eq!(delay_for_attempt(&policy, 8, None), Duration::from_secs(5));
    }

    #[test]
    fn retry_after_takes_precedence_but_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(
            delay_for_attempt(&policy, 0, Some(Duration::from_secs(2))),
            Duration::from_secs(2)
        );
        assert_eq!(
            delay_for_attempt(&policy, 0, Some(Duration::from_secs(600))),
            policy.max_delay
        );
    }

    // -- with_retry -----------------------------------------------------------

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let throttle = Throttle::new(Duration::ZERO);
        let result = with_retry(&fast_policy(3), &throttle, "test", move || async move {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(FitchatError::Transport("reset".to_string()).into())
            } else {
                Ok(n)
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let throttle = Throttle::new(Duration::ZERO);
        let err = with_retry(&fast_policy(2), &throttle, "test", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(
                FitchatError::RateLimited {
                    retry_after_secs: None,
                }
                .into(),
            )
        })
        .await
        .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            err.downcast_ref::<FitchatError>(),
            Some(FitchatError::RateLimited { .. })
        ));
    }

    #[tokio::test]
    async fn does_not_retry_permanent_errors() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let throttle = Throttle::new(Duration::ZERO);
        let err = with_retry(&fast_policy(5), &throttle, "test", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(FitchatError::Authentication("bad password".to_string()).into())
        })
        .await
        .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(error::is_authentication(&err));
    }

    #[tokio::test]
    async fn throttle_spaces_out_calls() {
        let throttle = Throttle::new(Duration::from_millis(20));
        let start = Instant::now();
        throttle.wait().await;
        throttle.wait().await;
        throttle.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(40));
    }
}
