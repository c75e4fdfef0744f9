//! Retry utilities with exponential backoff and jitter.
//!
//! Remote calls are retried while their error is classified as transient and
//! the policy's time budget lasts. Classification is a lookup in a
//! [`RetryTable`] keyed by the error's kind, so each call site can extend or
//! narrow the default table.
//!
//! # Example
//!
//! ```ignore
//! use stratus_core::retry::{retry_with_backoff, RetryPolicy};
//!
//! let table = default_retry_table().retry_on(ErrorCode::InternalError);
//! let ids = retry_with_backoff(&RetryPolicy::write(), &table, "RunInstances", || async {
//!     cvm.run_instances(&request).await
//! })
//! .await?;
//! ```

use std::collections::HashMap;
use std::fmt::{Debug, Display};
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;

use log::{error, warn};
use rand::Rng;
use tokio::time::Instant;

/// Time budget and backoff shape for one retried call
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total time budget across all attempts
    pub timeout: Duration,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for a single delay
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::read()
    }
}

impl RetryPolicy {
    pub const READ_TIMEOUT: Duration = Duration::from_secs(3 * 60);
    pub const WRITE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }

    /// Budget for describe calls
    pub fn read() -> Self {
        Self::with_timeout(Self::READ_TIMEOUT)
    }

    /// Budget for mutating calls
    pub fn write() -> Self {
        Self::with_timeout(Self::WRITE_TIMEOUT)
    }
}

/// Errors that expose a kind for retry classification
pub trait Classified {
    type Kind: Copy + Eq + Hash + Debug;

    fn kind(&self) -> Self::Kind;
}

/// Maps error kinds to "retry or not"
#[derive(Clone, Debug)]
pub struct RetryTable<K> {
    entries: HashMap<K, bool>,
    fallback: bool,
}

impl<K: Copy + Eq + Hash> RetryTable<K> {
    /// Empty table; kinds not listed use `fallback`
    pub fn new(fallback: bool) -> Self {
        Self {
            entries: HashMap::new(),
            fallback,
        }
    }

    pub fn retry_on(mut self, kind: K) -> Self {
        self.entries.insert(kind, true);
        self
    }

    pub fn never_retry(mut self, kind: K) -> Self {
        self.entries.insert(kind, false);
        self
    }

    pub fn is_retryable(&self, kind: K) -> bool {
        self.entries.get(&kind).copied().unwrap_or(self.fallback)
    }
}

impl<K: Copy + Eq + Hash> FromIterator<K> for RetryTable<K> {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        iter.into_iter()
            .fold(RetryTable::new(false), |table, kind| table.retry_on(kind))
    }
}

/// Execute an async operation, retrying transient failures.
///
/// Non-retryable errors are returned after a single attempt. When the next
/// delay would exceed the policy's budget, the last error is returned as is.
pub async fn retry_with_backoff<F, Fut, T, E>(
    policy: &RetryPolicy,
    table: &RetryTable<E::Kind>,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classified + Display,
{
    let deadline = Instant::now() + policy.timeout;
    let mut attempt = 0u32;
    let mut delay = policy.initial_delay;

    loop {
        attempt += 1;

        let e = match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        if !table.is_retryable(e.kind()) {
            return Err(e);
        }

        // Add jitter: 0.5x to 1.5x of the delay
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        let jittered_delay = Duration::from_secs_f64(delay.as_secs_f64() * jitter);

        if Instant::now() + jittered_delay > deadline {
            error!(
                "{} failed after {} attempt(s), giving up: {}",
                operation_name, attempt, e
            );
            return Err(e);
        }

        warn!(
            "{} failed (attempt {}), retrying in {}ms: {}",
            operation_name,
            attempt,
            jittered_delay.as_millis(),
            e
        );

        tokio::time::sleep(jittered_delay).await;

        // Exponential backoff, capped at max_delay
        delay = Duration::from_secs_f64(
            (delay.as_secs_f64() * policy.backoff_multiplier).min(policy.max_delay.as_secs_f64()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Kind {
        Busy,
        Internal,
        Denied,
    }

    #[derive(Debug, PartialEq)]
    struct TestError {
        kind: Kind,
        attempt: u32,
    }

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?} on attempt {}", self.kind, self.attempt)
        }
    }

    impl Classified for TestError {
        type Kind = Kind;

        fn kind(&self) -> Kind {
            self.kind
        }
    }

    fn table() -> RetryTable<Kind> {
        RetryTable::new(false).retry_on(Kind::Busy)
    }

    #[tokio::test]
    async fn succeeds_immediately() {
        let result: Result<i32, TestError> =
            retry_with_backoff(&RetryPolicy::read(), &table(), "op", || async { Ok(42) }).await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_error_then_success() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let result = retry_with_backoff(&RetryPolicy::read(), &table(), "op", || {
            let attempt = c.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt < 3 {
                    Err(TestError {
                        kind: Kind::Busy,
                        attempt,
                    })
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_is_single_attempt() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let result: Result<(), TestError> =
            retry_with_backoff(&RetryPolicy::read(), &table(), "op", || {
                let attempt = c.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    Err(TestError {
                        kind: Kind::Denied,
                        attempt,
                    })
                }
            })
            .await;

        assert_eq!(
            result,
            Err(TestError {
                kind: Kind::Denied,
                attempt: 1
            })
        );
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_returns_last_error() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let policy = RetryPolicy::with_timeout(Duration::from_secs(20));
        let start = Instant::now();

        let result: Result<(), TestError> = retry_with_backoff(&policy, &table(), "op", || {
            let attempt = c.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                Err(TestError {
                    kind: Kind::Busy,
                    attempt,
                })
            }
        })
        .await;

        let attempts = count.load(Ordering::SeqCst);
        assert!(attempts > 1);
        assert_eq!(
            result,
            Err(TestError {
                kind: Kind::Busy,
                attempt: attempts
            })
        );
        assert!(start.elapsed() <= Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn call_site_override_changes_behaviour() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let writes = table().retry_on(Kind::Internal);

        let result = retry_with_backoff(&RetryPolicy::write(), &writes, "op", || {
            let attempt = c.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt == 1 {
                    Err(TestError {
                        kind: Kind::Internal,
                        attempt,
                    })
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(2));

        let reads = table().never_retry(Kind::Busy);
        assert!(!reads.is_retryable(Kind::Busy));
        assert!(!table().is_retryable(Kind::Internal));
    }

    #[test]
    fn table_from_iterator_defaults_to_no_retry() {
        let table: RetryTable<Kind> = [Kind::Busy, Kind::Internal].into_iter().collect();
        assert!(table.is_retryable(Kind::Busy));
        assert!(table.is_retryable(Kind::Internal));
        assert!(!table.is_retryable(Kind::Denied));
        assert!(RetryTable::new(true).is_retryable(Kind::Denied));
    }

    #[test]
    fn presets() {
        assert_eq!(RetryPolicy::read().timeout, Duration::from_secs(180));
        assert_eq!(RetryPolicy::write().timeout, Duration::from_secs(300));
        assert_eq!(RetryPolicy::default(), RetryPolicy::read());
    }
}
