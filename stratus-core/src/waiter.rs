//! Waiter - Poll a status function until an asynchronous operation settles
//!
//! Cloud APIs acknowledge mutating calls before the work is done. After
//! issuing such a call, a resource handler builds a [`StateWaiter`] with the
//! statuses that mean "done" and "still working", then hands it a refresh
//! function that fetches the current status.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use stratus_core::waiter::StateWaiter;
//!
//! let instance = StateWaiter::new(["RUNNING"], Duration::from_secs(600), Duration::from_secs(5))
//!     .with_pending(["PENDING", "STARTING"])
//!     .with_description("instance ins-123 to start")
//!     .wait_for(|| cvm.instance_state_refresh("ins-123"))
//!     .await?;
//! ```

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// One status reading returned by a refresh function
#[derive(Debug, Clone, PartialEq)]
pub struct Observation<T> {
    pub status: String,
    pub object: T,
}

impl<T> Observation<T> {
    pub fn new(status: impl Into<String>, object: T) -> Self {
        Self {
            status: status.into(),
            object,
        }
    }
}

/// How to treat a status that is neither pending nor target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownStatus {
    /// Log a warning and keep polling
    #[default]
    Tolerate,
    /// Stop with [`PollFailure::UnexpectedStatus`]
    Fail,
}

/// A waiter that cannot run. Detected before the first refresh.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WaiterConfigError {
    #[error("target status set is empty")]
    EmptyTarget,

    #[error("timeout must be positive")]
    NonPositiveTimeout,

    #[error("poll interval must be positive")]
    NonPositiveInterval,

    #[error("status {0:?} is both pending and target")]
    OverlappingStatus(String),
}

/// Why polling stopped without reaching a target status
#[derive(Debug, Error, PartialEq)]
pub enum PollFailure<E> {
    /// The refresh function itself failed
    #[error("{0}")]
    Refresh(E),

    /// The resource is gone and that is not an accepted outcome
    #[error("resource disappeared")]
    Disappeared,

    /// Strict mode saw a status outside the pending and target sets
    #[error("unexpected status {0:?}")]
    UnexpectedStatus(String),

    #[error("cancelled")]
    Cancelled,
}

/// Terminal result of one polling session
#[derive(Debug, PartialEq)]
pub enum PollOutcome<T, E> {
    /// A target status was observed. `None` when "gone" was the accepted target.
    Success(Option<T>),
    /// The budget ran out. Carries the last status seen, if any.
    Timeout { last_status: Option<String> },
    Fatal(PollFailure<E>),
}

impl<T, E> PollOutcome<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, PollOutcome::Success(_))
    }
}

/// Error form of a non-successful [`PollOutcome`]
#[derive(Debug, Error)]
pub enum WaitError<E> {
    #[error("invalid wait configuration: {0}")]
    Config(#[from] WaiterConfigError),

    #[error("timed out after {timeout:?} waiting for {description} (last status: {last_status:?})")]
    Timeout {
        description: String,
        timeout: Duration,
        last_status: Option<String>,
    },

    #[error("waiting for {description} failed: {failure}")]
    Fatal {
        description: String,
        failure: PollFailure<E>,
    },
}

impl<E> WaitError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, WaitError::Timeout { .. })
    }
}

/// Polls a refresh function until a target status, a fatal condition,
/// cancellation, or the timeout.
///
/// Built fresh for every operation and consumed by [`StateWaiter::wait`].
#[derive(Debug, Clone)]
pub struct StateWaiter {
    description: String,
    pending: HashSet<String>,
    target: HashSet<String>,
    timeout: Duration,
    interval: Duration,
    accept_gone: bool,
    not_found_checks: u32,
    unknown_status: UnknownStatus,
    cancel: Option<CancellationToken>,
}

impl StateWaiter {
    pub fn new<I, S>(target: I, timeout: Duration, interval: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            description: "resource".to_string(),
            pending: HashSet::new(),
            target: target.into_iter().map(Into::into).collect(),
            timeout,
            interval,
            accept_gone: false,
            not_found_checks: 0,
            unknown_status: UnknownStatus::default(),
            cancel: None,
        }
    }

    pub fn with_pending<I, S>(mut self, pending: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pending = pending.into_iter().map(Into::into).collect();
        self
    }

    /// Label used in log lines and error messages
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Treat "resource gone" as a target status
    pub fn accept_gone(mut self) -> Self {
        self.accept_gone = true;
        self
    }

    /// Tolerate up to `checks` consecutive "gone" readings before failing
    pub fn with_not_found_checks(mut self, checks: u32) -> Self {
        self.not_found_checks = checks;
        self
    }

    /// Fail on statuses outside the pending and target sets
    pub fn strict_statuses(mut self) -> Self {
        self.unknown_status = UnknownStatus::Fail;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Check the configuration without polling.
    ///
    /// "Gone" counts as a target member, so an empty target set is
    /// accepted when [`StateWaiter::accept_gone`] is set.
    pub fn validate(&self) -> Result<(), WaiterConfigError> {
        if self.target.is_empty() && !self.accept_gone {
            return Err(WaiterConfigError::EmptyTarget);
        }
        if self.timeout.is_zero() {
            return Err(WaiterConfigError::NonPositiveTimeout);
        }
        if self.interval.is_zero() {
            return Err(WaiterConfigError::NonPositiveInterval);
        }
        let mut overlap: Vec<&String> = self.target.intersection(&self.pending).collect();
        overlap.sort();
        if let Some(status) = overlap.first() {
            return Err(WaiterConfigError::OverlappingStatus((*status).clone()));
        }
        Ok(())
    }

    /// Run the polling loop.
    ///
    /// `refresh` returns `Ok(None)` only when the resource is confirmed gone.
    /// Errors from `refresh` end the session immediately and are never retried here.
    pub async fn wait<T, E, F, Fut>(
        self,
        mut refresh: F,
    ) -> Result<PollOutcome<T, E>, WaiterConfigError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<Observation<T>>, E>>,
    {
        self.validate()?;

        let deadline = Instant::now() + self.timeout;
        let mut attempt = 0u32;
        let mut not_found = 0u32;

        loop {
            if self.is_cancelled() {
                debug!("Wait for {} cancelled", self.description);
                return Ok(PollOutcome::Fatal(PollFailure::Cancelled));
            }

            attempt += 1;
            let observed = match refresh().await {
                Ok(observed) => observed,
                Err(e) => {
                    debug!(
                        "Refresh for {} failed on attempt {}",
                        self.description, attempt
                    );
                    return Ok(PollOutcome::Fatal(PollFailure::Refresh(e)));
                }
            };

            let last_status = match observed {
                None if self.accept_gone => {
                    debug!("{} is gone", self.description);
                    return Ok(PollOutcome::Success(None));
                }
                None => {
                    not_found += 1;
                    if not_found > self.not_found_checks {
                        return Ok(PollOutcome::Fatal(PollFailure::Disappeared));
                    }
                    debug!(
                        "{} not found yet ({}/{})",
                        self.description, not_found, self.not_found_checks
                    );
                    None
                }
                Some(Observation { status, object }) => {
                    not_found = 0;
                    if self.target.contains(&status) {
                        debug!(
                            "{} reached {} after {} attempt(s)",
                            self.description, status, attempt
                        );
                        return Ok(PollOutcome::Success(Some(object)));
                    }
                    if self.pending.contains(&status) {
                        debug!("{} is {}", self.description, status);
                    } else {
                        match self.unknown_status {
                            UnknownStatus::Tolerate => {
                                warn!(
                                    "{} has unexpected status {}, still waiting",
                                    self.description, status
                                );
                            }
                            UnknownStatus::Fail => {
                                return Ok(PollOutcome::Fatal(PollFailure::UnexpectedStatus(
                                    status,
                                )));
                            }
                        }
                    }
                    Some(status)
                }
            };

            if Instant::now() >= deadline {
                return Ok(PollOutcome::Timeout { last_status });
            }

            match &self.cancel {
                Some(token) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.interval) => {}
                        _ = token.cancelled() => {
                            debug!("Wait for {} cancelled", self.description);
                            return Ok(PollOutcome::Fatal(PollFailure::Cancelled));
                        }
                    }
                }
                None => tokio::time::sleep(self.interval).await,
            }
        }
    }

    /// Run the polling loop and fold the outcome into a `Result`
    pub async fn wait_for<T, E, F, Fut>(self, refresh: F) -> Result<Option<T>, WaitError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<Observation<T>>, E>>,
    {
        let description = self.description.clone();
        let timeout = self.timeout;

        match self.wait(refresh).await? {
            PollOutcome::Success(object) => Ok(object),
            PollOutcome::Timeout { last_status } => Err(WaitError::Timeout {
                description,
                timeout,
                last_status,
            }),
            PollOutcome::Fatal(failure) => Err(WaitError::Fatal {
                description,
                failure,
            }),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }
}

/// Poll `refresh` until its status is in `target`.
///
/// Shorthand for [`StateWaiter::new`] with pending statuses and default options.
pub async fn poll<T, E, F, Fut>(
    refresh: F,
    target: &[&str],
    pending: &[&str],
    timeout: Duration,
    interval: Duration,
) -> Result<PollOutcome<T, E>, WaiterConfigError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<Observation<T>>, E>>,
{
    StateWaiter::new(target.iter().copied(), timeout, interval)
        .with_pending(pending.iter().copied())
        .wait(refresh)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Ready;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, Copy)]
    enum Step {
        Status(&'static str),
        Gone,
        Fail(&'static str),
    }

    type Refresh = Result<Option<Observation<usize>>, String>;

    /// Refresh function replaying `steps`; the last step repeats forever.
    /// The observed object is the 1-based call number.
    fn scripted(steps: Vec<Step>) -> (impl FnMut() -> Ready<Refresh>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let refresh = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let step = steps
                .get(n)
                .or(steps.last())
                .copied()
                .unwrap_or(Step::Gone);
            std::future::ready(match step {
                Step::Status(s) => Ok(Some(Observation::new(s, n + 1))),
                Step::Gone => Ok(None),
                Step::Fail(msg) => Err(msg.to_string()),
            })
        };
        (refresh, calls)
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_target_succeeds_without_sleeping() {
        let (refresh, calls) = scripted(vec![Step::Status("RUNNING")]);
        let start = Instant::now();

        let outcome = poll(refresh, &["RUNNING"], &["PENDING"], secs(10), secs(2))
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::Success(Some(1)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn reaches_target_on_third_call() {
        let (refresh, calls) = scripted(vec![
            Step::Status("CREATING"),
            Step::Status("CREATING"),
            Step::Status("RUNNING"),
        ]);
        let start = Instant::now();

        let outcome = poll(refresh, &["RUNNING"], &["CREATING"], secs(10), secs(2))
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::Success(Some(3)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let elapsed = start.elapsed();
        assert!(elapsed >= secs(4) && elapsed < secs(5), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn always_pending_times_out_within_one_interval() {
        let (refresh, calls) = scripted(vec![Step::Status("PENDING")]);
        let start = Instant::now();

        let outcome = poll(refresh, &["RUNNING"], &["PENDING"], secs(10), secs(3))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            PollOutcome::Timeout {
                last_status: Some("PENDING".to_string())
            }
        );
        let elapsed = start.elapsed();
        assert!(elapsed >= secs(10), "elapsed {:?}", elapsed);
        assert!(elapsed <= secs(13), "elapsed {:?}", elapsed);
        // t = 0, 3, 6, 9, 12
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_error_is_fatal_immediately() {
        let (refresh, calls) = scripted(vec![
            Step::Status("PENDING"),
            Step::Status("PENDING"),
            Step::Fail("boom"),
            Step::Status("RUNNING"),
        ]);

        let outcome = poll(refresh, &["RUNNING"], &["PENDING"], secs(60), secs(1))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            PollOutcome::Fatal(PollFailure::Refresh("boom".to_string()))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn same_script_yields_same_outcome() {
        let steps = vec![
            Step::Status("CREATING"),
            Step::Status("UPDATING"),
            Step::Status("RUNNING"),
        ];

        let (first, _) = scripted(steps.clone());
        let (second, _) = scripted(steps);
        let a = poll(first, &["RUNNING"], &["CREATING"], secs(30), secs(1))
            .await
            .unwrap();
        let b = poll(second, &["RUNNING"], &["CREATING"], secs(30), secs(1))
            .await
            .unwrap();

        assert_eq!(a, b);
        assert!(a.is_success());
    }

    #[tokio::test]
    async fn invalid_configuration_never_refreshes() {
        let cases: Vec<(&[&str], Duration, Duration, WaiterConfigError)> = vec![
            (&[], secs(10), secs(1), WaiterConfigError::EmptyTarget),
            (&["RUNNING"], Duration::ZERO, secs(1), WaiterConfigError::NonPositiveTimeout),
            (&["RUNNING"], secs(10), Duration::ZERO, WaiterConfigError::NonPositiveInterval),
        ];

        for (target, timeout, interval, expected) in cases {
            let (refresh, calls) = scripted(vec![Step::Status("RUNNING")]);
            let err = poll(refresh, target, &["PENDING"], timeout, interval)
                .await
                .unwrap_err();
            assert_eq!(err, expected);
            assert_eq!(calls.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn overlapping_sets_are_rejected() {
        let (refresh, calls) = scripted(vec![Step::Status("RUNNING")]);
        let err = poll(refresh, &["RUNNING"], &["RUNNING"], secs(10), secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, WaiterConfigError::OverlappingStatus("RUNNING".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn gone_is_success_when_accepted() {
        let (refresh, _) = scripted(vec![Step::Status("TERMINATING"), Step::Gone]);

        let outcome = StateWaiter::new(Vec::<String>::new(), secs(10), secs(1))
            .with_pending(["TERMINATING"])
            .accept_gone()
            .wait(refresh)
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::Success(None));
    }

    #[tokio::test(start_paused = true)]
    async fn gone_is_fatal_when_not_accepted() {
        let (refresh, calls) = scripted(vec![Step::Status("PENDING"), Step::Gone]);

        let outcome = poll(refresh, &["RUNNING"], &["PENDING"], secs(10), secs(1))
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::Fatal(PollFailure::Disappeared));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_checks_tolerate_lagging_reads() {
        let (refresh, _) = scripted(vec![Step::Gone, Step::Gone, Step::Status("UNATTACHED")]);
        let outcome = StateWaiter::new(["UNATTACHED"], secs(10), secs(1))
            .with_not_found_checks(2)
            .wait(refresh)
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Success(Some(3)));

        let (refresh, calls) =
            scripted(vec![Step::Gone, Step::Gone, Step::Status("UNATTACHED")]);
        let outcome = StateWaiter::new(["UNATTACHED"], secs(10), secs(1))
            .with_not_found_checks(1)
            .wait(refresh)
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Fatal(PollFailure::Disappeared));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_status_is_tolerated_by_default() {
        let (refresh, _) = scripted(vec![Step::Status("UNDOCUMENTED"), Step::Status("RUNNING")]);
        let outcome = poll(refresh, &["RUNNING"], &["PENDING"], secs(10), secs(1))
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Success(Some(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_status_is_fatal_in_strict_mode() {
        let (refresh, calls) = scripted(vec![
            Step::Status("PENDING"),
            Step::Status("LAUNCH_FAILED"),
        ]);
        let outcome = StateWaiter::new(["RUNNING"], secs(10), secs(1))
            .with_pending(["PENDING"])
            .strict_statuses()
            .wait(refresh)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            PollOutcome::Fatal(PollFailure::UnexpectedStatus("LAUNCH_FAILED".to_string()))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_sleep() {
        let (refresh, calls) = scripted(vec![Step::Status("PENDING")]);
        let token = CancellationToken::new();
        let child = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(secs(5)).await;
            child.cancel();
        });
        let start = Instant::now();

        let outcome = StateWaiter::new(["RUNNING"], secs(600), secs(2))
            .with_pending(["PENDING"])
            .with_cancellation(token)
            .wait(refresh)
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::Fatal(PollFailure::Cancelled));
        assert_eq!(start.elapsed(), secs(5));
        // t = 0, 2, 4
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cancelled_token_skips_refresh() {
        let (refresh, calls) = scripted(vec![Step::Status("RUNNING")]);
        let token = CancellationToken::new();
        token.cancel();

        let outcome = StateWaiter::new(["RUNNING"], secs(10), secs(1))
            .with_cancellation(token)
            .wait(refresh)
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::Fatal(PollFailure::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_distinguishes_timeout_from_fatal() {
        let (refresh, _) = scripted(vec![Step::Status("PENDING")]);
        let err = StateWaiter::new(["RUNNING"], secs(4), secs(1))
            .with_pending(["PENDING"])
            .with_description("instance ins-1 to start")
            .wait_for(refresh)
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(err.to_string().contains("instance ins-1 to start"));

        let (refresh, _) = scripted(vec![Step::Fail("AuthFailure")]);
        let err = StateWaiter::new(["RUNNING"], secs(4), secs(1))
            .with_description("instance ins-1 to start")
            .wait_for(refresh)
            .await
            .unwrap_err();
        assert!(!err.is_timeout());
        assert_eq!(
            err.to_string(),
            "waiting for instance ins-1 to start failed: AuthFailure"
        );
    }
}
