//! Wait-for-network-and-retry controller.
//!
//! Wraps a re-invocable producer (a stream or a future factory). When the
//! producer fails with a connectivity failure the controller waits until the
//! connectivity observer reports the network (and optionally the internet) as
//! available, then invokes the producer again. Other failures, and running out
//! of attempts, end the operation.
//!
//! ```text
//!            ┌──────────── Ok(item) ──────────┐
//!            ▼                                │
//!   ──▶  Running ──── end of stream ────▶ Succeeded
//!         │   ▲
//!         │   └──── network is back ───┐
//!         │ connectivity failure       │
//!         ├─────────────────────────▶ Waiting
//!         │ fatal failure / exhausted  │ observer ended
//!         ▼                            ▼
//!       Failed(kind) ◀─────────────────┘
//! ```

use crate::config::{Backoff, RetryConfig};
use crate::error::{RetryError, Result};
use crate::network::classify::{ClassifyFailure, FailureKind};
use crate::network::connectivity::{wait_for_network, DynConnectivityObserver};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Attempt bookkeeping for one retry sequence.
///
/// `attempt` counts resumptions after a connectivity wait; the initial
/// invocation is not an attempt. Values are replaced, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    attempt: u32,
    max_attempts: u32,
}

impl RetryState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempt: 0,
            max_attempts,
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Number of producer invocations made so far, counting the current one.
    pub fn invocations(&self) -> u32 {
        self.attempt + 1
    }

    /// Whether a failure of the current invocation uses up the budget.
    pub fn is_last(&self) -> bool {
        self.invocations() >= self.max_attempts
    }

    /// State for the next resumption.
    #[must_use]
    pub fn next(self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self
        }
    }
}

/// Callback invoked with the attempt number each time a wait begins.
pub type WaitingCallback = Arc<dyn Fn(u32) + Send + Sync>;

/// What to do with a producer failure.
enum Decision<E> {
    Retry(RetryState),
    Fail(RetryError<E>, FailureKind),
}

/// Network retry controller.
///
/// Cheap to clone; every call to [`stream`](Self::stream) or
/// [`run`](Self::run) owns its own [`RetryState`].
#[derive(Clone)]
pub struct NetworkRetry {
    observer: DynConnectivityObserver,
    config: RetryConfig,
    on_waiting: Option<WaitingCallback>,
}

impl std::fmt::Debug for NetworkRetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkRetry")
            .field("config", &self.config)
            .field("on_waiting", &self.on_waiting.is_some())
            .finish_non_exhaustive()
    }
}

impl NetworkRetry {
    /// Create a controller from a configuration.
    pub fn new(observer: DynConnectivityObserver, config: RetryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            observer,
            config,
            on_waiting: None,
        })
    }

    pub fn builder(observer: DynConnectivityObserver) -> NetworkRetryBuilder {
        NetworkRetryBuilder {
            observer,
            config: RetryConfig::default(),
            on_waiting: None,
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run a stream producer under network retry.
    ///
    /// Items already forwarded stay forwarded when a later connectivity
    /// failure triggers a retry; the re-invoked producer starts over.
    /// Dropping the returned stream drops the in-flight producer stream and
    /// any pending connectivity wait.
    pub fn stream<F, S, T, E>(
        &self,
        producer: F,
    ) -> BoxStream<'static, std::result::Result<T, RetryError<E>>>
    where
        F: FnMut() -> S + Send + 'static,
        S: Stream<Item = std::result::Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: ClassifyFailure + Display + Send + 'static,
    {
        let state = StreamState {
            retry: self.clone(),
            producer,
            retry_state: RetryState::new(self.config.max_attempts),
            phase: Phase::Starting,
        };

        stream::unfold(state, |mut state| async move {
            let item = next_item(&mut state).await?;
            Some((item, state))
        })
        .boxed()
    }

    /// Run a one-shot async operation under network retry.
    pub async fn run<F, Fut, T, E>(
        &self,
        mut factory: F,
    ) -> std::result::Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: ClassifyFailure + Display,
    {
        if self.config.check_before_first_attempt {
            self.reconnect::<E>(None).await?;
        }

        let mut state = RetryState::new(self.config.max_attempts);
        loop {
            match factory().await {
                Ok(value) => {
                    if state.attempt() > 0 {
                        debug!(attempt = state.attempt(), "Operation succeeded after reconnecting");
                    }
                    return Ok(value);
                }
                Err(e) => match self.decide(state, e) {
                    Decision::Retry(next) => {
                        state = next;
                        self.reconnect::<E>(Some(state.attempt())).await?;
                    }
                    Decision::Fail(err, _) => return Err(err),
                },
            }
        }
    }

    /// Classify a failure and count it against the budget.
    ///
    /// Fatal failures are never counted: they surface unchanged no matter how
    /// many attempts remain.
    fn decide<E>(&self, state: RetryState, error: E) -> Decision<E>
    where
        E: ClassifyFailure + Display,
    {
        match error.failure_kind() {
            FailureKind::Fatal => {
                error!(error = %error, "Caught a non-network error");
                Decision::Fail(RetryError::Fatal(error), FailureKind::Fatal)
            }
            FailureKind::Connectivity if state.is_last() => {
                error!(
                    max_attempts = state.max_attempts(),
                    error = %error,
                    "Could not establish network connection after {} attempts",
                    state.invocations()
                );
                Decision::Fail(
                    RetryError::TooManyAttempts {
                        max_attempts: state.max_attempts(),
                        last_error: error,
                    },
                    FailureKind::Connectivity,
                )
            }
            FailureKind::Connectivity => {
                let next = state.next();
                warn!(
                    attempt = next.attempt(),
                    max_attempts = next.max_attempts(),
                    error = %error,
                    "Lost network connection, waiting for reconnection"
                );
                if let Some(callback) = &self.on_waiting {
                    callback(next.attempt());
                }
                Decision::Retry(next)
            }
        }
    }

    /// Wait for the network, then sleep the backoff delay if one is set.
    async fn reconnect<E>(&self, attempt: Option<u32>) -> std::result::Result<(), RetryError<E>> {
        wait_for_network(self.observer.as_ref(), self.config.check_internet)
            .await
            .map_err(|e| {
                error!(error = %e, "Gave up waiting for the network");
                RetryError::<E>::ConnectivityUnavailable
            })?;

        if let (Some(attempt), Some(backoff)) = (attempt, &self.config.backoff) {
            sleep_backoff(backoff, attempt).await;
        }
        Ok(())
    }
}

async fn sleep_backoff(backoff: &Backoff, attempt: u32) {
    let delay = backoff.calculate_delay(attempt);
    if !delay.is_zero() {
        debug!(attempt, ?delay, "Backing off before retrying");
        tokio::time::sleep(delay).await;
    }
}

/// Builder for [`NetworkRetry`].
pub struct NetworkRetryBuilder {
    observer: DynConnectivityObserver,
    config: RetryConfig,
    on_waiting: Option<WaitingCallback>,
}

impl NetworkRetryBuilder {
    /// Replace the whole configuration.
    pub fn config(mut self, config: RetryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    pub fn check_internet(mut self, check: bool) -> Self {
        self.config.check_internet = check;
        self
    }

    pub fn check_before_first_attempt(mut self, check: bool) -> Self {
        self.config.check_before_first_attempt = check;
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.config.backoff = Some(backoff);
        self
    }

    /// Called with the attempt number each time a connectivity wait begins.
    pub fn on_waiting(mut self, callback: impl Fn(u32) + Send + Sync + 'static) -> Self {
        self.on_waiting = Some(Arc::new(callback));
        self
    }

    pub fn build(self) -> Result<NetworkRetry> {
        let mut retry = NetworkRetry::new(self.observer, self.config)?;
        retry.on_waiting = self.on_waiting;
        Ok(retry)
    }
}

/// Run `producer` under network retry with the given configuration.
pub fn with_network_retry<F, S, T, E>(
    observer: DynConnectivityObserver,
    config: RetryConfig,
    on_waiting: impl Fn(u32) + Send + Sync + 'static,
    producer: F,
) -> Result<BoxStream<'static, std::result::Result<T, RetryError<E>>>>
where
    F: FnMut() -> S + Send + 'static,
    S: Stream<Item = std::result::Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: ClassifyFailure + Display + Send + 'static,
{
    let retry = NetworkRetry::builder(observer)
        .config(config)
        .on_waiting(on_waiting)
        .build()?;
    Ok(retry.stream(producer))
}

enum Phase<S> {
    /// Nothing invoked yet.
    Starting,
    Running(Pin<Box<S>>),
    Waiting,
    Succeeded,
    Failed(FailureKind),
}

struct StreamState<F, S> {
    retry: NetworkRetry,
    producer: F,
    retry_state: RetryState,
    phase: Phase<S>,
}

async fn next_item<F, S, T, E>(
    state: &mut StreamState<F, S>,
) -> Option<std::result::Result<T, RetryError<E>>>
where
    F: FnMut() -> S,
    S: Stream<Item = std::result::Result<T, E>>,
    E: ClassifyFailure + Display,
{
    loop {
        match &mut state.phase {
            Phase::Starting => {
                if state.retry.config.check_before_first_attempt {
                    if let Err(err) = state.retry.reconnect(None).await {
                        state.phase = Phase::Failed(FailureKind::Connectivity);
                        return Some(Err(err));
                    }
                }
                state.phase = Phase::Running(Box::pin((state.producer)()));
            }
            Phase::Running(inner) => match inner.next().await {
                Some(Ok(item)) => return Some(Ok(item)),
                Some(Err(e)) => match state.retry.decide(state.retry_state, e) {
                    Decision::Retry(next) => {
                        state.retry_state = next;
                        state.phase = Phase::Waiting;
                    }
                    Decision::Fail(err, kind) => {
                        debug!(?kind, attempt = state.retry_state.attempt(), "Network retry failed");
                        state.phase = Phase::Failed(kind);
                        return Some(Err(err));
                    }
                },
                None => {
                    state.phase = Phase::Succeeded;
                    return None;
                }
            },
            Phase::Waiting => {
                let attempt = state.retry_state.attempt();
                match state.retry.reconnect(Some(attempt)).await {
                    Ok(()) => state.phase = Phase::Running(Box::pin((state.producer)())),
                    Err(err) => {
                        state.phase = Phase::Failed(FailureKind::Connectivity);
                        return Some(Err(err));
                    }
                }
            }
            Phase::Succeeded | Phase::Failed(_) => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::monitor::ConnectivityMonitor;
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn online() -> DynConnectivityObserver {
        Arc::new(ConnectivityMonitor::new(true))
    }

    #[test]
    fn test_retry_state_progression() {
        let state = RetryState::new(3);
        assert_eq!(state.attempt(), 0);
        assert_eq!(state.invocations(), 1);
        assert!(!state.is_last());

        let state = state.next().next();
        assert_eq!(state.attempt(), 2);
        assert!(state.is_last());
        assert_eq!(state.max_attempts(), 3);
    }

    #[test]
    fn test_single_attempt_is_immediately_last() {
        assert!(RetryState::new(1).is_last());
    }

    #[test]
    fn test_builder_rejects_zero_attempts() {
        let result = NetworkRetry::builder(online()).max_attempts(0).build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_run_succeeds_first_try() {
        let retry = NetworkRetry::builder(online()).build().unwrap();
        let result: std::result::Result<i32, RetryError<io::Error>> =
            retry.run(|| async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_run_retries_connectivity_failures() {
        let waits = Arc::new(Mutex::new(Vec::new()));
        let waits_clone = waits.clone();
        let retry = NetworkRetry::builder(online())
            .max_attempts(3)
            .on_waiting(move |attempt| waits_clone.lock().unwrap().push(attempt))
            .build()
            .unwrap();

        let calls = Arc::new(AtomicU32::new(0));
        let result = retry
            .run(|| {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(io::Error::new(io::ErrorKind::TimedOut, "timed out"))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(*waits.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_run_exhausts_budget() {
        let retry = NetworkRetry::builder(online()).max_attempts(2).build().unwrap();
        let calls = AtomicU32::new(0);
        let result: std::result::Result<(), _> = retry
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")) }
            })
            .await;

        let err = result.unwrap_err();
        assert!(err.is_exhausted());
        assert_eq!(err.attempts(), Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_delays_resumption() {
        let retry = NetworkRetry::builder(online())
            .max_attempts(2)
            .backoff(
                Backoff::new()
                    .with_base_delay(std::time::Duration::from_secs(3))
                    .with_jitter(false),
            )
            .build()
            .unwrap();

        let started = tokio::time::Instant::now();
        let calls = AtomicU32::new(0);
        let result = retry
            .run(|| {
                let first = calls.fetch_add(1, Ordering::SeqCst) == 0;
                async move {
                    if first {
                        Err(io::Error::new(io::ErrorKind::TimedOut, "slow"))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert!(started.elapsed() >= std::time::Duration::from_secs(3));
    }
}
