//! Circuit breaker for calls to external services.
//!
//! ```text
//!   Closed ──failures ≥ threshold──▶ Open
//!     ▲                               │ reset_timeout elapsed
//!     │ trial ok                      ▼
//!     └──────────────────────────── HalfOpen ──trial fails──▶ Open
//! ```
//!
//! A call that exceeds `call_timeout` is cancelled and counts as a failure.
//! While half-open exactly one trial call runs; everyone else is rejected as
//! if the circuit were still open.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use metrics::counter;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::cache::lock::mutex_lock;
use crate::config::BreakerSettings;

const SOURCE: &str = "infra::resilience::circuit_breaker";
const METRIC_CIRCUIT_TRANSITION: &str = "mediawatch_circuit_transition_total";
const METRIC_CIRCUIT_REJECTED: &str = "mediawatch_circuit_rejected_total";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub call_timeout: Duration,
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            call_timeout: Duration::from_secs(10),
            reset_timeout: Duration::from_secs(60),
        }
    }
}

impl From<BreakerSettings> for CircuitBreakerConfig {
    fn from(settings: BreakerSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold.get(),
            call_timeout: settings.call_timeout,
            reset_timeout: settings.reset_timeout,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CircuitError<E> {
    #[error("circuit is open, retry in {retry_after:?}")]
    Open { retry_after: Duration },
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Operation(E),
}

/// Point-in-time view for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failures: u32,
    pub failure_threshold: u32,
    /// Milliseconds until an open circuit admits a trial call.
    pub retry_after_ms: Option<u64>,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failures: u32,
    next_attempt: Option<Instant>,
    trial_in_flight: bool,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failures: 0,
                next_attempt: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> CircuitBreakerConfig {
        self.config
    }

    /// Current state. An open circuit whose reset timeout has elapsed still
    /// reports `Open` until the next call moves it to half-open.
    pub fn state(&self) -> CircuitState {
        mutex_lock(&self.inner, SOURCE, "state").state
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let now = Instant::now();
        let inner = mutex_lock(&self.inner, SOURCE, "snapshot");
        let retry_after_ms = match inner.state {
            CircuitState::Open => inner
                .next_attempt
                .map(|at| at.saturating_duration_since(now).as_millis() as u64),
            _ => None,
        };
        CircuitSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failures: inner.failures,
            failure_threshold: self.config.failure_threshold,
            retry_after_ms,
        }
    }

    /// Force the circuit closed and forget past failures.
    pub fn reset(&self) {
        let mut inner = mutex_lock(&self.inner, SOURCE, "reset");
        let previous = inner.state;
        inner.state = CircuitState::Closed;
        inner.failures = 0;
        inner.next_attempt = None;
        inner.trial_in_flight = false;
        if previous != CircuitState::Closed {
            self.transitioned(previous, CircuitState::Closed);
        }
    }

    /// Run `op` through the breaker.
    pub async fn call<T, E, F, Fut>(&self, op: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut permit = self.admit()?;

        match tokio::time::timeout(self.config.call_timeout, op()).await {
            Ok(Ok(value)) => {
                permit.settle(true);
                Ok(value)
            }
            Ok(Err(err)) => {
                permit.settle(false);
                Err(CircuitError::Operation(err))
            }
            Err(_) => {
                warn!(
                    target = "mediawatch::circuit_breaker",
                    breaker = %self.name,
                    timeout_ms = self.config.call_timeout.as_millis() as u64,
                    "call timed out"
                );
                permit.settle(false);
                Err(CircuitError::Timeout(self.config.call_timeout))
            }
        }
    }

    fn admit<E>(&self) -> Result<CallPermit<'_>, CircuitError<E>> {
        let now = Instant::now();
        let mut inner = mutex_lock(&self.inner, SOURCE, "admit");

        match inner.state {
            CircuitState::Closed => Ok(CallPermit::new(self, false)),
            CircuitState::Open => {
                let next_attempt = inner.next_attempt.unwrap_or(now);
                if now >= next_attempt {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    self.transitioned(CircuitState::Open, CircuitState::HalfOpen);
                    Ok(CallPermit::new(self, true))
                } else {
                    counter!(METRIC_CIRCUIT_REJECTED, "breaker" => self.name.clone()).increment(1);
                    Err(CircuitError::Open {
                        retry_after: next_attempt.saturating_duration_since(now),
                    })
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    counter!(METRIC_CIRCUIT_REJECTED, "breaker" => self.name.clone()).increment(1);
                    Err(CircuitError::Open {
                        retry_after: Duration::ZERO,
                    })
                } else {
                    inner.trial_in_flight = true;
                    Ok(CallPermit::new(self, true))
                }
            }
        }
    }

    fn record(&self, trial: bool, success: bool) {
        let now = Instant::now();
        let mut inner = mutex_lock(&self.inner, SOURCE, "record");
        if trial {
            inner.trial_in_flight = false;
        }

        match (inner.state, success) {
            (CircuitState::Closed, true) => inner.failures = 0,
            (CircuitState::Closed, false) => {
                inner.failures += 1;
                if inner.failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.next_attempt = Some(now + self.config.reset_timeout);
                    self.transitioned(CircuitState::Closed, CircuitState::Open);
                }
            }
            (CircuitState::HalfOpen, true) if trial => {
                inner.state = CircuitState::Closed;
                inner.failures = 0;
                inner.next_attempt = None;
                self.transitioned(CircuitState::HalfOpen, CircuitState::Closed);
            }
            (CircuitState::HalfOpen, false) if trial => {
                inner.state = CircuitState::Open;
                inner.failures += 1;
                inner.next_attempt = Some(now + self.config.reset_timeout);
                self.transitioned(CircuitState::HalfOpen, CircuitState::Open);
            }
            // Calls admitted while closed that finish after the circuit moved on.
            (_, false) => inner.failures += 1,
            (_, true) => {}
        }
    }

    fn release_trial(&self) {
        mutex_lock(&self.inner, SOURCE, "release_trial").trial_in_flight = false;
    }

    fn transitioned(&self, from: CircuitState, to: CircuitState) {
        counter!(
            METRIC_CIRCUIT_TRANSITION,
            "breaker" => self.name.clone(),
            "to" => to.as_str()
        )
        .increment(1);
        match to {
            CircuitState::Open => warn!(
                target = "mediawatch::circuit_breaker",
                breaker = %self.name,
                from = from.as_str(),
                reset_timeout_ms = self.config.reset_timeout.as_millis() as u64,
                "circuit opened"
            ),
            _ => info!(
                target = "mediawatch::circuit_breaker",
                breaker = %self.name,
                from = from.as_str(),
                to = to.as_str(),
                "circuit state changed"
            ),
        }
    }
}

/// Outcome slot for one admitted call. A permit dropped before settling
/// (caller cancelled) frees the half-open trial slot without judging the
/// service.
struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> CallPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            settled: false,
        }
    }

    fn settle(&mut self, success: bool) {
        self.settled = true;
        self.breaker.record(self.trial, success);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.breaker.release_trial();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn breaker(threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            "news",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                call_timeout: Duration::from_millis(100),
                reset_timeout: Duration::from_secs(30),
            },
        )
    }

    async fn fail(breaker: &CircuitBreaker) -> Result<(), CircuitError<&'static str>> {
        breaker.call(|| async { Err::<(), _>("upstream 503") }).await
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<u8, CircuitError<&'static str>> {
        breaker.call(|| async { Ok(1) }).await
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_threshold_and_rejects_without_calling() {
        let breaker = breaker(3);
        for _ in 0..3 {
            assert_eq!(
                fail(&breaker).await,
                Err(CircuitError::Operation("upstream 503"))
            );
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let mut invoked = false;
        let result = breaker
            .call(|| {
                invoked = true;
                async { Ok::<_, &str>(()) }
            })
            .await;
        assert!(!invoked);
        assert!(matches!(result, Err(CircuitError::Open { retry_after }) if retry_after == Duration::from_secs(30)));
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_the_failure_count() {
        let breaker = breaker(2);
        let _ = fail(&breaker).await;
        assert!(succeed(&breaker).await.is_ok());
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.snapshot().failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_trial_success_closes() {
        let breaker = breaker(1);
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(succeed(&breaker).await, Ok(1));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.snapshot().failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_trial_failure_reopens_with_fresh_timeout() {
        let breaker = breaker(1);
        let _ = fail(&breaker).await;
        tokio::time::advance(Duration::from_secs(31)).await;

        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.snapshot().retry_after_ms, Some(30_000));
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_count_as_failures() {
        let breaker = breaker(1);
        let result = breaker
            .call(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, &str>(())
            })
            .await;
        assert_eq!(result, Err(CircuitError::Timeout(Duration::from_millis(100))));
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn only_one_trial_runs_while_half_open() {
        let breaker = Arc::new(breaker(1));
        let _ = fail(&breaker).await;
        tokio::time::advance(Duration::from_secs(30)).await;

        let (release, wait) = tokio::sync::oneshot::channel::<()>();
        let trial = {
            let breaker = breaker.clone();
            tokio::spawn(async move {
                breaker
                    .call(|| async move {
                        let _ = wait.await;
                        Ok::<_, &str>(())
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let rejected = succeed(&breaker).await;
        assert!(matches!(rejected, Err(CircuitError::Open { .. })));

        release.send(()).expect("trial waiting");
        assert!(trial.await.expect("join").is_ok());
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_closes_immediately() {
        let breaker = breaker(1);
        let _ = fail(&breaker).await;
        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(succeed(&breaker).await, Ok(1));
    }
}
