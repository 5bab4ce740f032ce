//! Rate limiter and circuit breaker composed per external source.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::config::{CircuitBreakerSettings, RateLimitSettings};
use crate::domain::types::ResilienceSource;

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitError, CircuitSnapshot};
use super::rate_limit::{Priority, RateLimitError, RateLimiter, RateLimiterStats, WaitPolicy};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GuardError<E> {
    #[error("rate limited, retry in {retry_after:?}")]
    RateLimited { retry_after: Duration },
    #[error(transparent)]
    Wait(#[from] RateLimitError),
    #[error(transparent)]
    Circuit(CircuitError<E>),
}

impl<E> From<CircuitError<E>> for GuardError<E> {
    fn from(err: CircuitError<E>) -> Self {
        GuardError::Circuit(err)
    }
}

/// One external source behind admission control and a breaker.
pub struct GuardedSource {
    source: ResilienceSource,
    limiter: Arc<RateLimiter>,
    breaker: CircuitBreaker,
}

impl GuardedSource {
    pub fn new(source: ResilienceSource, limiter: Arc<RateLimiter>, breaker: CircuitBreaker) -> Self {
        Self {
            source,
            limiter,
            breaker,
        }
    }

    pub fn source(&self) -> ResilienceSource {
        self.source
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Fail fast when `key` has no slot left on this source.
    pub async fn call<T, E, F, Fut>(&self, key: &str, op: F) -> Result<T, GuardError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let decision = self.limiter.check(key, self.source, Priority::Normal);
        if !decision.allowed {
            return Err(GuardError::RateLimited {
                retry_after: decision.retry_after.unwrap_or_default(),
            });
        }
        Ok(self.breaker.call(op).await?)
    }

    /// Wait for a slot within `policy` before calling through the breaker.
    pub async fn call_waiting<T, E, F, Fut>(
        &self,
        key: &str,
        priority: Priority,
        policy: WaitPolicy,
        op: F,
    ) -> Result<T, GuardError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.limiter
            .wait_for_slot(key, self.source, priority, policy)
            .await?;
        Ok(self.breaker.call(op).await?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResilienceReport {
    pub breakers: Vec<CircuitSnapshot>,
    pub limiter: RateLimiterStats,
}

/// Guards for the outbound integrations, sharing one limiter with the
/// admin write path.
pub struct ResilienceRegistry {
    limiter: Arc<RateLimiter>,
    news: GuardedSource,
    llm: GuardedSource,
}

impl ResilienceRegistry {
    pub fn new(
        limiter: Arc<RateLimiter>,
        news: CircuitBreakerConfig,
        llm: CircuitBreakerConfig,
    ) -> Self {
        Self {
            news: GuardedSource::new(
                ResilienceSource::News,
                limiter.clone(),
                CircuitBreaker::new(ResilienceSource::News.as_str(), news),
            ),
            llm: GuardedSource::new(
                ResilienceSource::Llm,
                limiter.clone(),
                CircuitBreaker::new(ResilienceSource::Llm.as_str(), llm),
            ),
            limiter,
        }
    }

    pub fn from_settings(rate_limit: &RateLimitSettings, breakers: &CircuitBreakerSettings) -> Self {
        Self::new(
            Arc::new(RateLimiter::from_settings(rate_limit)),
            breakers.news.into(),
            breakers.llm.into(),
        )
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn news(&self) -> &GuardedSource {
        &self.news
    }

    pub fn llm(&self) -> &GuardedSource {
        &self.llm
    }

    pub fn report(&self) -> ResilienceReport {
        ResilienceReport {
            breakers: vec![self.news.breaker.snapshot(), self.llm.breaker.snapshot()],
            limiter: self.limiter.stats(),
        }
    }
}
