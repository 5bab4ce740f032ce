//! Admission control and failure isolation for outbound calls and admin
//! writes.

pub mod circuit_breaker;
pub mod guard;
pub mod rate_limit;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitError, CircuitSnapshot, CircuitState};
pub use guard::{GuardError, GuardedSource, ResilienceRegistry, ResilienceReport};
pub use rate_limit::{
    Priority, RateLimitDecision, RateLimitError, RateLimitRule, RateLimitRules, RateLimiter,
    RateLimiterStats, WaitPolicy,
};
