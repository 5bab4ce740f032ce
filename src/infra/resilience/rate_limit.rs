//! Sliding-window admission control keyed by `(key, source)`.
//!
//! Each bucket keeps the timestamps of admitted requests inside the window of
//! its source's rule; a request is denied once the bucket holds
//! `max_requests` live entries.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use dashmap::DashMap;
use metrics::counter;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::cache::lock::mutex_lock;
use crate::config::{RateLimitRuleSettings, RateLimitSettings};
use crate::domain::types::ResilienceSource;

const SOURCE: &str = "infra::resilience::rate_limit";
const METRIC_RATE_LIMIT_DENIED: &str = "mediawatch_rate_limit_denied_total";
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    pub window: Duration,
    pub max_requests: u32,
}

impl RateLimitRule {
    pub const fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
        }
    }
}

impl From<RateLimitRuleSettings> for RateLimitRule {
    fn from(settings: RateLimitRuleSettings) -> Self {
        Self::new(settings.window, settings.max_requests.get())
    }
}

/// One rule per source.
#[derive(Debug, Clone)]
pub struct RateLimitRules {
    rules: HashMap<ResilienceSource, RateLimitRule>,
}

impl Default for RateLimitRules {
    fn default() -> Self {
        let rules = HashMap::from([
            (
                ResilienceSource::News,
                RateLimitRule::new(Duration::from_secs(24 * 60 * 60), 100),
            ),
            (
                ResilienceSource::Llm,
                RateLimitRule::new(Duration::from_secs(60), 50),
            ),
            (
                ResilienceSource::Storage,
                RateLimitRule::new(Duration::from_secs(60), 1000),
            ),
            (
                ResilienceSource::Default,
                RateLimitRule::new(Duration::from_secs(60), 100),
            ),
        ]);
        Self { rules }
    }
}

impl From<&RateLimitSettings> for RateLimitRules {
    fn from(settings: &RateLimitSettings) -> Self {
        let rules = HashMap::from([
            (ResilienceSource::News, settings.news.into()),
            (ResilienceSource::Llm, settings.llm.into()),
            (ResilienceSource::Storage, settings.storage.into()),
            (ResilienceSource::Default, settings.default.into()),
        ]);
        Self { rules }
    }
}

impl RateLimitRules {
    pub fn with_rule(mut self, source: ResilienceSource, rule: RateLimitRule) -> Self {
        self.rules.insert(source, rule);
        self
    }

    /// Rule for `source`; sources without one use the default bucket's rule.
    pub fn get(&self, source: ResilienceSource) -> RateLimitRule {
        self.rules
            .get(&source)
            .or_else(|| self.rules.get(&ResilienceSource::Default))
            .copied()
            .unwrap_or(RateLimitRule::new(Duration::from_secs(60), 100))
    }

    fn longest_window(&self) -> Duration {
        self.rules
            .values()
            .map(|rule| rule.window)
            .max()
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy)]
struct RequestEntry {
    at: Instant,
    priority: Priority,
    source: ResilienceSource,
}

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub limit: u32,
    /// Time until the oldest in-window entry leaves the window; set on denial.
    pub retry_after: Option<Duration>,
}

impl RateLimitDecision {
    /// `retry_after` rounded up to whole seconds, at least one.
    pub fn retry_after_secs(&self) -> u64 {
        let Some(wait) = self.retry_after else {
            return 0;
        };
        let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
        secs.max(1)
    }
}

/// Bounds for [`RateLimiter::wait_for_slot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub max_attempts: u32,
    pub max_wait: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            max_wait: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("no slot for `{key}` on {bucket} after {attempts} attempts")]
    WaitExhausted {
        key: String,
        bucket: ResilienceSource,
        attempts: u32,
        retry_after: Option<Duration>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimiterStats {
    pub tracked_keys: usize,
    pub entries_by_source: BTreeMap<String, usize>,
    pub entries_by_priority: BTreeMap<String, usize>,
}

pub struct RateLimiter {
    rules: RateLimitRules,
    buckets: DashMap<String, Vec<RequestEntry>>,
    sweep_interval: Duration,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl RateLimiter {
    pub fn new(rules: RateLimitRules) -> Self {
        Self {
            rules,
            buckets: DashMap::new(),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            sweeper: Mutex::new(None),
        }
    }

    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        Self::new(RateLimitRules::from(settings)).with_sweep_interval(settings.sweep_interval)
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval.max(Duration::from_secs(1));
        self
    }

    pub fn rule(&self, source: ResilienceSource) -> RateLimitRule {
        self.rules.get(source)
    }

    /// Admit or deny one request for `key` against `source`'s rule. Admitted
    /// requests are recorded.
    pub fn check(
        &self,
        key: &str,
        source: ResilienceSource,
        priority: Priority,
    ) -> RateLimitDecision {
        let rule = self.rule(source);
        let now = Instant::now();

        let mut bucket = self.buckets.entry(format!("{key}:{source}")).or_default();
        bucket.retain(|entry| now.saturating_duration_since(entry.at) < rule.window);

        let in_window = u32::try_from(bucket.len()).unwrap_or(u32::MAX);
        if in_window >= rule.max_requests {
            let retry_after = bucket
                .iter()
                .map(|entry| entry.at)
                .min()
                .map(|oldest| (oldest + rule.window).saturating_duration_since(now))
                .unwrap_or(rule.window);
            counter!(METRIC_RATE_LIMIT_DENIED, "source" => source.as_str()).increment(1);
            debug!(
                target = "mediawatch::rate_limit",
                key,
                source = source.as_str(),
                in_window,
                retry_after_ms = retry_after.as_millis() as u64,
                "request denied"
            );
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                limit: rule.max_requests,
                retry_after: Some(retry_after),
            };
        }

        bucket.push(RequestEntry {
            at: now,
            priority,
            source,
        });

        RateLimitDecision {
            allowed: true,
            remaining: rule.max_requests - in_window - 1,
            limit: rule.max_requests,
            retry_after: None,
        }
    }

    /// Retry [`check`](Self::check) until admitted, sleeping for the reported
    /// `retry_after` between attempts.
    ///
    /// Gives up after `policy.max_attempts` checks or once `policy.max_wait`
    /// has elapsed. Dropping the returned future abandons the wait.
    pub async fn wait_for_slot(
        &self,
        key: &str,
        source: ResilienceSource,
        priority: Priority,
        policy: WaitPolicy,
    ) -> Result<RateLimitDecision, RateLimitError> {
        let deadline = Instant::now() + policy.max_wait;
        let max_attempts = policy.max_attempts.max(1);
        let mut last_retry = None;
        let mut attempts = 0;

        for attempt in 1..=max_attempts {
            attempts = attempt;
            let decision = self.check(key, source, priority);
            if decision.allowed {
                return Ok(decision);
            }
            last_retry = decision.retry_after;

            let budget = deadline.saturating_duration_since(Instant::now());
            if attempt == max_attempts || budget.is_zero() {
                break;
            }

            let pause = decision
                .retry_after
                .unwrap_or_else(|| self.rule(source).window)
                .min(budget);
            debug!(
                target = "mediawatch::rate_limit",
                key,
                source = source.as_str(),
                attempt,
                pause_ms = pause.as_millis() as u64,
                "waiting for rate limit slot"
            );
            tokio::time::sleep(pause).await;
        }

        Err(RateLimitError::WaitExhausted {
            key: key.to_string(),
            bucket: source,
            attempts,
            retry_after: last_retry,
        })
    }

    /// Drop buckets with no entry inside the longest configured window.
    pub fn purge_expired(&self) -> usize {
        let horizon = self.rules.longest_window();
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets.retain(|_, entries| {
            entries.retain(|entry| now.saturating_duration_since(entry.at) < horizon);
            !entries.is_empty()
        });
        before.saturating_sub(self.buckets.len())
    }

    /// Forget every bucket for `key`.
    pub fn reset(&self, key: &str) {
        let prefix = format!("{key}:");
        self.buckets.retain(|bucket, _| !bucket.starts_with(&prefix));
    }

    pub fn stats(&self) -> RateLimiterStats {
        let mut entries_by_source = BTreeMap::new();
        for source in ResilienceSource::ALL {
            entries_by_source.insert(source.as_str().to_string(), 0);
        }
        let mut entries_by_priority = BTreeMap::new();
        for bucket in self.buckets.iter() {
            for entry in bucket.value() {
                *entries_by_source
                    .entry(entry.source.as_str().to_string())
                    .or_insert(0) += 1;
                *entries_by_priority
                    .entry(entry.priority.as_str().to_string())
                    .or_insert(0) += 1;
            }
        }
        RateLimiterStats {
            tracked_keys: self.buckets.len(),
            entries_by_source,
            entries_by_priority,
        }
    }

    /// Spawn the periodic purge. Calling it again while running is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut sweeper = mutex_lock(&self.sweeper, SOURCE, "start");
        if sweeper.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let limiter: Weak<Self> = Arc::downgrade(self);
        let period = self.sweep_interval;
        *sweeper = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(limiter) = limiter.upgrade() else {
                    break;
                };
                let purged = limiter.purge_expired();
                if purged > 0 {
                    debug!(
                        target = "mediawatch::rate_limit",
                        purged, "purged idle rate limit buckets"
                    );
                }
            }
        }));
        info!(
            target = "mediawatch::rate_limit",
            interval_secs = period.as_secs(),
            "rate limit sweep started"
        );
    }

    pub fn stop(&self) {
        if let Some(handle) = mutex_lock(&self.sweeper, SOURCE, "stop").take() {
            handle.abort();
            info!(target = "mediawatch::rate_limit", "rate limit sweep stopped");
        }
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        if let Some(handle) = mutex_lock(&self.sweeper, SOURCE, "drop").take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(source: ResilienceSource, window: Duration, max: u32) -> RateLimiter {
        RateLimiter::new(RateLimitRules::default().with_rule(source, RateLimitRule::new(window, max)))
    }

    #[tokio::test(start_paused = true)]
    async fn third_request_inside_window_is_denied() {
        let limiter = limiter(ResilienceSource::Llm, Duration::from_millis(1000), 2);

        let first = limiter.check("digest", ResilienceSource::Llm, Priority::Normal);
        tokio::time::advance(Duration::from_millis(40)).await;
        let second = limiter.check("digest", ResilienceSource::Llm, Priority::Normal);
        tokio::time::advance(Duration::from_millis(40)).await;
        let third = limiter.check("digest", ResilienceSource::Llm, Priority::Normal);

        assert!(first.allowed);
        assert_eq!(first.remaining, 1);
        assert!(second.allowed);
        assert_eq!(second.remaining, 0);
        assert!(!third.allowed);
        assert_eq!(third.retry_after, Some(Duration::from_millis(920)));
        assert_eq!(third.retry_after_secs(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn window_slides() {
        let limiter = limiter(ResilienceSource::Llm, Duration::from_millis(1000), 1);
        assert!(limiter.check("k", ResilienceSource::Llm, Priority::Normal).allowed);
        assert!(!limiter.check("k", ResilienceSource::Llm, Priority::Normal).allowed);

        tokio::time::advance(Duration::from_millis(1000)).await;
        assert!(limiter.check("k", ResilienceSource::Llm, Priority::Normal).allowed);
    }

    #[test]
    fn keys_and_sources_are_independent() {
        let limiter = limiter(ResilienceSource::News, Duration::from_secs(60), 1);
        assert!(limiter.check("a", ResilienceSource::News, Priority::Normal).allowed);
        assert!(limiter.check("b", ResilienceSource::News, Priority::Normal).allowed);
        assert!(limiter.check("a", ResilienceSource::Llm, Priority::Normal).allowed);
        assert!(!limiter.check("a", ResilienceSource::News, Priority::High).allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_slot_sleeps_until_admitted() {
        let limiter = limiter(ResilienceSource::Llm, Duration::from_secs(2), 1);
        assert!(limiter.check("k", ResilienceSource::Llm, Priority::Normal).allowed);

        let started = Instant::now();
        let decision = limiter
            .wait_for_slot("k", ResilienceSource::Llm, Priority::Normal, WaitPolicy::default())
            .await
            .expect("slot");
        assert!(decision.allowed);
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_slot_gives_up_at_the_deadline() {
        let limiter = limiter(ResilienceSource::News, Duration::from_secs(3600), 1);
        assert!(limiter.check("k", ResilienceSource::News, Priority::Normal).allowed);

        let policy = WaitPolicy {
            max_attempts: 100,
            max_wait: Duration::from_secs(5),
        };
        let err = limiter
            .wait_for_slot("k", ResilienceSource::News, Priority::Normal, policy)
            .await
            .expect_err("exhausted");
        assert!(matches!(
            err,
            RateLimitError::WaitExhausted {
                bucket: ResilienceSource::News,
                attempts: 2,
                ..
            }
        ));
        assert_eq!(err.to_string(), "no slot for `k` on news after 2 attempts");
        assert!(std::error::Error::source(&err).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_idle_buckets() {
        let limiter = RateLimiter::new(
            RateLimitRules::default()
                .with_rule(ResilienceSource::News, RateLimitRule::new(Duration::from_secs(10), 5))
                .with_rule(ResilienceSource::Llm, RateLimitRule::new(Duration::from_secs(10), 5))
                .with_rule(ResilienceSource::Storage, RateLimitRule::new(Duration::from_secs(10), 5))
                .with_rule(ResilienceSource::Default, RateLimitRule::new(Duration::from_secs(10), 5)),
        );
        limiter.check("old", ResilienceSource::Llm, Priority::Normal);
        tokio::time::advance(Duration::from_secs(8)).await;
        limiter.check("fresh", ResilienceSource::Llm, Priority::Normal);
        tokio::time::advance(Duration::from_secs(3)).await;

        assert_eq!(limiter.purge_expired(), 1);
        let stats = limiter.stats();
        assert_eq!(stats.tracked_keys, 1);
        assert_eq!(stats.entries_by_source["llm"], 1);
        assert_eq!(stats.entries_by_source["news"], 0);
        assert_eq!(stats.entries_by_priority["normal"], 1);
    }

    #[test]
    fn default_rules_match_documented_quotas() {
        let rules = RateLimitRules::default();
        assert_eq!(rules.get(ResilienceSource::News).max_requests, 100);
        assert_eq!(
            rules.get(ResilienceSource::News).window,
            Duration::from_secs(86_400)
        );
        assert_eq!(rules.get(ResilienceSource::Llm).max_requests, 50);
        assert_eq!(rules.get(ResilienceSource::Storage).max_requests, 1000);
        assert_eq!(rules.get(ResilienceSource::Default).max_requests, 100);
    }
}
