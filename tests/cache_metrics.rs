use std::collections::HashSet;
use std::time::Duration;

use mediawatch::cache::{CacheConfig, CacheStore};
use mediawatch::domain::types::ResilienceSource;
use mediawatch::infra::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitError, Priority, RateLimitRule, RateLimitRules,
    RateLimiter,
};
use metrics_util::debugging::{DebugValue, DebuggingRecorder};

#[tokio::test]
async fn read_and_resilience_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    // Cache hit/miss/evict
    let store = CacheStore::new(&CacheConfig {
        max_entries: 1,
        ..CacheConfig::default()
    });
    assert!(store.get::<String>("articles:detail:1:en").is_none());
    store.set("articles:detail:1:en", "first".to_string(), None);
    assert_eq!(
        store.get::<String>("articles:detail:1:en").as_deref(),
        Some("first")
    );
    store.set("articles:detail:2:en", "second".to_string(), None);

    // Rate limiter denial
    let limiter = RateLimiter::new(RateLimitRules::default().with_rule(
        ResilienceSource::Llm,
        RateLimitRule {
            window: Duration::from_secs(60),
            max_requests: 1,
        },
    ));
    assert!(limiter.check("summaries", ResilienceSource::Llm, Priority::Normal).allowed);
    assert!(!limiter.check("summaries", ResilienceSource::Llm, Priority::Normal).allowed);

    // Circuit transition and rejection
    let breaker = CircuitBreaker::new(
        "news",
        CircuitBreakerConfig {
            failure_threshold: 1,
            call_timeout: Duration::from_secs(1),
            reset_timeout: Duration::from_secs(60),
        },
    );
    let failed = breaker.call(|| async { Err::<(), _>("feed unavailable") }).await;
    assert!(matches!(failed, Err(CircuitError::Operation("feed unavailable"))));
    let rejected = breaker.call(|| async { Ok::<_, &str>(()) }).await;
    assert!(matches!(rejected, Err(CircuitError::Open { .. })));

    let snapshot = snapshotter.snapshot().into_vec();
    let names: HashSet<String> = snapshot
        .iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "mediawatch_cache_hit_total",
        "mediawatch_cache_miss_total",
        "mediawatch_cache_evict_total",
        "mediawatch_cache_entries",
        "mediawatch_rate_limit_denied_total",
        "mediawatch_circuit_transition_total",
        "mediawatch_circuit_rejected_total",
    ];
    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }

    let denied_llm = snapshot.iter().find_map(|(composite_key, _, _, value)| {
        let key = composite_key.key();
        let is_llm = key
            .labels()
            .any(|label| label.key() == "source" && label.value() == "llm");
        match value {
            DebugValue::Counter(count)
                if key.name() == "mediawatch_rate_limit_denied_total" && is_llm =>
            {
                Some(*count)
            }
            _ => None,
        }
    });
    assert_eq!(denied_llm, Some(1));
}
