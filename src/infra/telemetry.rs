use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "mediawatch_cache_hit_total",
            Unit::Count,
            "Total number of read-through cache hits."
        );
        describe_counter!(
            "mediawatch_cache_miss_total",
            Unit::Count,
            "Total number of read-through cache misses, expired entries included."
        );
        describe_counter!(
            "mediawatch_cache_evict_total",
            Unit::Count,
            "Total number of cache entries evicted to stay within capacity."
        );
        describe_gauge!(
            "mediawatch_cache_entries",
            Unit::Count,
            "Current number of entries held by the cache store."
        );
        describe_counter!(
            "mediawatch_rate_limit_denied_total",
            Unit::Count,
            "Total number of requests refused by the sliding-window limiter, by source."
        );
        describe_counter!(
            "mediawatch_circuit_transition_total",
            Unit::Count,
            "Total number of circuit breaker state changes, by breaker and target state."
        );
        describe_counter!(
            "mediawatch_circuit_rejected_total",
            Unit::Count,
            "Total number of calls short-circuited by an open breaker."
        );
    });
}
