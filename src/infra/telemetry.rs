use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
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
            "verdura_cache_local_hit_total",
            Unit::Count,
            "Total number of local cache tier hits."
        );
        describe_counter!(
            "verdura_cache_local_miss_total",
            Unit::Count,
            "Total number of local cache tier misses."
        );
        describe_counter!(
            "verdura_cache_remote_hit_total",
            Unit::Count,
            "Total number of distributed cache tier hits."
        );
        describe_counter!(
            "verdura_cache_remote_error_total",
            Unit::Count,
            "Total number of distributed tier operations degraded to a miss."
        );
        describe_counter!(
            "verdura_cache_fetch_total",
            Unit::Count,
            "Total number of source-of-truth fetches after a full cache miss."
        );
        describe_counter!(
            "verdura_rate_limit_rejected_total",
            Unit::Count,
            "Total number of requests rejected by the rate limiter."
        );
        describe_counter!(
            "verdura_csrf_rejected_total",
            Unit::Count,
            "Total number of requests rejected by the CSRF guard."
        );
        describe_histogram!(
            "verdura_cache_remote_ping_ms",
            Unit::Milliseconds,
            "Distributed tier health probe latency in milliseconds."
        );
    });
}
