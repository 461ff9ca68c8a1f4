use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::{
    cache::{
        METRIC_BYPASS, METRIC_HIT, METRIC_INVALIDATED, METRIC_MISS, METRIC_STORE_ERROR,
        METRIC_WRITE,
    },
    config::{LogFormat, LoggingSettings},
};

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

/// Register descriptions for the gateway's counters with the installed recorder.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_HIT,
            Unit::Count,
            "Responses served from the cache store."
        );
        describe_counter!(
            METRIC_MISS,
            Unit::Count,
            "Cacheable requests forwarded because no entry was found or the lookup failed."
        );
        describe_counter!(
            METRIC_BYPASS,
            Unit::Count,
            "Requests on caching routes that the cacheability policy excluded."
        );
        describe_counter!(
            METRIC_WRITE,
            Unit::Count,
            "Response bodies written to the cache store."
        );
        describe_counter!(
            METRIC_STORE_ERROR,
            Unit::Count,
            "Cache store operations that failed or timed out, by kind."
        );
        describe_counter!(
            METRIC_INVALIDATED,
            Unit::Count,
            "Cache entries removed by invalidation."
        );
    });
}
