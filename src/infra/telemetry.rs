use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::{
    METRIC_DB_ERROR, METRIC_DB_HIT, METRIC_DB_MISS, METRIC_FILE_HIT, METRIC_FILE_MISS,
    METRIC_FILE_WRITE_ERROR,
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
            METRIC_DB_HIT,
            Unit::Count,
            "Total number of primary-store cache hits."
        );
        describe_counter!(
            METRIC_DB_MISS,
            Unit::Count,
            "Total number of primary-store cache misses (absent or expired rows)."
        );
        describe_counter!(
            METRIC_DB_ERROR,
            Unit::Count,
            "Total number of failed or timed-out primary-store operations."
        );
        describe_counter!(
            METRIC_FILE_HIT,
            Unit::Count,
            "Total number of file-tier cache hits."
        );
        describe_counter!(
            METRIC_FILE_MISS,
            Unit::Count,
            "Total number of file-tier cache misses."
        );
        describe_counter!(
            METRIC_FILE_WRITE_ERROR,
            Unit::Count,
            "Total number of lost file-tier cache writes."
        );
    });
}
