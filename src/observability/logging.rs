//! # Structured Logging
//!
//! Logging setup on the tracing ecosystem plus span helpers for issuance work.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::ObservabilityConfig;

/// Create a tracing span for a single issuance attempt.
///
/// ```rust,ignore
/// let span = issuance_span!("in-process", owner_id = "user-1");
/// ```
#[macro_export]
macro_rules! issuance_span {
    ($strategy:expr) => {
        tracing::info_span!(
            "certificate_issuance",
            strategy = %$strategy,
            attempt_id = %uuid::Uuid::new_v4()
        )
    };
    ($strategy:expr, $($field:tt)*) => {
        tracing::info_span!(
            "certificate_issuance",
            strategy = %$strategy,
            attempt_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Create a tracing span for one step of the external-tool pipeline
#[macro_export]
macro_rules! pipeline_step_span {
    ($step:expr, $work_item:expr) => {
        tracing::debug_span!("pipeline_step", step = %$step, work_item = %$work_item)
    };
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level. Installing twice (tests, embedding)
/// is tolerated and reported as `false`.
pub fn init_logging(config: &ObservabilityConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    let result = if config.json_logging {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .try_init()
    };

    result.is_ok()
}

/// Log configuration at startup
pub fn log_config_info(config: &crate::config::Config) {
    tracing::info!(
        api_address = %config.api.socket_address(),
        signer = %config.signer.strategy,
        ca_cert_path = %config.ca.cert_path.display(),
        work_dir = %config.signer.work_dir.display(),
        max_concurrent_jobs = config.signer.max_concurrent_jobs,
        event_topic = %config.event_topic,
        metrics_enabled = config.observability.metrics_port != 0,
        "certforge configuration"
    );
}
