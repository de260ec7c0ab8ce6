//! Structured logging setup.
//!
//! The hook protocol reserves standard output for the single JSON result, so
//! every subscriber installed here writes to standard error.

use crate::config::LoggingConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. Safe to call more than once; later calls are no-ops.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str().to_lowercase()));

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json_format {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };

    if result.is_ok() {
        tracing::debug!(app = %config.app_name, "Logging initialized");
    }
}
