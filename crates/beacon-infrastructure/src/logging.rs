//! Structured logging with tracing
//!
//! One global subscriber, configured from [`LoggingConfig`]. Workers attach
//! the job id as a correlation field on every record; nothing in the
//! pipeline swallows an error silently — failed mirrors, parses, and syncs
//! all land here.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Install the global subscriber. Safe to call once per process; later
/// calls are ignored so tests can race.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter.clone()));

    if config.json {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(true)
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init();
    }
}
