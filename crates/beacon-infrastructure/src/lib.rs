//! # Infrastructure Layer
//!
//! Everything impure: configuration loading, logging setup, the store and
//! queue adapters behind the domain ports, and the background maintenance
//! scheduler. The binary constructs these in `main` and passes them to the
//! application services as explicit handles; nothing here registers itself
//! anywhere.

/// Port adapters (stores, queues, resolver, archive, analyzer, mailer)
pub mod adapters;
/// Typed configuration from file + environment
pub mod config;
/// Global tracing subscriber setup
pub mod logging;
/// Daily/weekly maintenance loops
pub mod scheduler;

pub use config::AppConfig;
pub use logging::init_logging;
