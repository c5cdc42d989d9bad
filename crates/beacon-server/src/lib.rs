//! # HTTP Control Surface
//!
//! Axum routes mapping the external interface onto the application
//! services: intake, triage, source archives, error location, AI
//! diagnosis, queue management, and columnar maintenance. Every response
//! uses the `{success, message, data?}` envelope; errors map the domain
//! taxonomy onto status codes without leaking internals.

/// Bearer and api-key authentication
pub mod auth;
/// Taxonomy → HTTP status mapping
pub mod error;
/// Request handlers grouped by surface area
pub mod handlers;
/// Success envelope
pub mod response;
/// Router assembly
pub mod routes;
/// Shared handler state
pub mod state;

pub use routes::router;
pub use state::AppState;
