//! # Domain Layer
//!
//! Core business types for the Beacon telemetry platform: entities, the
//! error taxonomy, the pure fingerprint and stack-parsing services, and the
//! port interfaces every adapter implements.
//!
//! ## Architecture
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`entities`] | Error logs, aggregations, source archives, projects |
//! | [`fingerprint`] | Structural error hashing (pure) |
//! | [`stack`] | Browser stack-trace parsing (pure) |
//! | [`ports`] | Adapter seams: stores, queues, resolver, analyzer |
//! | [`error`] | Workspace-wide error taxonomy |
//!
//! The domain crate depends on nothing that does I/O. Everything impure is
//! behind a port trait.

/// Core business entities
pub mod entities;
/// Domain error types
pub mod error;
/// Structural error fingerprinting
pub mod fingerprint;
/// Adapter port interfaces
pub mod ports;
/// Stack trace parsing
pub mod stack;

pub use error::{Error, Result};
