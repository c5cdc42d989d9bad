//! Error handling types
//!
//! One taxonomy for the whole workspace. The HTTP layer maps variants to
//! status codes; workers re-raise into the queue fabric's retry pipeline.

use thiserror::Error;

/// Result type alias for operations that can fail
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed source error carried by variants that wrap external failures
type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for the Beacon telemetry core
#[derive(Error, Debug)]
pub enum Error {
    /// Client sent a malformed or out-of-bounds request
    #[error("Bad request: {message}")]
    BadRequest {
        /// What was wrong with the request
        message: String,
    },

    /// Resource not found
    #[error("Not found: {resource}")]
    NotFound {
        /// The resource that was not found
        resource: String,
    },

    /// State conflict (illegal status transition, duplicate key)
    #[error("Conflict: {message}")]
    Conflict {
        /// Description of the conflicting state
        message: String,
    },

    /// Missing or invalid credentials
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Why authentication failed
        message: String,
    },

    /// Authenticated but not allowed
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Why the operation was refused
        message: String,
    },

    /// Deadline expired before the operation completed
    #[error("Timeout: {operation}")]
    Timeout {
        /// The operation that timed out
        operation: String,
    },

    /// A backing store is disconnected or refusing work
    #[error("Unavailable: {message}")]
    Unavailable {
        /// Description of the outage
        message: String,
        /// Optional source error
        #[source]
        source: Option<BoxedSource>,
    },

    /// Relational store operation error
    #[error("Database error: {message}")]
    Database {
        /// Description of the database error
        message: String,
        /// Optional source error
        #[source]
        source: Option<BoxedSource>,
    },

    /// Columnar store operation error
    #[error("Log store error: {message}")]
    LogStore {
        /// Description of the log store error
        message: String,
        /// Optional source error
        #[source]
        source: Option<BoxedSource>,
    },

    /// Queue fabric operation error
    #[error("Queue error: {message}")]
    Queue {
        /// Description of the queue error
        message: String,
        /// Optional source error
        #[source]
        source: Option<BoxedSource>,
    },

    /// Source map file absent for the requested frame
    #[error("Source map missing: {path}")]
    SourceMapMissing {
        /// Path that was probed
        path: String,
    },

    /// Source map present but unparseable
    #[error("Source map corrupt at {path}: {message}")]
    SourceMapCorrupt {
        /// Path of the corrupt map
        path: String,
        /// Parser error description
        message: String,
    },

    /// Archive (zip) operation error
    #[error("Archive error: {message}")]
    Archive {
        /// Description of the archive error
        message: String,
        /// Optional source error
        #[source]
        source: Option<BoxedSource>,
    },

    /// External analyzer call failed
    #[error("Analyzer error: {message}")]
    Analyzer {
        /// Description of the analyzer failure
        message: String,
        /// Optional source error
        #[source]
        source: Option<BoxedSource>,
    },

    /// I/O operation error
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error
        #[from]
        source: std::io::Error,
    },

    /// JSON parsing or serialization error
    #[error("JSON error: {source}")]
    Json {
        /// The underlying JSON error
        #[from]
        source: serde_json::Error,
    },

    /// Configuration-related error
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error
        message: String,
    },

    /// Missing configuration field
    #[error("Missing configuration: {0}")]
    ConfigMissing(String),

    /// Internal system error
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error
        message: String,
    },
}

// Basic error creation methods
impl Error {
    /// Create a bad request error
    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create a conflict error
    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create an unauthorized error
    pub fn unauthorized<S: Into<String>>(message: S) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Create a forbidden error
    pub fn forbidden<S: Into<String>>(message: S) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

// Store error creation methods
impl Error {
    /// Create an unavailable error
    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::Unavailable {
            message: message.into(),
            source: None,
        }
    }

    /// Create an unavailable error with source
    pub fn unavailable_with_source<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        message: S,
        source: E,
    ) -> Self {
        Self::Unavailable {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a database error
    pub fn database<S: Into<String>>(message: S) -> Self {
        Self::Database {
            message: message.into(),
            source: None,
        }
    }

    /// Create a database error with source
    pub fn database_with_source<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        message: S,
        source: E,
    ) -> Self {
        Self::Database {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a log store error
    pub fn log_store<S: Into<String>>(message: S) -> Self {
        Self::LogStore {
            message: message.into(),
            source: None,
        }
    }

    /// Create a log store error with source
    pub fn log_store_with_source<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        message: S,
        source: E,
    ) -> Self {
        Self::LogStore {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a queue error
    pub fn queue<S: Into<String>>(message: S) -> Self {
        Self::Queue {
            message: message.into(),
            source: None,
        }
    }

    /// Create a queue error with source
    pub fn queue_with_source<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        message: S,
        source: E,
    ) -> Self {
        Self::Queue {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

// Sourcemap and archive error creation methods
impl Error {
    /// Create a source map missing error
    pub fn sourcemap_missing<S: Into<String>>(path: S) -> Self {
        Self::SourceMapMissing { path: path.into() }
    }

    /// Create a source map corrupt error
    pub fn sourcemap_corrupt<S: Into<String>, M: Into<String>>(path: S, message: M) -> Self {
        Self::SourceMapCorrupt {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an archive error
    pub fn archive<S: Into<String>>(message: S) -> Self {
        Self::Archive {
            message: message.into(),
            source: None,
        }
    }

    /// Create an archive error with source
    pub fn archive_with_source<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        message: S,
        source: E,
    ) -> Self {
        Self::Archive {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an analyzer error
    pub fn analyzer<S: Into<String>>(message: S) -> Self {
        Self::Analyzer {
            message: message.into(),
            source: None,
        }
    }

    /// Create an analyzer error with source
    pub fn analyzer_with_source<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        message: S,
        source: E,
    ) -> Self {
        Self::Analyzer {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl Error {
    /// Whether a worker seeing this error should retry the job.
    ///
    /// Client-caused and permanent conditions are not retryable; transient
    /// store/network conditions are.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::BadRequest { .. }
            | Self::NotFound { .. }
            | Self::Conflict { .. }
            | Self::Unauthorized { .. }
            | Self::Forbidden { .. }
            | Self::SourceMapMissing { .. }
            | Self::SourceMapCorrupt { .. }
            | Self::Config { .. }
            | Self::ConfigMissing(_)
            | Self::Json { .. } => false,
            Self::Timeout { .. }
            | Self::Unavailable { .. }
            | Self::Database { .. }
            | Self::LogStore { .. }
            | Self::Queue { .. }
            | Self::Archive { .. }
            | Self::Analyzer { .. }
            | Self::Io { .. }
            | Self::Internal { .. } => true,
        }
    }
}
