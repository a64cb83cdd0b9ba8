//! Error types for the world engine binary.
//!
//! [`EngineError`] wraps every failure mode during engine startup and
//! shutdown so `main` can propagate with `?`.

/// Top-level error for the world engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: marchland_core::config::ConfigError,
    },

    /// Database connection or migration failed.
    #[error("database error: {source}")]
    Database {
        /// The underlying data layer error.
        #[from]
        source: marchland_db::DbError,
    },

    /// NATS connection failed.
    #[error("NATS error: {message}")]
    Nats {
        /// Description of the NATS failure.
        message: String,
    },

    /// The logging subscriber could not be installed.
    #[error("logging error: {message}")]
    Logging {
        /// Description of the failure.
        message: String,
    },

    /// A scheduler task panicked or was aborted.
    #[error("scheduler task `{name}` failed: {message}")]
    Task {
        /// Scheduler name.
        name: &'static str,
        /// Join error text.
        message: String,
    },
}
