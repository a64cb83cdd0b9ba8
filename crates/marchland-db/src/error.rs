//! Error types for the data layer.
//!
//! Every failure is a [`DbError`] wrapping the underlying [`sqlx`] or
//! [`serde_json`] error. The [`WorldStore`] implementation converts them
//! into the core's [`StoreError`] at the trait boundary.
//!
//! [`WorldStore`]: marchland_core::WorldStore

use marchland_core::StoreError;

/// Name of the unique constraint on village coordinates.
pub(crate) const COORDINATES_CONSTRAINT: &str = "villages_coordinates_key";

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A JSON column could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A column held a value the domain types cannot represent.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Serialization(source) => Self::Corrupt {
                message: source.to_string(),
            },
            DbError::Corrupt(message) => Self::Corrupt { message },
            other => Self::Backend {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_rows_stay_corrupt() {
        let err = StoreError::from(DbError::Corrupt("bad kind".to_owned()));
        assert_eq!(
            err,
            StoreError::Corrupt {
                message: "bad kind".to_owned()
            }
        );
    }

    #[test]
    fn driver_failures_become_backend_errors() {
        let err = StoreError::from(DbError::Postgres(sqlx::Error::PoolTimedOut));
        assert!(matches!(err, StoreError::Backend { .. }));
    }
}
