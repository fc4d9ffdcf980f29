//! Infrastructure error types
//!
//! Errors raised while wiring up the database pool, running migrations or
//! loading service settings. Domain errors live in the `tutoring` crate.

use sqlx::Error as SqlxError;
use thiserror::Error;

/// Failures of the PostgreSQL pool outside of repository calls
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Failed to connect to PostgreSQL: {0}")]
    Connection(#[source] SqlxError),

    /// A health or bootstrap query failed
    #[error("PostgreSQL probe query failed: {0}")]
    Query(#[source] SqlxError),

    /// Embedded migrations could not be applied
    #[error("Failed to apply migrations: {0}")]
    Migration(String),

    /// `DATABASE_*` variables are missing or malformed
    #[error("Invalid database configuration: {0}")]
    Configuration(String),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Error raised when service settings cannot be loaded
#[derive(Error, Debug)]
pub enum SettingsError {
    /// The `config` crate could not build or deserialize the settings
    #[error("Invalid service settings: {0}")]
    Load(#[from] config::ConfigError),

    /// A setting was readable but semantically invalid
    #[error("Invalid service setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}
