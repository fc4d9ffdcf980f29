//! PostgreSQL implementations of the tutoring repositories
//!
//! [`PgStore`] implements every repository trait on one connection pool.
//! Multi-statement operations (hold placement, hold resolution, revenue
//! policy replacement) run inside a single database transaction.

use sqlx::PgPool;
use tutoring::TutoringError;

pub mod attendance;
pub mod badges;
pub mod classes;
pub mod credentials;
pub mod notifications;
pub mod payments;
pub mod sessions;
pub mod tutors;

/// Postgres SQLSTATE for unique violations
const UNIQUE_VIOLATION: &str = "23505";
/// Postgres SQLSTATE for exclusion constraint violations
const EXCLUSION_VIOLATION: &str = "23P01";

/// Repository over a PostgreSQL pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new store
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Map a sqlx error to the domain error the engines understand.
///
/// Unique and exclusion violations are conflicts, everything else is a
/// storage failure.
pub(crate) fn store_error(err: sqlx::Error) -> TutoringError {
    if let sqlx::Error::Database(db) = &err {
        match db.code().as_deref() {
            Some(UNIQUE_VIOLATION) => {
                return TutoringError::conflict(format!(
                    "Duplicate record ({})",
                    db.constraint().unwrap_or("unique constraint")
                ));
            }
            Some(EXCLUSION_VIOLATION) => {
                return TutoringError::conflict("Tutor is already booked at this time");
            }
            _ => {}
        }
    }
    tracing::error!(error = %err, "Database operation failed");
    TutoringError::Store(err.to_string())
}

/// Turn a column value that does not parse into a storage error
pub(crate) fn corrupt(column: &str, err: impl std::fmt::Display) -> TutoringError {
    TutoringError::Store(format!("Corrupt value in column {}: {}", column, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_database_errors_are_store_errors() {
        let err = store_error(sqlx::Error::RowNotFound);
        assert!(matches!(err, TutoringError::Store(_)));
    }
}
