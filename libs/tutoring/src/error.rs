//! Domain error types for the session workflow

use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the session lifecycle, attendance and settlement engines
#[derive(Error, Debug)]
pub enum TutoringError {
    /// Malformed input or an illegal state transition
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The caller is not allowed to perform the action
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Double booking, duplicate check-in, or a concurrent state change
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Some payment holds of a session could not be settled
    #[error("Settlement failed for {failed} of {attempted} payment(s) in session {session_id}")]
    Settlement {
        session_id: Uuid,
        failed: usize,
        attempted: usize,
    },

    /// A notification or badge collaborator failed
    #[error("Side effect failed: {0}")]
    SideEffect(String),

    /// The backing store failed
    #[error("Storage error: {0}")]
    Store(String),
}

impl TutoringError {
    pub fn validation(message: impl Into<String>) -> Self {
        TutoringError::Validation(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        TutoringError::Forbidden(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        TutoringError::Conflict(message.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        TutoringError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Type alias for Result with TutoringError
pub type TutoringResult<T> = Result<T, TutoringError>;
