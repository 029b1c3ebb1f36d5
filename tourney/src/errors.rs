//! Engine error types.

use thiserror::Error;

/// Errors surfaced by every engine operation.
///
/// The first six variants form the domain taxonomy and carry a human readable
/// message; [`EngineError::code`] gives the stable machine-readable code.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Operation not allowed in the current lifecycle or match state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Actor is not the organizer, staff or a participant
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Capacity full, open matches, insufficient players, ...
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// Tournament, registration, stage or match missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// A concurrent mutation won the race
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Malformed input such as an impossible score line
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An external collaborator (identity, decklists, prizes) failed
    #[error("Collaborator error: {0}")]
    Collaborator(String),
}

impl EngineError {
    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidState(_) => "invalid_state",
            EngineError::PermissionDenied(_) => "permission_denied",
            EngineError::PreconditionFailed(_) => "precondition_failed",
            EngineError::NotFound(_) => "not_found",
            EngineError::Conflict(_) => "conflict",
            EngineError::InvalidInput(_) => "invalid_input",
            EngineError::Database(_)
            | EngineError::Serialization(_)
            | EngineError::Collaborator(_) => "internal",
        }
    }

    /// Get a client-safe error message that doesn't leak sensitive information
    ///
    /// Infrastructure errors are sanitized so SQL details and collaborator
    /// internals never reach the caller.
    pub fn client_message(&self) -> String {
        match self {
            EngineError::Database(_)
            | EngineError::Serialization(_)
            | EngineError::Collaborator(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }

    /// Whether the caller may retry the same request unchanged
    pub fn is_conflict(&self) -> bool {
        matches!(self, EngineError::Conflict(_))
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(EngineError::InvalidState("x".into()).code(), "invalid_state");
        assert_eq!(
            EngineError::PermissionDenied("x".into()).code(),
            "permission_denied"
        );
        assert_eq!(
            EngineError::PreconditionFailed("x".into()).code(),
            "precondition_failed"
        );
        assert_eq!(EngineError::NotFound("x".into()).code(), "not_found");
        assert_eq!(EngineError::Conflict("x".into()).code(), "conflict");
        assert_eq!(EngineError::InvalidInput("x".into()).code(), "invalid_input");
        assert_eq!(
            EngineError::Collaborator("prize ledger down".into()).code(),
            "internal"
        );
    }

    #[test]
    fn test_client_message_sanitizes_infrastructure_errors() {
        let err = EngineError::Collaborator("ledger at 10.0.0.3 refused".into());
        assert_eq!(err.client_message(), "Internal server error");

        let err = EngineError::Conflict("result already reported".into());
        assert_eq!(err.client_message(), "Conflict: result already reported");
    }
}
