//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Deterministic business failures only (validation, illegal transitions,
/// conflicts, gating). Storage and transport concerns live elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found, or is not visible to the caller.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A uniqueness rule was violated (duplicate application, email, student number).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The requested transition is not legal from the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The student has not verified their email address yet.
    #[error("email address must be verified first")]
    Unverified,

    /// The property has no available units left.
    #[error("no units available for this property")]
    Exhausted,

    /// An uploaded document does not have the expected content type.
    #[error("invalid document: {0}")]
    InvalidDocument(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn invalid_document(msg: impl Into<String>) -> Self {
        Self::InvalidDocument(msg.into())
    }

    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_names_the_entity() {
        assert_eq!(DomainError::not_found("application").to_string(), "application not found");
    }

    #[test]
    fn helpers_build_matching_variants() {
        assert!(matches!(DomainError::conflict("dup"), DomainError::Conflict(m) if m == "dup"));
        assert!(matches!(
            DomainError::invalid_state("not pending"),
            DomainError::InvalidState(_)
        ));
    }
}
