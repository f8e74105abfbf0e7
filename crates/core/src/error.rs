//! Domain error model.

use thiserror::Error;

use crate::validation::FieldErrors;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every failure surfaced to a caller is one of these kinds. The HTTP layer
/// maps each kind to exactly one status code and never exposes the detail of
/// `Internal` beyond a generic message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed or out-of-range input, tagged per field.
    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    /// A uniqueness or "still in use" rule was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The requested resource does not resolve.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Missing, invalid or expired credential.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Valid credential, insufficient permission.
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),

    /// Datastore or otherwise unexpected failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn validation(errors: FieldErrors) -> Self {
        Self::Validation(errors)
    }

    /// Single-field validation failure.
    pub fn invalid_field(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.add(field, message);
        Self::Validation(errors)
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound(entity)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(permission: impl Into<String>) -> Self {
        Self::Forbidden(permission.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
