use thiserror::Error;

use simplerp_core::DomainError;

use crate::AuthContext;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

impl From<AuthzError> for DomainError {
    fn from(value: AuthzError) -> Self {
        match value {
            AuthzError::Forbidden(p) => DomainError::Forbidden(p),
        }
    }
}

/// Allow iff `required` is literally present in the caller's permission set.
///
/// - No IO
/// - No wildcards or hierarchy (`sales` does not imply `sales.view`)
pub fn authorize(ctx: &AuthContext, required: &str) -> Result<(), AuthzError> {
    if ctx.has_permission(required) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
