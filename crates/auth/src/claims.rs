use serde::{Deserialize, Serialize};

use simplerp_core::{RoleId, UserId};

use crate::AuthContext;

/// Distinguishes the two tokens of a pair. A refresh token is never accepted
/// where an access token is expected, and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT claims model. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id.
    pub sub: UserId,
    pub username: String,
    pub role_id: RoleId,
    pub role_name: String,
    pub permissions: Vec<String>,
    pub kind: TokenKind,
    /// Issued-at, seconds since the epoch.
    pub iat: i64,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

impl Claims {
    pub fn for_context(ctx: &AuthContext, kind: TokenKind, iat: i64, exp: i64) -> Self {
        Self {
            sub: ctx.user_id,
            username: ctx.username.clone(),
            role_id: ctx.role_id,
            role_name: ctx.role_name.clone(),
            permissions: ctx.permissions.iter().cloned().collect(),
            kind,
            iat,
            exp,
        }
    }

    pub fn into_context(self) -> AuthContext {
        AuthContext::new(
            self.sub,
            self.username,
            self.role_id,
            self.role_name,
            self.permissions,
        )
    }
}
