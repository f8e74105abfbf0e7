//! HS256 token issuing and validation.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use simplerp_core::DomainError;

use crate::{AuthContext, Claims, TokenKind};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("invalid token")]
    Invalid,

    #[error("expected a {expected:?} token")]
    WrongKind { expected: TokenKind },

    #[error("failed to sign token: {0}")]
    Signing(String),
}

impl From<TokenError> for DomainError {
    fn from(value: TokenError) -> Self {
        match value {
            TokenError::Signing(msg) => DomainError::internal(msg),
            other => DomainError::unauthorized(other.to_string()),
        }
    }
}

/// An access/refresh pair minted from the same claim snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Signs and verifies tokens with a shared secret.
///
/// Validation is synchronous and does no I/O.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl core::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    pub fn new(secret: &[u8], access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Mints both tokens at `now`, carrying the full claim set.
    pub fn issue_pair(&self, ctx: &AuthContext, now: DateTime<Utc>) -> Result<TokenPair, TokenError> {
        let access_expires_at = now + self.access_ttl;
        let refresh_expires_at = now + self.refresh_ttl;

        let access_token = self.sign(&Claims::for_context(
            ctx,
            TokenKind::Access,
            now.timestamp(),
            access_expires_at.timestamp(),
        ))?;
        let refresh_token = self.sign(&Claims::for_context(
            ctx,
            TokenKind::Refresh,
            now.timestamp(),
            refresh_expires_at.timestamp(),
        ))?;

        debug!(user_id = %ctx.user_id, role = %ctx.role_name, "issued token pair");

        Ok(TokenPair {
            access_token,
            refresh_token,
            access_expires_at,
            refresh_expires_at,
        })
    }

    pub fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verifies signature, expiry and kind.
    pub fn validate(&self, token: &str, expected: TokenKind) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            }
        })?;

        if data.claims.kind != expected {
            return Err(TokenError::WrongKind { expected });
        }
        Ok(data.claims)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use simplerp_core::{RoleId, UserId};

    fn issuer(secret: &str) -> TokenIssuer {
        TokenIssuer::new(secret.as_bytes(), Duration::minutes(15), Duration::days(7))
    }

    fn ctx() -> AuthContext {
        AuthContext::new(
            UserId::new(),
            "maria",
            RoleId::new(),
            "VENDAS",
            ["sales.view".to_string(), "customers.view".to_string()],
        )
    }

    #[test]
    fn pair_round_trips_claims() {
        let issuer = issuer("test-secret");
        let ctx = ctx();
        let pair = issuer.issue_pair(&ctx, Utc::now()).unwrap();

        let access = issuer.validate(&pair.access_token, TokenKind::Access).unwrap();
        assert_eq!(access.kind, TokenKind::Access);
        assert_eq!(access.clone().into_context(), ctx);

        let refresh = issuer.validate(&pair.refresh_token, TokenKind::Refresh).unwrap();
        assert_eq!(refresh.exp - refresh.iat, Duration::days(7).num_seconds());
    }

    #[test]
    fn kinds_are_not_interchangeable() {
        let issuer = issuer("test-secret");
        let pair = issuer.issue_pair(&ctx(), Utc::now()).unwrap();
        assert_eq!(
            issuer.validate(&pair.refresh_token, TokenKind::Access),
            Err(TokenError::WrongKind { expected: TokenKind::Access })
        );
        assert!(issuer.validate(&pair.access_token, TokenKind::Refresh).is_err());
    }

    #[test]
    fn other_secret_is_rejected() {
        let pair = issuer("one").issue_pair(&ctx(), Utc::now()).unwrap();
        assert_eq!(
            issuer("two").validate(&pair.access_token, TokenKind::Access),
            Err(TokenError::Invalid)
        );
    }

    #[test]
    fn expired_token_is_rejected() {
        let issuer = issuer("test-secret");
        let issued = Utc::now() - Duration::hours(1);
        let pair = issuer.issue_pair(&ctx(), issued).unwrap();
        assert_eq!(
            issuer.validate(&pair.access_token, TokenKind::Access),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn garbage_is_invalid() {
        assert_eq!(
            issuer("s").validate("not.a.token", TokenKind::Access),
            Err(TokenError::Invalid)
        );
    }
}
