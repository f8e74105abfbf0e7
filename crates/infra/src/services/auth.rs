//! Login, refresh and access-token authentication.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use simplerp_auth::{AuthContext, CredentialVerifier, TokenIssuer, TokenKind, TokenPair, User};
use simplerp_core::{DomainError, DomainResult};

use crate::store::{RoleStore, UserStore};

/// Every login failure carries this exact text, whatever the cause.
pub const INVALID_CREDENTIALS: &str = "invalid username or password";
const INVALID_SESSION: &str = "invalid or expired session";

/// A freshly minted token pair and the claim set it carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub context: AuthContext,
    pub tokens: TokenPair,
}

/// The caller's stored account plus the permissions in their token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    #[serde(flatten)]
    pub user: User,
    pub role_name: String,
    pub permissions: BTreeSet<String>,
}

#[derive(Clone)]
pub struct AuthService<S> {
    store: S,
    issuer: Arc<TokenIssuer>,
    verifier: Arc<dyn CredentialVerifier>,
}

impl<S> AuthService<S>
where
    S: UserStore + RoleStore,
{
    pub fn new(store: S, issuer: Arc<TokenIssuer>, verifier: Arc<dyn CredentialVerifier>) -> Self {
        Self {
            store,
            issuer,
            verifier,
        }
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    pub async fn login(&self, username: &str, password: &str) -> DomainResult<Session> {
        let denied = || DomainError::unauthorized(INVALID_CREDENTIALS);

        let Some(user) = self.store.find_user_by_username(username.trim()).await? else {
            warn!(username = %username, "login failed");
            debug!("unknown username");
            return Err(denied());
        };
        if !user.is_active {
            warn!(username = %username, "login failed");
            debug!(user_id = %user.id, "user inactive");
            return Err(denied());
        }
        if !self.verifier.verify(password, &user.password_hash) {
            warn!(username = %username, "login failed");
            debug!(user_id = %user.id, "password mismatch");
            return Err(denied());
        }

        let context = self.context_for(&user).await.map_err(|e| match e {
            DomainError::Unauthorized(_) => denied(),
            other => other,
        })?;
        let now = Utc::now();
        let tokens = self.issuer.issue_pair(&context, now)?;
        self.store.record_login(user.id, now).await?;

        info!(user_id = %user.id, role = %context.role_name, "login succeeded");
        Ok(Session { context, tokens })
    }

    /// Exchanges a refresh token for a new pair with freshly resolved
    /// permissions.
    pub async fn refresh(&self, refresh_token: &str) -> DomainResult<Session> {
        let claims = self
            .issuer
            .validate(refresh_token, TokenKind::Refresh)
            .map_err(|e| {
                debug!(error = %e, "refresh token rejected");
                DomainError::unauthorized(INVALID_SESSION)
            })?;

        let user = match self.store.get_user(claims.sub).await? {
            Some(u) if u.is_active => u,
            _ => return Err(DomainError::unauthorized(INVALID_SESSION)),
        };

        let context = self.context_for(&user).await?;
        let tokens = self.issuer.issue_pair(&context, Utc::now())?;
        info!(user_id = %user.id, "session refreshed");
        Ok(Session { context, tokens })
    }

    /// Validates an access token. Synchronous and I/O free.
    pub fn authenticate(&self, access_token: &str) -> DomainResult<AuthContext> {
        self.issuer
            .validate(access_token, TokenKind::Access)
            .map(|claims| claims.into_context())
            .map_err(DomainError::from)
    }

    pub async fn profile(&self, ctx: &AuthContext) -> DomainResult<Profile> {
        let user = self
            .store
            .get_user(ctx.user_id)
            .await?
            .ok_or(DomainError::not_found("user"))?;
        Ok(Profile {
            user,
            role_name: ctx.role_name.clone(),
            permissions: ctx.permissions.clone(),
        })
    }

    /// Resolves the user's role and its *current* permission names.
    async fn context_for(&self, user: &User) -> DomainResult<AuthContext> {
        let role = self
            .store
            .get_role(user.role_id)
            .await?
            .ok_or_else(|| DomainError::unauthorized(INVALID_SESSION))?;
        let permissions = self.store.role_permissions(role.id).await?;

        Ok(AuthContext::new(
            user.id,
            user.username.clone(),
            role.id,
            role.name,
            permissions.into_iter().map(|p| p.name),
        ))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use simplerp_auth::{Argon2Verifier, NewUser, SeedCatalog};
    use simplerp_auth::seed::VENDAS;

    use crate::seeder::seed_rbac;
    use crate::store::{InMemoryStore, PermissionStore};

    struct Fixture {
        store: InMemoryStore,
        auth: AuthService<InMemoryStore>,
    }

    async fn fixture() -> Fixture {
        let store = InMemoryStore::new();
        seed_rbac(&store, &SeedCatalog::default()).await.unwrap();

        let verifier: Arc<dyn CredentialVerifier> = Arc::new(Argon2Verifier::insecure_fast());
        let role = store.find_role_by_name(VENDAS).await.unwrap().unwrap();
        let user = NewUser {
            username: "maria".into(),
            password: "secret1".into(),
            name: "Maria".into(),
            email: "maria@example.com".into(),
            phone: None,
            role_id: role.id,
        }
        .into_user(verifier.hash("secret1").unwrap(), Utc::now());
        store.insert_user(user).await.unwrap();

        let issuer = Arc::new(TokenIssuer::new(b"test-secret", Duration::minutes(15), Duration::days(7)));
        Fixture {
            auth: AuthService::new(store.clone(), issuer, verifier),
            store,
        }
    }

    #[tokio::test]
    async fn login_claims_equal_current_role_permissions() {
        let f = fixture().await;
        let session = f.auth.login("maria", "secret1").await.unwrap();

        let role = f.store.find_role_by_name(VENDAS).await.unwrap().unwrap();
        let expected: BTreeSet<String> = f
            .store
            .role_permissions(role.id)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(session.context.permissions, expected);
        assert!(session.context.has_permission("sales.view"));
        assert!(!session.context.has_permission("finance.view"));

        let ctx = f.auth.authenticate(&session.tokens.access_token).unwrap();
        assert_eq!(ctx, session.context);

        let user = f.store.find_user_by_username("maria").await.unwrap().unwrap();
        assert!(user.last_login.is_some());
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let f = fixture().await;
        let unknown = f.auth.login("ghost", "secret1").await.unwrap_err();
        let wrong = f.auth.login("maria", "wrong-password").await.unwrap_err();
        assert_eq!(unknown, wrong);
        assert_eq!(unknown, DomainError::unauthorized(INVALID_CREDENTIALS));

        let user = f.store.find_user_by_username("maria").await.unwrap().unwrap();
        f.store.set_user_active(user.id, false, Utc::now()).await.unwrap();
        let inactive = f.auth.login("maria", "secret1").await.unwrap_err();
        assert_eq!(inactive, unknown);
    }

    #[tokio::test]
    async fn refresh_picks_up_role_changes() {
        let f = fixture().await;
        let session = f.auth.login("maria", "secret1").await.unwrap();
        let role_id = session.context.role_id;

        let keep = f.store.find_permission_by_name("sales.view").await.unwrap().unwrap();
        f.store
            .replace_role_permissions(role_id, &BTreeSet::from([keep.id]), Utc::now())
            .await
            .unwrap();

        // The old access token still carries the old snapshot.
        let stale = f.auth.authenticate(&session.tokens.access_token).unwrap();
        assert!(stale.has_permission("sales.edit"));

        let refreshed = f.auth.refresh(&session.tokens.refresh_token).await.unwrap();
        assert_eq!(
            refreshed.context.permissions,
            BTreeSet::from(["sales.view".to_string()])
        );
    }

    #[tokio::test]
    async fn refresh_rejects_access_tokens_and_inactive_users() {
        let f = fixture().await;
        let session = f.auth.login("maria", "secret1").await.unwrap();

        let err = f.auth.refresh(&session.tokens.access_token).await.unwrap_err();
        assert!(matches!(err, DomainError::Unauthorized(_)));

        f.store
            .set_user_active(session.context.user_id, false, Utc::now())
            .await
            .unwrap();
        let err = f.auth.refresh(&session.tokens.refresh_token).await.unwrap_err();
        assert!(matches!(err, DomainError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn refresh_token_is_not_an_access_token() {
        let f = fixture().await;
        let session = f.auth.login("maria", "secret1").await.unwrap();
        assert!(f.auth.authenticate(&session.tokens.refresh_token).is_err());
    }
}
