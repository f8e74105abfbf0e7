//! Service wiring: one store shared by every application service.

use std::sync::Arc;

use tracing::{info, warn};

use simplerp_auth::{CredentialVerifier, SeedCatalog, TokenIssuer};
use simplerp_infra::services::{AuthService, PermissionService, RoleService, UserService};
use simplerp_infra::{AppConfig, InMemoryStore, PostgresStore, RbacStore, SeedReport, db};

/// The store every service runs against.
pub type Store = Arc<dyn RbacStore>;

#[derive(Clone)]
pub struct AppServices {
    pub config: Arc<AppConfig>,
    pub issuer: Arc<TokenIssuer>,
    pub permissions: PermissionService<Store>,
    pub roles: RoleService<Store>,
    pub users: UserService<Store>,
    pub auth: AuthService<Store>,
}

impl AppServices {
    pub fn new(config: Arc<AppConfig>, store: Store, verifier: Arc<dyn CredentialVerifier>) -> Self {
        let issuer = Arc::new(TokenIssuer::new(
            config.jwt.secret.as_bytes(),
            config.jwt.access_ttl,
            config.jwt.refresh_ttl,
        ));

        Self {
            permissions: PermissionService::new(store.clone()),
            roles: RoleService::new(store.clone()),
            users: UserService::new(store.clone(), verifier.clone()),
            auth: AuthService::new(store, issuer.clone(), verifier),
            config,
            issuer,
        }
    }

    /// Whether auth cookies get the `Secure` attribute.
    pub fn secure_cookies(&self) -> bool {
        self.config.environment.is_production()
    }
}

/// Opens Postgres (applying the schema) when configured, otherwise an empty
/// in-memory store.
pub async fn open_store(config: &AppConfig) -> anyhow::Result<Store> {
    match &config.database {
        Some(database) => {
            let pool = db::connect(database).await?;
            db::apply_schema(&pool).await?;
            Ok(Arc::new(PostgresStore::new(pool)))
        }
        None => {
            warn!("DATABASE_URL not set; using in-memory store");
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}

/// Seeds roles, permissions and links, then the optional admin account.
pub async fn run_seed(
    store: &Store,
    config: &AppConfig,
    verifier: &dyn CredentialVerifier,
) -> anyhow::Result<SeedReport> {
    let report = simplerp_infra::seed_rbac(store.as_ref(), &SeedCatalog::default()).await?;

    if let Some(admin) = &config.seed.admin {
        let created = simplerp_infra::ensure_admin_user(store.as_ref(), admin, verifier).await?;
        info!(username = %admin.username, created, "admin bootstrap finished");
    }

    Ok(report)
}
