//! RBAC bootstrap: canonical roles, the permission catalog and rule-based
//! links, all inside one seed transaction.
//!
//! Re-running is a no-op apart from linking permissions that appeared since
//! the last run (for example, a new `sales.*` permission created through the
//! API gets linked to VENDAS on the next seed).

use std::collections::HashMap;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use simplerp_auth::seed::ADMIN;
use simplerp_auth::{CredentialVerifier, NewPermission, NewRole, NewUser, SeedCatalog};
use simplerp_core::{DomainError, PermissionId};

use crate::config::AdminSeed;
use crate::store::{RoleStore, SeedStore, StoreError, UserStore};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub roles_created: usize,
    pub permissions_created: usize,
    pub links_created: usize,
    pub warnings: Vec<String>,
}

/// Runs the whole seed in one transaction; any store error rolls it back.
pub async fn seed_rbac<S>(store: &S, catalog: &SeedCatalog) -> Result<SeedReport, StoreError>
where
    S: SeedStore + ?Sized,
{
    let now = Utc::now();
    let mut report = SeedReport::default();
    let mut tx = store.begin_seed().await?;

    for role in &catalog.roles {
        let created = tx
            .ensure_role(NewRole::new(role.name, role.description).into_role(now))
            .await?;
        if created {
            report.roles_created += 1;
            debug!(role = role.name, "seeded role");
        }
    }

    for p in &catalog.permissions {
        let created = tx
            .ensure_permission(NewPermission::new(p.name, p.description, p.module).into_permission(now))
            .await?;
        if created {
            report.permissions_created += 1;
            debug!(permission = p.name, module = p.module, "seeded permission");
        }
    }

    // Rules are evaluated against everything active now, not only the catalog.
    let available = tx.active_permissions().await?;
    let ids: HashMap<&str, PermissionId> = available.iter().map(|p| (p.name.as_str(), p.id)).collect();
    let pairs: Vec<(&str, &str)> = available
        .iter()
        .map(|p| (p.name.as_str(), p.module.as_str()))
        .collect();

    for role in &catalog.roles {
        let Some(role_id) = tx.role_id_by_name(role.name).await? else {
            return Err(StoreError::NotFound("role"));
        };

        let selection = role.select(pairs.iter().copied());
        for missing in &selection.missing {
            warn!(role = role.name, permission = missing, "permission not found; skipping");
            report
                .warnings
                .push(format!("{}: permission '{}' not found", role.name, missing));
        }

        for name in &selection.names {
            let Some(permission_id) = ids.get(name.as_str()).copied() else {
                continue;
            };
            if tx.link_if_absent(role_id, permission_id).await? {
                report.links_created += 1;
                debug!(role = role.name, permission = %name, "linked permission");
            } else {
                debug!(role = role.name, permission = %name, "already linked; skipping");
            }
        }
    }

    tx.commit().await?;

    info!(
        roles_created = report.roles_created,
        permissions_created = report.permissions_created,
        links_created = report.links_created,
        warnings = report.warnings.len(),
        "rbac seed complete"
    );
    Ok(report)
}

/// Creates the bootstrap admin account with the ADMIN role unless the
/// username is already taken. Returns `true` when a user was created.
pub async fn ensure_admin_user<S>(
    store: &S,
    admin: &AdminSeed,
    verifier: &dyn CredentialVerifier,
) -> Result<bool, DomainError>
where
    S: UserStore + RoleStore + ?Sized,
{
    if store.find_user_by_username(&admin.username).await?.is_some() {
        info!(username = %admin.username, "admin user already present");
        return Ok(false);
    }

    let role = store
        .find_role_by_name(ADMIN)
        .await?
        .ok_or(DomainError::not_found("role"))?;

    let input = NewUser {
        username: admin.username.clone(),
        password: admin.password.clone(),
        name: "Administrador".to_string(),
        email: format!("{}@sistema.com", admin.username),
        phone: None,
        role_id: role.id,
    }
    .normalize()?;

    let hash = verifier.hash(&input.password)?;
    let user = store.insert_user(input.into_user(hash, Utc::now())).await?;
    info!(user_id = %user.id, username = %user.username, "admin user created");
    Ok(true)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use simplerp_auth::seed::{GESTOR, VENDAS};
    use simplerp_auth::{Argon2Verifier, AssignmentRule, PermissionSeed, RoleSeed};

    use crate::store::{InMemoryStore, PermissionStore};

    async fn names_of(store: &InMemoryStore, role: &str) -> BTreeSet<String> {
        let role = store.find_role_by_name(role).await.unwrap().unwrap();
        store
            .role_permissions(role.id)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect()
    }

    #[tokio::test]
    async fn seeding_twice_changes_nothing() {
        let store = InMemoryStore::new();
        let catalog = SeedCatalog::default();

        let first = seed_rbac(&store, &catalog).await.unwrap();
        assert_eq!(first.roles_created, 5);
        assert_eq!(first.permissions_created, catalog.permissions.len());
        assert!(first.links_created > 0);
        assert!(first.warnings.is_empty());
        let admin_before = names_of(&store, ADMIN).await;

        let second = seed_rbac(&store, &catalog).await.unwrap();
        assert_eq!(second.roles_created, 0);
        assert_eq!(second.permissions_created, 0);
        assert_eq!(second.links_created, 0);
        assert_eq!(names_of(&store, ADMIN).await, admin_before);
        assert_eq!(store.all_permissions().await.unwrap().len(), catalog.permissions.len());
    }

    #[tokio::test]
    async fn vendas_gets_sales_modules_and_named_extras() {
        let store = InMemoryStore::new();
        seed_rbac(&store, &SeedCatalog::default()).await.unwrap();

        let vendas = names_of(&store, VENDAS).await;
        assert!(vendas.contains("sales.view"));
        assert!(vendas.contains("customers.view"));
        assert!(vendas.contains("finance.receive_boleto"));
        assert!(!vendas.contains("finance.view"));
        assert!(!vendas.contains("inventory.view"));

        let gestor = names_of(&store, GESTOR).await;
        assert!(gestor.contains("dashboard.view_default"));
        assert!(
            gestor
                .iter()
                .filter(|n| n.as_str() != "dashboard.view_default")
                .all(|n| n.ends_with(".view") || n.ends_with(".reports"))
        );
    }

    #[tokio::test]
    async fn permission_added_later_is_linked_on_reseed() {
        let store = InMemoryStore::new();
        let catalog = SeedCatalog::default();
        seed_rbac(&store, &catalog).await.unwrap();

        store
            .insert_permission(
                NewPermission::new("sales.export", "Exportar vendas", "sales").into_permission(Utc::now()),
            )
            .await
            .unwrap();
        let report = seed_rbac(&store, &catalog).await.unwrap();

        // ADMIN (all) and VENDAS (module rule) pick it up.
        assert_eq!(report.links_created, 2);
        assert!(names_of(&store, VENDAS).await.contains("sales.export"));
    }

    #[tokio::test]
    async fn missing_named_permission_is_a_warning() {
        let store = InMemoryStore::new();
        let catalog = SeedCatalog {
            roles: vec![RoleSeed {
                name: "AUDITOR",
                description: "",
                rules: vec![AssignmentRule::Exact("audit.view"), AssignmentRule::Module("sales")],
            }],
            permissions: vec![PermissionSeed {
                name: "sales.view",
                description: "Visualizar vendas",
                module: "sales",
            }],
        };

        let report = seed_rbac(&store, &catalog).await.unwrap();
        assert_eq!(report.links_created, 1);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("audit.view"));
    }

    #[tokio::test]
    async fn admin_bootstrap_is_idempotent() {
        let store = InMemoryStore::new();
        seed_rbac(&store, &SeedCatalog::default()).await.unwrap();
        let admin = AdminSeed {
            username: "admin".into(),
            password: "admin123".into(),
        };
        let verifier = Argon2Verifier::insecure_fast();

        assert!(ensure_admin_user(&store, &admin, &verifier).await.unwrap());
        assert!(!ensure_admin_user(&store, &admin, &verifier).await.unwrap());

        let user = store.find_user_by_username("admin").await.unwrap().unwrap();
        assert_eq!(user.email, "admin@sistema.com");
        assert!(verifier.verify("admin123", &user.password_hash));
    }
}
