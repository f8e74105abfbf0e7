use std::collections::BTreeSet;

use chrono::Utc;
use tracing::info;

use simplerp_auth::{NewRole, Role, RoleChanges, RoleWithPermissions};
use simplerp_core::{DomainError, DomainResult, Page, PageRequest, PermissionId, RoleId};

use crate::store::RoleStore;

#[derive(Debug, Clone)]
pub struct RoleService<S> {
    store: S,
}

impl<S> RoleService<S>
where
    S: RoleStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// New roles start with no permissions.
    pub async fn create(&self, input: NewRole) -> DomainResult<RoleWithPermissions> {
        let input = input.normalize()?;
        if self.store.find_role_by_name(&input.name).await?.is_some() {
            return Err(DomainError::conflict(format!("role '{}' already exists", input.name)));
        }
        let role = self.store.insert_role(input.into_role(Utc::now())).await?;
        info!(role_id = %role.id, name = %role.name, "role created");
        Ok(RoleWithPermissions {
            role,
            permissions: Vec::new(),
        })
    }

    pub async fn get(&self, id: RoleId) -> DomainResult<RoleWithPermissions> {
        let role = self.role(id).await?;
        let permissions = self.store.role_permissions(id).await?;
        Ok(RoleWithPermissions { role, permissions })
    }

    pub async fn update(&self, id: RoleId, changes: RoleChanges) -> DomainResult<RoleWithPermissions> {
        let changes = changes.normalize()?;
        let mut role = self.role(id).await?;

        if let Some(name) = &changes.name {
            if let Some(other) = self.store.find_role_by_name(name).await? {
                if other.id != id {
                    return Err(DomainError::conflict(format!("role '{name}' already exists")));
                }
            }
        }

        changes.apply(&mut role, Utc::now());
        let role = self.store.update_role(role).await?;
        info!(role_id = %role.id, "role updated");
        let permissions = self.store.role_permissions(id).await?;
        Ok(RoleWithPermissions { role, permissions })
    }

    pub async fn delete(&self, id: RoleId) -> DomainResult<()> {
        self.store.delete_role(id, Utc::now()).await?;
        info!(role_id = %id, "role deleted");
        Ok(())
    }

    pub async fn list(&self, page: &PageRequest) -> DomainResult<Page<Role>> {
        Ok(self.store.list_roles(page).await?)
    }

    /// Makes the role's permission set exactly `permission_ids`. Duplicates in
    /// the input collapse; repeating the call is a no-op.
    pub async fn replace_permissions(
        &self,
        id: RoleId,
        permission_ids: impl IntoIterator<Item = PermissionId>,
    ) -> DomainResult<RoleWithPermissions> {
        let wanted: BTreeSet<PermissionId> = permission_ids.into_iter().collect();
        let permissions = self
            .store
            .replace_role_permissions(id, &wanted, Utc::now())
            .await?;
        info!(role_id = %id, count = permissions.len(), "role permissions replaced");
        let role = self.role(id).await?;
        Ok(RoleWithPermissions { role, permissions })
    }

    async fn role(&self, id: RoleId) -> DomainResult<Role> {
        self.store.get_role(id).await?.ok_or(DomainError::not_found("role"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use simplerp_auth::{NewPermission, NewUser, Permission};

    use crate::store::{InMemoryStore, PermissionStore, UserStore};

    async fn permission(store: &InMemoryStore, name: &str) -> Permission {
        store
            .insert_permission(NewPermission::new(name, "descrição", "sales").into_permission(Utc::now()))
            .await
            .unwrap()
    }

    fn ids(role: &RoleWithPermissions) -> BTreeSet<PermissionId> {
        role.permissions.iter().map(|p| p.id).collect()
    }

    #[tokio::test]
    async fn replace_is_idempotent_and_collapses_duplicates() {
        let store = InMemoryStore::new();
        let svc = RoleService::new(store.clone());
        let a = permission(&store, "sales.view").await;
        let b = permission(&store, "sales.edit").await;
        let role = svc.create(NewRole::new("VENDAS", "")).await.unwrap();

        let once = svc
            .replace_permissions(role.role.id, [a.id, b.id, a.id])
            .await
            .unwrap();
        let twice = svc
            .replace_permissions(role.role.id, [b.id, a.id])
            .await
            .unwrap();
        assert_eq!(ids(&once), BTreeSet::from([a.id, b.id]));
        assert_eq!(ids(&once), ids(&twice));
    }

    #[tokio::test]
    async fn replace_is_set_replacement() {
        let store = InMemoryStore::new();
        let svc = RoleService::new(store.clone());
        let a = permission(&store, "sales.view").await;
        let b = permission(&store, "sales.edit").await;
        let c = permission(&store, "sales.delete").await;
        let role = svc.create(NewRole::new("VENDAS", "")).await.unwrap().role;

        svc.replace_permissions(role.id, [a.id, b.id]).await.unwrap();
        let after = svc.replace_permissions(role.id, [b.id, c.id]).await.unwrap();
        assert_eq!(ids(&after), BTreeSet::from([b.id, c.id]));
        assert_eq!(ids(&svc.get(role.id).await.unwrap()), BTreeSet::from([b.id, c.id]));
    }

    #[tokio::test]
    async fn replace_with_unknown_permission_changes_nothing() {
        let store = InMemoryStore::new();
        let svc = RoleService::new(store.clone());
        let a = permission(&store, "sales.view").await;
        let role = svc.create(NewRole::new("VENDAS", "")).await.unwrap().role;
        svc.replace_permissions(role.id, [a.id]).await.unwrap();

        let err = svc
            .replace_permissions(role.id, [a.id, PermissionId::new()])
            .await
            .unwrap_err();
        let DomainError::Validation(fields) = err else {
            panic!("expected validation error");
        };
        assert!(fields.to_map().contains_key("permission_ids"));
        assert_eq!(ids(&svc.get(role.id).await.unwrap()), BTreeSet::from([a.id]));
    }

    #[tokio::test]
    async fn replace_on_missing_role_is_not_found() {
        let svc = RoleService::new(InMemoryStore::new());
        let err = svc
            .replace_permissions(RoleId::new(), Vec::new())
            .await
            .unwrap_err();
        assert_eq!(err, DomainError::not_found("role"));
    }

    #[tokio::test]
    async fn role_in_use_cannot_be_deleted_and_delete_drops_links() {
        let store = InMemoryStore::new();
        let svc = RoleService::new(store.clone());
        let a = permission(&store, "sales.view").await;
        let role = svc.create(NewRole::new("VENDAS", "")).await.unwrap().role;
        svc.replace_permissions(role.id, [a.id]).await.unwrap();

        let user = NewUser {
            username: "maria".into(),
            password: "secret1".into(),
            name: "Maria".into(),
            email: "maria@example.com".into(),
            phone: None,
            role_id: role.id,
        }
        .into_user("hash".into(), Utc::now());
        let user = store.insert_user(user).await.unwrap();

        let err = svc.delete(role.id).await.unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));

        store.set_user_active(user.id, false, Utc::now()).await.unwrap();
        svc.delete(role.id).await.unwrap();
        assert_eq!(svc.get(role.id).await.unwrap_err(), DomainError::not_found("role"));

        // Links are gone, so the permission is deletable again.
        store.delete_permission(a.id, Utc::now()).await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_role_name_conflicts() {
        let svc = RoleService::new(InMemoryStore::new());
        svc.create(NewRole::new("GESTOR", "")).await.unwrap();
        let err = svc.create(NewRole::new(" GESTOR ", "")).await.unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }
}
