use chrono::Utc;
use tracing::info;

use simplerp_auth::permissions::group_by_module;
use simplerp_auth::{ModuleGroup, NewPermission, Permission, PermissionChanges, PermissionFilter};
use simplerp_core::{DomainError, DomainResult, Page, PageRequest, PermissionId};

use crate::store::PermissionStore;

#[derive(Debug, Clone)]
pub struct PermissionService<S> {
    store: S,
}

impl<S> PermissionService<S>
where
    S: PermissionStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn create(&self, input: NewPermission) -> DomainResult<Permission> {
        let input = input.normalize()?;
        if self.store.find_permission_by_name(&input.name).await?.is_some() {
            return Err(DomainError::conflict(format!(
                "permission '{}' already exists",
                input.name
            )));
        }
        let created = self.store.insert_permission(input.into_permission(Utc::now())).await?;
        info!(permission_id = %created.id, name = %created.name, "permission created");
        Ok(created)
    }

    pub async fn get(&self, id: PermissionId) -> DomainResult<Permission> {
        self.store
            .get_permission(id)
            .await?
            .ok_or(DomainError::not_found("permission"))
    }

    pub async fn update(&self, id: PermissionId, changes: PermissionChanges) -> DomainResult<Permission> {
        let changes = changes.normalize()?;
        let mut permission = self.get(id).await?;

        if let Some(name) = &changes.name {
            if let Some(other) = self.store.find_permission_by_name(name).await? {
                if other.id != id {
                    return Err(DomainError::conflict(format!("permission '{name}' already exists")));
                }
            }
        }

        changes.apply(&mut permission, Utc::now());
        let updated = self.store.update_permission(permission).await?;
        info!(permission_id = %updated.id, "permission updated");
        Ok(updated)
    }

    pub async fn delete(&self, id: PermissionId) -> DomainResult<()> {
        self.store.delete_permission(id, Utc::now()).await?;
        info!(permission_id = %id, "permission deleted");
        Ok(())
    }

    pub async fn list(&self, filter: &PermissionFilter, page: &PageRequest) -> DomainResult<Page<Permission>> {
        Ok(self.store.list_permissions(filter, page).await?)
    }

    pub async fn group_by_module(&self) -> DomainResult<Vec<ModuleGroup>> {
        Ok(group_by_module(self.store.all_permissions().await?))
    }

    pub async fn modules(&self) -> DomainResult<Vec<String>> {
        Ok(self.store.list_modules().await?)
    }
}
