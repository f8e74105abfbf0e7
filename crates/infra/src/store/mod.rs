//! Persistence contracts for the RBAC model.
//!
//! Every backend implements the same four traits; services and the seeder are
//! written against the traits only.
//!
//! ## Uniqueness
//!
//! Names are unique among *active* rows (`deleted_at IS NULL`). A tombstoned
//! permission or role never blocks re-use of its name.

pub mod in_memory;
pub mod postgres;

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use simplerp_auth::{Permission, PermissionFilter, Role, User};
use simplerp_core::{DomainError, Page, PageRequest, PermissionId, RoleId, UserId};

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Uniqueness or "still referenced" rule violated.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    /// Some of the given permission ids do not resolve to active permissions.
    #[error("one or more permissions do not exist")]
    MissingPermissions(Vec<PermissionId>),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for DomainError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => DomainError::Conflict(msg),
            StoreError::NotFound(entity) => DomainError::NotFound(entity),
            StoreError::MissingPermissions(_) => DomainError::invalid_field(
                "permission_ids",
                "one or more permissions do not exist",
            ),
            StoreError::Backend(msg) => DomainError::Internal(msg),
        }
    }
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// `Conflict` if an active permission already has the name.
    async fn insert_permission(&self, permission: Permission) -> Result<Permission, StoreError>;

    /// Active permission by id.
    async fn get_permission(&self, id: PermissionId) -> Result<Option<Permission>, StoreError>;

    async fn find_permission_by_name(&self, name: &str) -> Result<Option<Permission>, StoreError>;

    /// Writes every mutable column. `NotFound` if absent, `Conflict` if the
    /// name now collides with a different active permission.
    async fn update_permission(&self, permission: Permission) -> Result<Permission, StoreError>;

    /// Tombstones the permission. `Conflict` while any role links it.
    async fn delete_permission(&self, id: PermissionId, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn list_permissions(
        &self,
        filter: &PermissionFilter,
        page: &PageRequest,
    ) -> Result<Page<Permission>, StoreError>;

    /// Every active permission, in no particular order.
    async fn all_permissions(&self) -> Result<Vec<Permission>, StoreError>;

    /// Distinct modules of active permissions, sorted.
    async fn list_modules(&self) -> Result<Vec<String>, StoreError>;
}

#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn insert_role(&self, role: Role) -> Result<Role, StoreError>;

    async fn get_role(&self, id: RoleId) -> Result<Option<Role>, StoreError>;

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError>;

    async fn update_role(&self, role: Role) -> Result<Role, StoreError>;

    /// Tombstones the role and physically removes its links.
    /// `Conflict` while an active user references it.
    async fn delete_role(&self, id: RoleId, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn list_roles(&self, page: &PageRequest) -> Result<Page<Role>, StoreError>;

    /// Active permissions linked to the role, sorted by name.
    async fn role_permissions(&self, id: RoleId) -> Result<Vec<Permission>, StoreError>;

    /// Makes the role's link set exactly `permission_ids`, atomically, with
    /// the role row locked. Returns the resulting permission set.
    async fn replace_role_permissions(
        &self,
        id: RoleId,
        permission_ids: &BTreeSet<PermissionId>,
        at: DateTime<Utc>,
    ) -> Result<Vec<Permission>, StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// `Conflict` if the username or email (case-insensitive) is taken;
    /// `NotFound("role")` unless `role_id` is an active role at write time.
    async fn insert_user(&self, user: User) -> Result<User, StoreError>;

    /// Writes name, email, phone, role and active flag. `NotFound("user")` if
    /// absent; `NotFound("role")` if the user ends up active, or moves to a
    /// new role, and that role is not active at write time.
    async fn update_user(&self, user: User) -> Result<User, StoreError>;

    async fn set_user_password(&self, id: UserId, password_hash: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError>;

    /// Exact username lookup, used by login.
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn list_users(&self, page: &PageRequest) -> Result<Page<User>, StoreError>;

    async fn set_user_active(&self, id: UserId, active: bool, at: DateTime<Utc>) -> Result<User, StoreError>;

    async fn record_login(&self, id: UserId, at: DateTime<Utc>) -> Result<(), StoreError>;
}

/// One seed run. Nothing is visible to other readers until `commit`;
/// dropping the handle discards the work.
#[async_trait]
pub trait SeedTx: Send {
    /// Inserts the role unless an active role has its name. `true` if inserted.
    async fn ensure_role(&mut self, role: Role) -> Result<bool, StoreError>;

    async fn ensure_permission(&mut self, permission: Permission) -> Result<bool, StoreError>;

    async fn role_id_by_name(&mut self, name: &str) -> Result<Option<RoleId>, StoreError>;

    async fn active_permissions(&mut self) -> Result<Vec<Permission>, StoreError>;

    /// `true` if the link was created, `false` if it already existed.
    async fn link_if_absent(&mut self, role_id: RoleId, permission_id: PermissionId) -> Result<bool, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait SeedStore: Send + Sync {
    async fn begin_seed(&self) -> Result<Box<dyn SeedTx>, StoreError>;
}

/// Everything the services need from one backend.
pub trait RbacStore: PermissionStore + RoleStore + UserStore + SeedStore + 'static {}

impl<S> RbacStore for S where S: PermissionStore + RoleStore + UserStore + SeedStore + 'static {}

// ─────────────────────────────────────────────────────────────────────────────
// Arc forwarding
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl<S> PermissionStore for Arc<S>
where
    S: PermissionStore + ?Sized,
{
    async fn insert_permission(&self, permission: Permission) -> Result<Permission, StoreError> {
        (**self).insert_permission(permission).await
    }

    async fn get_permission(&self, id: PermissionId) -> Result<Option<Permission>, StoreError> {
        (**self).get_permission(id).await
    }

    async fn find_permission_by_name(&self, name: &str) -> Result<Option<Permission>, StoreError> {
        (**self).find_permission_by_name(name).await
    }

    async fn update_permission(&self, permission: Permission) -> Result<Permission, StoreError> {
        (**self).update_permission(permission).await
    }

    async fn delete_permission(&self, id: PermissionId, at: DateTime<Utc>) -> Result<(), StoreError> {
        (**self).delete_permission(id, at).await
    }

    async fn list_permissions(
        &self,
        filter: &PermissionFilter,
        page: &PageRequest,
    ) -> Result<Page<Permission>, StoreError> {
        (**self).list_permissions(filter, page).await
    }

    async fn all_permissions(&self) -> Result<Vec<Permission>, StoreError> {
        (**self).all_permissions().await
    }

    async fn list_modules(&self) -> Result<Vec<String>, StoreError> {
        (**self).list_modules().await
    }
}

#[async_trait]
impl<S> RoleStore for Arc<S>
where
    S: RoleStore + ?Sized,
{
    async fn insert_role(&self, role: Role) -> Result<Role, StoreError> {
        (**self).insert_role(role).await
    }

    async fn get_role(&self, id: RoleId) -> Result<Option<Role>, StoreError> {
        (**self).get_role(id).await
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError> {
        (**self).find_role_by_name(name).await
    }

    async fn update_role(&self, role: Role) -> Result<Role, StoreError> {
        (**self).update_role(role).await
    }

    async fn delete_role(&self, id: RoleId, at: DateTime<Utc>) -> Result<(), StoreError> {
        (**self).delete_role(id, at).await
    }

    async fn list_roles(&self, page: &PageRequest) -> Result<Page<Role>, StoreError> {
        (**self).list_roles(page).await
    }

    async fn role_permissions(&self, id: RoleId) -> Result<Vec<Permission>, StoreError> {
        (**self).role_permissions(id).await
    }

    async fn replace_role_permissions(
        &self,
        id: RoleId,
        permission_ids: &BTreeSet<PermissionId>,
        at: DateTime<Utc>,
    ) -> Result<Vec<Permission>, StoreError> {
        (**self).replace_role_permissions(id, permission_ids, at).await
    }
}

#[async_trait]
impl<S> UserStore for Arc<S>
where
    S: UserStore + ?Sized,
{
    async fn insert_user(&self, user: User) -> Result<User, StoreError> {
        (**self).insert_user(user).await
    }

    async fn update_user(&self, user: User) -> Result<User, StoreError> {
        (**self).update_user(user).await
    }

    async fn set_user_password(&self, id: UserId, password_hash: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        (**self).set_user_password(id, password_hash, at).await
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        (**self).get_user(id).await
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        (**self).find_user_by_username(username).await
    }

    async fn list_users(&self, page: &PageRequest) -> Result<Page<User>, StoreError> {
        (**self).list_users(page).await
    }

    async fn set_user_active(&self, id: UserId, active: bool, at: DateTime<Utc>) -> Result<User, StoreError> {
        (**self).set_user_active(id, active, at).await
    }

    async fn record_login(&self, id: UserId, at: DateTime<Utc>) -> Result<(), StoreError> {
        (**self).record_login(id, at).await
    }
}

#[async_trait]
impl<S> SeedStore for Arc<S>
where
    S: SeedStore + ?Sized,
{
    async fn begin_seed(&self) -> Result<Box<dyn SeedTx>, StoreError> {
        (**self).begin_seed().await
    }
}
