//! Postgres-backed RBAC store.
//!
//! ## Error Mapping
//!
//! | SQLx error | PostgreSQL code | StoreError |
//! |------------|-----------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (other) | any other | `Backend` |
//! | PoolClosed / other | n/a | `Backend` |
//!
//! ## Concurrency
//!
//! Name uniqueness is enforced by partial unique indexes
//! (`WHERE deleted_at IS NULL`). Role permission replacement and deletes run
//! in a transaction holding `FOR UPDATE` on the target row; permission rows
//! referenced by a replacement are held `FOR SHARE`, so a concurrent delete of
//! one of them serializes behind it. User writes hold their role `FOR SHARE`
//! the same way.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgExecutor, PgPool, Postgres, QueryBuilder, Row, Transaction};
use tracing::{Span, field, instrument};
use uuid::Uuid;

use simplerp_auth::{Permission, PermissionFilter, Role, User};
use simplerp_core::{Page, PageRequest, PermissionId, RoleId, UserId};

use super::{PermissionStore, RoleStore, SeedStore, SeedTx, StoreError, UserStore};

const PERMISSION_COLUMNS: &str =
    "p.id, p.name, p.description, p.module, p.created_at, p.updated_at, p.deleted_at";
const ROLE_COLUMNS: &str = "r.id, r.name, r.description, r.created_at, r.updated_at, r.deleted_at";
const USER_COLUMNS: &str = "u.id, u.username, u.password_hash, u.name, u.email, u.phone, \
     u.is_active, u.last_login, u.role_id, u.created_at, u.updated_at";

/// Postgres RBAC store.
///
/// `Send + Sync`; cloning shares the pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Permissions
// ─────────────────────────────────────────────────────────────────────────────

fn push_permission_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &PermissionFilter) {
    qb.push(" WHERE p.deleted_at IS NULL");
    if let Some(pattern) = filter.name_pattern() {
        qb.push(" AND LOWER(p.name) LIKE ")
            .push_bind(format!("%{}%", escape_like(&pattern)));
    }
    if let Some(module) = filter.module() {
        qb.push(" AND p.module = ").push_bind(module.to_string());
    }
    if let Some((role_id, linked)) = filter.role_link() {
        qb.push(if linked { " AND EXISTS" } else { " AND NOT EXISTS" })
            .push(" (SELECT 1 FROM role_permissions rp WHERE rp.permission_id = p.id AND rp.role_id = ")
            .push_bind(*role_id.as_uuid())
            .push(")");
    }
}

fn push_order_and_window(qb: &mut QueryBuilder<'_, Postgres>, alias: &str, page: &PageRequest) {
    let dir = page.order.keyword();
    qb.push(format!(
        " ORDER BY {alias}.{col} {dir}, {alias}.id {dir}",
        col = page.sort.column()
    ));
    qb.push(" LIMIT ")
        .push_bind(i64::from(page.limit))
        .push(" OFFSET ")
        .push_bind(page.offset() as i64);
}

/// Escapes LIKE metacharacters (backslash is the default escape in Postgres).
fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

async fn fetch_role_permissions<'e, E>(exec: E, role_id: RoleId) -> Result<Vec<Permission>, StoreError>
where
    E: PgExecutor<'e>,
{
    let rows = sqlx::query(&format!(
        "SELECT {PERMISSION_COLUMNS} FROM permissions p \
         JOIN role_permissions rp ON rp.permission_id = p.id \
         WHERE rp.role_id = $1 AND p.deleted_at IS NULL \
         ORDER BY p.name ASC"
    ))
    .bind(role_id.as_uuid())
    .fetch_all(exec)
    .await
    .map_err(|e| map_sqlx_error("role_permissions", e))?;

    decode_rows::<PermissionRow, Permission>(&rows)
}

#[async_trait]
impl PermissionStore for PostgresStore {
    #[instrument(skip(self, permission), fields(name = %permission.name), err)]
    async fn insert_permission(&self, permission: Permission) -> Result<Permission, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO permissions (id, name, description, module, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(permission.id.as_uuid())
        .bind(&permission.name)
        .bind(&permission.description)
        .bind(&permission.module)
        .bind(permission.created_at)
        .bind(permission.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!("permission '{}' already exists", permission.name))
            } else {
                map_sqlx_error("insert_permission", e)
            }
        })?;

        Ok(permission)
    }

    #[instrument(skip(self), fields(permission_id = %id), err)]
    async fn get_permission(&self, id: PermissionId) -> Result<Option<Permission>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions p WHERE p.id = $1 AND p.deleted_at IS NULL"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_permission", e))?;

        row.as_ref().map(decode_row::<PermissionRow, Permission>).transpose()
    }

    #[instrument(skip(self), err)]
    async fn find_permission_by_name(&self, name: &str) -> Result<Option<Permission>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions p WHERE p.name = $1 AND p.deleted_at IS NULL"
        ))
        .bind(name)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_permission_by_name", e))?;

        row.as_ref().map(decode_row::<PermissionRow, Permission>).transpose()
    }

    #[instrument(skip(self, permission), fields(permission_id = %permission.id), err)]
    async fn update_permission(&self, permission: Permission) -> Result<Permission, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE permissions
            SET name = $2, description = $3, module = $4, updated_at = $5
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(permission.id.as_uuid())
        .bind(&permission.name)
        .bind(&permission.description)
        .bind(&permission.module)
        .bind(permission.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!("permission '{}' already exists", permission.name))
            } else {
                map_sqlx_error("update_permission", e)
            }
        })?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("permission"));
        }
        Ok(permission)
    }

    #[instrument(skip(self), fields(permission_id = %id), err)]
    async fn delete_permission(&self, id: PermissionId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let exists = sqlx::query("SELECT id FROM permissions WHERE id = $1 AND deleted_at IS NULL FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_permission", e))?;
        if exists.is_none() {
            return Err(StoreError::NotFound("permission"));
        }

        let in_use: bool = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM role_permissions WHERE permission_id = $1) AS in_use",
        )
        .bind(id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .and_then(|row| row.try_get("in_use"))
        .map_err(|e| map_sqlx_error("permission_in_use", e))?;
        if in_use {
            return Err(StoreError::Conflict(
                "permission is in use by one or more roles".to_string(),
            ));
        }

        sqlx::query("UPDATE permissions SET deleted_at = $2, updated_at = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_permission", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    #[instrument(skip(self, filter, page), fields(row_count = field::Empty), err)]
    async fn list_permissions(
        &self,
        filter: &PermissionFilter,
        page: &PageRequest,
    ) -> Result<Page<Permission>, StoreError> {
        let span = Span::current();

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) AS total FROM permissions p");
        push_permission_filters(&mut count, filter);
        let total: i64 = count
            .build()
            .fetch_one(&*self.pool)
            .await
            .and_then(|row| row.try_get("total"))
            .map_err(|e| map_sqlx_error("count_permissions", e))?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {PERMISSION_COLUMNS} FROM permissions p"));
        push_permission_filters(&mut select, filter);
        push_order_and_window(&mut select, "p", page);
        let rows = select
            .build()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_permissions", e))?;

        let items = decode_rows::<PermissionRow, Permission>(&rows)?;
        span.record("row_count", items.len());
        Ok(page.page_of(items, total.max(0) as u64))
    }

    #[instrument(skip(self), err)]
    async fn all_permissions(&self) -> Result<Vec<Permission>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions p WHERE p.deleted_at IS NULL"
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("all_permissions", e))?;

        decode_rows::<PermissionRow, Permission>(&rows)
    }

    #[instrument(skip(self), err)]
    async fn list_modules(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            "SELECT DISTINCT module FROM permissions WHERE deleted_at IS NULL ORDER BY module",
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_modules", e))?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("module"))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error("list_modules", e))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Roles
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl RoleStore for PostgresStore {
    #[instrument(skip(self, role), fields(name = %role.name), err)]
    async fn insert_role(&self, role: Role) -> Result<Role, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO roles (id, name, description, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(role.id.as_uuid())
        .bind(&role.name)
        .bind(&role.description)
        .bind(role.created_at)
        .bind(role.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!("role '{}' already exists", role.name))
            } else {
                map_sqlx_error("insert_role", e)
            }
        })?;

        Ok(role)
    }

    #[instrument(skip(self), fields(role_id = %id), err)]
    async fn get_role(&self, id: RoleId) -> Result<Option<Role>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles r WHERE r.id = $1 AND r.deleted_at IS NULL"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_role", e))?;

        row.as_ref().map(decode_row::<RoleRow, Role>).transpose()
    }

    #[instrument(skip(self), err)]
    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles r WHERE r.name = $1 AND r.deleted_at IS NULL"
        ))
        .bind(name)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_role_by_name", e))?;

        row.as_ref().map(decode_row::<RoleRow, Role>).transpose()
    }

    #[instrument(skip(self, role), fields(role_id = %role.id), err)]
    async fn update_role(&self, role: Role) -> Result<Role, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE roles
            SET name = $2, description = $3, updated_at = $4
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(role.id.as_uuid())
        .bind(&role.name)
        .bind(&role.description)
        .bind(role.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!("role '{}' already exists", role.name))
            } else {
                map_sqlx_error("update_role", e)
            }
        })?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("role"));
        }
        Ok(role)
    }

    #[instrument(skip(self), fields(role_id = %id), err)]
    async fn delete_role(&self, id: RoleId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        lock_role(&mut tx, id).await?;

        let in_use: bool = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM users WHERE role_id = $1 AND is_active) AS in_use",
        )
        .bind(id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .and_then(|row| row.try_get("in_use"))
        .map_err(|e| map_sqlx_error("role_in_use", e))?;
        if in_use {
            return Err(StoreError::Conflict(
                "role is in use by one or more users".to_string(),
            ));
        }

        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_role_links", e))?;

        sqlx::query("UPDATE roles SET deleted_at = $2, updated_at = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_role", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    #[instrument(skip(self, page), err)]
    async fn list_roles(&self, page: &PageRequest) -> Result<Page<Role>, StoreError> {
        let total: i64 = sqlx::query("SELECT COUNT(*) AS total FROM roles WHERE deleted_at IS NULL")
            .fetch_one(&*self.pool)
            .await
            .and_then(|row| row.try_get("total"))
            .map_err(|e| map_sqlx_error("count_roles", e))?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {ROLE_COLUMNS} FROM roles r WHERE r.deleted_at IS NULL"
        ));
        push_order_and_window(&mut select, "r", page);
        let rows = select
            .build()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_roles", e))?;

        Ok(page.page_of(decode_rows::<RoleRow, Role>(&rows)?, total.max(0) as u64))
    }

    #[instrument(skip(self), fields(role_id = %id), err)]
    async fn role_permissions(&self, id: RoleId) -> Result<Vec<Permission>, StoreError> {
        fetch_role_permissions(&*self.pool, id).await
    }

    #[instrument(
        skip(self, permission_ids),
        fields(
            role_id = %id,
            permission_count = permission_ids.len(),
            removed = field::Empty,
            added = field::Empty
        ),
        err
    )]
    async fn replace_role_permissions(
        &self,
        id: RoleId,
        permission_ids: &BTreeSet<PermissionId>,
        at: DateTime<Utc>,
    ) -> Result<Vec<Permission>, StoreError> {
        let span = Span::current();
        let wanted: Vec<Uuid> = permission_ids.iter().map(|p| *p.as_uuid()).collect();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        lock_role(&mut tx, id).await?;

        if !wanted.is_empty() {
            let rows = sqlx::query(
                "SELECT id FROM permissions WHERE id = ANY($1) AND deleted_at IS NULL FOR SHARE",
            )
            .bind(&wanted)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("resolve_permissions", e))?;
            let found = rows
                .iter()
                .map(|row| row.try_get::<Uuid, _>("id"))
                .collect::<Result<BTreeSet<_>, _>>()
                .map_err(|e| map_sqlx_error("resolve_permissions", e))?;
            let missing: Vec<PermissionId> = wanted
                .iter()
                .filter(|u| !found.contains(*u))
                .map(|u| PermissionId::from_uuid(*u))
                .collect();
            if !missing.is_empty() {
                return Err(StoreError::MissingPermissions(missing));
            }
        }

        let removed = sqlx::query(
            "DELETE FROM role_permissions WHERE role_id = $1 AND NOT (permission_id = ANY($2))",
        )
        .bind(id.as_uuid())
        .bind(&wanted)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("remove_links", e))?
        .rows_affected();

        let added = sqlx::query(
            r#"
            INSERT INTO role_permissions (role_id, permission_id, created_at)
            SELECT $1, pid, $3 FROM UNNEST($2::uuid[]) AS pid
            ON CONFLICT (role_id, permission_id) DO NOTHING
            "#,
        )
        .bind(id.as_uuid())
        .bind(&wanted)
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("add_links", e))?
        .rows_affected();

        sqlx::query("UPDATE roles SET updated_at = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("touch_role", e))?;

        let permissions = fetch_role_permissions(&mut *tx, id).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        span.record("removed", removed);
        span.record("added", added);
        Ok(permissions)
    }
}

async fn lock_role(tx: &mut Transaction<'static, Postgres>, id: RoleId) -> Result<(), StoreError> {
    let row = sqlx::query("SELECT id FROM roles WHERE id = $1 AND deleted_at IS NULL FOR UPDATE")
        .bind(id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_role", e))?;
    match row {
        Some(_) => Ok(()),
        None => Err(StoreError::NotFound("role")),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────────

/// Holds the active role row `FOR SHARE` until the transaction ends, so a
/// concurrent `delete_role` (which takes `FOR UPDATE`) waits for the user
/// write and then sees it.
async fn share_role(tx: &mut Transaction<'static, Postgres>, id: RoleId) -> Result<(), StoreError> {
    let row = sqlx::query("SELECT id FROM roles WHERE id = $1 AND deleted_at IS NULL FOR SHARE")
        .bind(id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("share_role", e))?;
    match row {
        Some(_) => Ok(()),
        None => Err(StoreError::NotFound("role")),
    }
}

#[async_trait]
impl UserStore for PostgresStore {
    #[instrument(skip(self, user), fields(username = %user.username), err)]
    async fn insert_user(&self, user: User) -> Result<User, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        share_role(&mut tx, user.role_id).await?;

        sqlx::query(
            r#"
            INSERT INTO users (
                id, username, password_hash, name, email, phone,
                is_active, last_login, role_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(user.is_active)
        .bind(user.last_login)
        .bind(user.role_id.as_uuid())
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_user", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(user)
    }

    #[instrument(skip(self, user), fields(user_id = %user.id), err)]
    async fn update_user(&self, user: User) -> Result<User, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let current: Uuid = sqlx::query("SELECT role_id FROM users WHERE id = $1 FOR UPDATE")
            .bind(user.id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_user", e))?
            .ok_or(StoreError::NotFound("user"))?
            .try_get("role_id")
            .map_err(|e| map_sqlx_error("lock_user", e))?;

        if user.is_active || current != *user.role_id.as_uuid() {
            share_role(&mut tx, user.role_id).await?;
        }

        let row = sqlx::query(&format!(
            "UPDATE users u SET name = $2, email = $3, phone = $4, role_id = $5, \
             is_active = $6, updated_at = $7 WHERE u.id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(user.id.as_uuid())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(user.role_id.as_uuid())
        .bind(user.is_active)
        .bind(user.updated_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_user", e))?;
        let updated = decode_row::<UserRow, User>(&row)?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(updated)
    }

    #[instrument(skip(self, password_hash), fields(user_id = %id), err)]
    async fn set_user_password(&self, id: UserId, password_hash: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET password_hash = $2, updated_at = $3 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(password_hash)
            .bind(at)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("set_user_password", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("user"));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_user", e))?;

        row.as_ref().map(decode_row::<UserRow, User>).transpose()
    }

    #[instrument(skip(self), err)]
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users u WHERE u.username = $1"))
            .bind(username)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_user_by_username", e))?;

        row.as_ref().map(decode_row::<UserRow, User>).transpose()
    }

    #[instrument(skip(self, page), err)]
    async fn list_users(&self, page: &PageRequest) -> Result<Page<User>, StoreError> {
        let total: i64 = sqlx::query("SELECT COUNT(*) AS total FROM users")
            .fetch_one(&*self.pool)
            .await
            .and_then(|row| row.try_get("total"))
            .map_err(|e| map_sqlx_error("count_users", e))?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {USER_COLUMNS} FROM users u"));
        push_order_and_window(&mut select, "u", page);
        let rows = select
            .build()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_users", e))?;

        Ok(page.page_of(decode_rows::<UserRow, User>(&rows)?, total.max(0) as u64))
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn set_user_active(&self, id: UserId, active: bool, at: DateTime<Utc>) -> Result<User, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE users u SET is_active = $2, updated_at = $3 WHERE u.id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(active)
        .bind(at)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("set_user_active", e))?;

        match row {
            Some(row) => decode_row::<UserRow, User>(&row),
            None => Err(StoreError::NotFound("user")),
        }
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn record_login(&self, id: UserId, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET last_login = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(at)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("record_login", e))?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Seeding
// ─────────────────────────────────────────────────────────────────────────────

/// A seed run inside one database transaction. Dropping without `commit`
/// rolls back.
struct PgSeedTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl SeedTx for PgSeedTx {
    async fn ensure_role(&mut self, role: Role) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO roles (id, name, description, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (name) WHERE deleted_at IS NULL DO NOTHING
            "#,
        )
        .bind(role.id.as_uuid())
        .bind(&role.name)
        .bind(&role.description)
        .bind(role.created_at)
        .bind(role.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("seed_role", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn ensure_permission(&mut self, permission: Permission) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO permissions (id, name, description, module, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (name) WHERE deleted_at IS NULL DO NOTHING
            "#,
        )
        .bind(permission.id.as_uuid())
        .bind(&permission.name)
        .bind(&permission.description)
        .bind(&permission.module)
        .bind(permission.created_at)
        .bind(permission.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("seed_permission", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn role_id_by_name(&mut self, name: &str) -> Result<Option<RoleId>, StoreError> {
        let row = sqlx::query("SELECT id FROM roles WHERE name = $1 AND deleted_at IS NULL")
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("seed_find_role", e))?;
        row.map(|r| r.try_get::<Uuid, _>("id").map(RoleId::from_uuid))
            .transpose()
            .map_err(|e| map_sqlx_error("seed_find_role", e))
    }

    async fn active_permissions(&mut self) -> Result<Vec<Permission>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions p WHERE p.deleted_at IS NULL"
        ))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("seed_permissions", e))?;
        decode_rows::<PermissionRow, Permission>(&rows)
    }

    async fn link_if_absent(&mut self, role_id: RoleId, permission_id: PermissionId) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO role_permissions (role_id, permission_id, created_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (role_id, permission_id) DO NOTHING
            "#,
        )
        .bind(role_id.as_uuid())
        .bind(permission_id.as_uuid())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("seed_link", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

#[async_trait]
impl SeedStore for PostgresStore {
    async fn begin_seed(&self) -> Result<Box<dyn SeedTx>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(Box::new(PgSeedTx { tx }))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Error mapping
// ─────────────────────────────────────────────────────────────────────────────

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(unique_violation_message(db_err.constraint())),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn unique_violation_message(constraint: Option<&str>) -> String {
    match constraint {
        Some("users_username_uq") => "username already in use",
        Some("users_email_uq") => "email already in use",
        Some("permissions_name_active_uq") => "permission name already exists",
        Some("roles_name_active_uq") => "role name already exists",
        _ => "duplicate value",
    }
    .to_string()
}

/// Check if an error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

// SQLx row types

fn decode_row<R, T>(row: &PgRow) -> Result<T, StoreError>
where
    R: for<'r> FromRow<'r, PgRow> + Into<T>,
{
    R::from_row(row)
        .map(Into::into)
        .map_err(|e| StoreError::Backend(format!("failed to decode row: {e}")))
}

fn decode_rows<R, T>(rows: &[PgRow]) -> Result<Vec<T>, StoreError>
where
    R: for<'r> FromRow<'r, PgRow> + Into<T>,
{
    rows.iter().map(decode_row::<R, T>).collect()
}

#[derive(Debug)]
struct PermissionRow {
    id: Uuid,
    name: String,
    description: String,
    module: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for PermissionRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(PermissionRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            module: row.try_get("module")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }
}

impl From<PermissionRow> for Permission {
    fn from(row: PermissionRow) -> Self {
        Permission {
            id: PermissionId::from_uuid(row.id),
            name: row.name,
            description: row.description,
            module: row.module,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        }
    }
}

#[derive(Debug)]
struct RoleRow {
    id: Uuid,
    name: String,
    description: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for RoleRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(RoleRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }
}

impl From<RoleRow> for Role {
    fn from(row: RoleRow) -> Self {
        Role {
            id: RoleId::from_uuid(row.id),
            name: row.name,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        }
    }
}

#[derive(Debug)]
struct UserRow {
    id: Uuid,
    username: String,
    password_hash: String,
    name: String,
    email: String,
    phone: Option<String>,
    is_active: bool,
    last_login: Option<DateTime<Utc>>,
    role_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for UserRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(UserRow {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            password_hash: row.try_get("password_hash")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            is_active: row.try_get("is_active")?,
            last_login: row.try_get("last_login")?,
            role_id: row.try_get("role_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: UserId::from_uuid(row.id),
            username: row.username,
            password_hash: row.password_hash,
            name: row.name,
            email: row.email,
            phone: row.phone,
            is_active: row.is_active,
            last_login: row.last_login,
            role_id: RoleId::from_uuid(row.role_id),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_metacharacters_are_escaped() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("sales.view"), "sales.view");
    }

    #[test]
    fn unknown_constraint_gets_generic_message() {
        assert_eq!(unique_violation_message(None), "duplicate value");
        assert_eq!(
            unique_violation_message(Some("users_email_uq")),
            "email already in use"
        );
    }
}
