use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use simplerp_auth::{Permission, PermissionFilter, Role, User};
use simplerp_core::{Page, PageRequest, PermissionId, RoleId, SoftDelete, UserId};
use simplerp_core::pagination::{SortKey, SortOrder};

use super::{PermissionStore, RoleStore, SeedStore, SeedTx, StoreError, UserStore};

#[derive(Debug, Default, Clone)]
struct Tables {
    permissions: BTreeMap<PermissionId, Permission>,
    roles: BTreeMap<RoleId, Role>,
    links: BTreeSet<(RoleId, PermissionId)>,
    users: BTreeMap<UserId, User>,
}

impl Tables {
    fn active_permission(&self, id: PermissionId) -> Option<&Permission> {
        self.permissions.get(&id).filter(|p| p.is_active())
    }

    fn active_role(&self, id: RoleId) -> Option<&Role> {
        self.roles.get(&id).filter(|r| r.is_active())
    }

    fn role_id_named(&self, name: &str) -> Option<RoleId> {
        self.roles
            .values()
            .find(|r| r.is_active() && r.name == name)
            .map(|r| r.id)
    }

    fn permission_id_named(&self, name: &str) -> Option<PermissionId> {
        self.permissions
            .values()
            .find(|p| p.is_active() && p.name == name)
            .map(|p| p.id)
    }

    fn permission_name_taken(&self, name: &str, except: Option<PermissionId>) -> bool {
        self.permissions
            .values()
            .any(|p| p.is_active() && p.name == name && Some(p.id) != except)
    }

    fn role_name_taken(&self, name: &str, except: Option<RoleId>) -> bool {
        self.roles
            .values()
            .any(|r| r.is_active() && r.name == name && Some(r.id) != except)
    }

    fn email_taken(&self, email: &str, except: Option<UserId>) -> bool {
        self.users
            .values()
            .any(|u| user_cmp_ci(&u.email, email) && Some(u.id) != except)
    }

    fn is_linked(&self, role_id: RoleId, permission_id: PermissionId) -> bool {
        self.links.contains(&(role_id, permission_id))
    }

    fn permissions_of(&self, role_id: RoleId) -> Vec<Permission> {
        let mut out: Vec<Permission> = self
            .links
            .range((role_id, PermissionId::from_uuid(uuid::Uuid::nil()))..)
            .take_while(|(r, _)| *r == role_id)
            .filter_map(|(_, p)| self.active_permission(*p).cloned())
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}

/// In-memory RBAC store.
///
/// Intended for tests/dev. A single lock guards all tables, so every
/// operation is atomic with respect to the others.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> Result<T, StoreError> {
        let guard = self
            .tables
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(f(&guard))
    }

    fn write<T>(&self, f: impl FnOnce(&mut Tables) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let mut guard = self
            .tables
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        f(&mut guard)
    }
}

/// Orders rows by the requested column, breaking ties by id (creation order).
fn sort_rows<T, I: Ord>(
    rows: &mut [T],
    page: &PageRequest,
    key: impl Fn(&T) -> (DateTime<Utc>, DateTime<Utc>, &str, I),
) {
    rows.sort_by(|a, b| {
        let (ca, ua, na, ia) = key(a);
        let (cb, ub, nb, ib) = key(b);
        let primary = match page.sort {
            SortKey::Id => std::cmp::Ordering::Equal,
            SortKey::CreatedAt => ca.cmp(&cb),
            SortKey::UpdatedAt => ua.cmp(&ub),
            SortKey::Name => na.cmp(nb),
        };
        let ord = primary.then_with(|| ia.cmp(&ib));
        match page.order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    });
}

fn permission_key(p: &Permission) -> (DateTime<Utc>, DateTime<Utc>, &str, PermissionId) {
    (p.created_at, p.updated_at, p.name.as_str(), p.id)
}

#[async_trait]
impl PermissionStore for InMemoryStore {
    async fn insert_permission(&self, permission: Permission) -> Result<Permission, StoreError> {
        self.write(|t| {
            if t.permission_name_taken(&permission.name, None) {
                return Err(StoreError::Conflict(format!(
                    "permission '{}' already exists",
                    permission.name
                )));
            }
            t.permissions.insert(permission.id, permission.clone());
            Ok(permission)
        })
    }

    async fn get_permission(&self, id: PermissionId) -> Result<Option<Permission>, StoreError> {
        self.read(|t| t.active_permission(id).cloned())
    }

    async fn find_permission_by_name(&self, name: &str) -> Result<Option<Permission>, StoreError> {
        self.read(|t| {
            t.permissions
                .values()
                .find(|p| p.is_active() && p.name == name)
                .cloned()
        })
    }

    async fn update_permission(&self, permission: Permission) -> Result<Permission, StoreError> {
        self.write(|t| {
            if t.active_permission(permission.id).is_none() {
                return Err(StoreError::NotFound("permission"));
            }
            if t.permission_name_taken(&permission.name, Some(permission.id)) {
                return Err(StoreError::Conflict(format!(
                    "permission '{}' already exists",
                    permission.name
                )));
            }
            t.permissions.insert(permission.id, permission.clone());
            Ok(permission)
        })
    }

    async fn delete_permission(&self, id: PermissionId, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.write(|t| {
            if t.active_permission(id).is_none() {
                return Err(StoreError::NotFound("permission"));
            }
            if t.links.iter().any(|(_, p)| *p == id) {
                return Err(StoreError::Conflict(
                    "permission is in use by one or more roles".to_string(),
                ));
            }
            if let Some(p) = t.permissions.get_mut(&id) {
                p.deleted_at = Some(at);
                p.updated_at = at;
            }
            Ok(())
        })
    }

    async fn list_permissions(
        &self,
        filter: &PermissionFilter,
        page: &PageRequest,
    ) -> Result<Page<Permission>, StoreError> {
        self.read(|t| {
            let mut rows: Vec<Permission> = t
                .permissions
                .values()
                .filter(|p| p.is_active() && filter.matches_fields(p))
                .filter(|p| match filter.role_link() {
                    Some((role_id, linked)) => t.is_linked(role_id, p.id) == linked,
                    None => true,
                })
                .cloned()
                .collect();
            sort_rows(&mut rows, page, permission_key);
            page.slice(rows)
        })
    }

    async fn all_permissions(&self) -> Result<Vec<Permission>, StoreError> {
        self.read(|t| t.permissions.values().filter(|p| p.is_active()).cloned().collect())
    }

    async fn list_modules(&self) -> Result<Vec<String>, StoreError> {
        self.read(|t| {
            t.permissions
                .values()
                .filter(|p| p.is_active())
                .map(|p| p.module.clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        })
    }
}

#[async_trait]
impl RoleStore for InMemoryStore {
    async fn insert_role(&self, role: Role) -> Result<Role, StoreError> {
        self.write(|t| {
            if t.role_name_taken(&role.name, None) {
                return Err(StoreError::Conflict(format!("role '{}' already exists", role.name)));
            }
            t.roles.insert(role.id, role.clone());
            Ok(role)
        })
    }

    async fn get_role(&self, id: RoleId) -> Result<Option<Role>, StoreError> {
        self.read(|t| t.active_role(id).cloned())
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError> {
        self.read(|t| t.roles.values().find(|r| r.is_active() && r.name == name).cloned())
    }

    async fn update_role(&self, role: Role) -> Result<Role, StoreError> {
        self.write(|t| {
            if t.active_role(role.id).is_none() {
                return Err(StoreError::NotFound("role"));
            }
            if t.role_name_taken(&role.name, Some(role.id)) {
                return Err(StoreError::Conflict(format!("role '{}' already exists", role.name)));
            }
            t.roles.insert(role.id, role.clone());
            Ok(role)
        })
    }

    async fn delete_role(&self, id: RoleId, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.write(|t| {
            if t.active_role(id).is_none() {
                return Err(StoreError::NotFound("role"));
            }
            if t.users.values().any(|u| u.is_active && u.role_id == id) {
                return Err(StoreError::Conflict(
                    "role is in use by one or more users".to_string(),
                ));
            }
            t.links.retain(|(r, _)| *r != id);
            if let Some(r) = t.roles.get_mut(&id) {
                r.deleted_at = Some(at);
                r.updated_at = at;
            }
            Ok(())
        })
    }

    async fn list_roles(&self, page: &PageRequest) -> Result<Page<Role>, StoreError> {
        self.read(|t| {
            let mut rows: Vec<Role> = t.roles.values().filter(|r| r.is_active()).cloned().collect();
            sort_rows(&mut rows, page, |r| (r.created_at, r.updated_at, r.name.as_str(), r.id));
            page.slice(rows)
        })
    }

    async fn role_permissions(&self, id: RoleId) -> Result<Vec<Permission>, StoreError> {
        self.read(|t| t.permissions_of(id))
    }

    async fn replace_role_permissions(
        &self,
        id: RoleId,
        permission_ids: &BTreeSet<PermissionId>,
        at: DateTime<Utc>,
    ) -> Result<Vec<Permission>, StoreError> {
        self.write(|t| {
            if t.active_role(id).is_none() {
                return Err(StoreError::NotFound("role"));
            }
            let missing: Vec<PermissionId> = permission_ids
                .iter()
                .filter(|p| t.active_permission(**p).is_none())
                .copied()
                .collect();
            if !missing.is_empty() {
                return Err(StoreError::MissingPermissions(missing));
            }

            t.links
                .retain(|(r, p)| *r != id || permission_ids.contains(p));
            for p in permission_ids {
                t.links.insert((id, *p));
            }
            if let Some(r) = t.roles.get_mut(&id) {
                r.updated_at = at;
            }
            Ok(t.permissions_of(id))
        })
    }
}

fn user_cmp_ci(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn insert_user(&self, user: User) -> Result<User, StoreError> {
        self.write(|t| {
            if t.active_role(user.role_id).is_none() {
                return Err(StoreError::NotFound("role"));
            }
            if t.users.values().any(|u| user_cmp_ci(&u.username, &user.username)) {
                return Err(StoreError::Conflict("username already in use".to_string()));
            }
            if t.email_taken(&user.email, None) {
                return Err(StoreError::Conflict("email already in use".to_string()));
            }
            t.users.insert(user.id, user.clone());
            Ok(user)
        })
    }

    async fn update_user(&self, user: User) -> Result<User, StoreError> {
        self.write(|t| {
            let current = t.users.get(&user.id).ok_or(StoreError::NotFound("user"))?;
            let role_changed = current.role_id != user.role_id;
            if (user.is_active || role_changed) && t.active_role(user.role_id).is_none() {
                return Err(StoreError::NotFound("role"));
            }
            if t.email_taken(&user.email, Some(user.id)) {
                return Err(StoreError::Conflict("email already in use".to_string()));
            }
            let stored = t.users.get_mut(&user.id).ok_or(StoreError::NotFound("user"))?;
            stored.name = user.name;
            stored.email = user.email;
            stored.phone = user.phone;
            stored.role_id = user.role_id;
            stored.is_active = user.is_active;
            stored.updated_at = user.updated_at;
            Ok(stored.clone())
        })
    }

    async fn set_user_password(&self, id: UserId, password_hash: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.write(|t| {
            let user = t.users.get_mut(&id).ok_or(StoreError::NotFound("user"))?;
            user.password_hash = password_hash.to_string();
            user.updated_at = at;
            Ok(())
        })
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        self.read(|t| t.users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.read(|t| t.users.values().find(|u| u.username == username).cloned())
    }

    async fn list_users(&self, page: &PageRequest) -> Result<Page<User>, StoreError> {
        self.read(|t| {
            let mut rows: Vec<User> = t.users.values().cloned().collect();
            sort_rows(&mut rows, page, |u| (u.created_at, u.updated_at, u.name.as_str(), u.id));
            page.slice(rows)
        })
    }

    async fn set_user_active(&self, id: UserId, active: bool, at: DateTime<Utc>) -> Result<User, StoreError> {
        self.write(|t| {
            let user = t.users.get_mut(&id).ok_or(StoreError::NotFound("user"))?;
            user.is_active = active;
            user.updated_at = at;
            Ok(user.clone())
        })
    }

    async fn record_login(&self, id: UserId, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.write(|t| {
            let user = t.users.get_mut(&id).ok_or(StoreError::NotFound("user"))?;
            user.last_login = Some(at);
            Ok(())
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Seeding
// ─────────────────────────────────────────────────────────────────────────────

/// A seed write, replayed against the live tables on commit.
#[derive(Debug)]
enum SeedOp {
    Role(Role),
    Permission(Permission),
    Link { role: String, permission: String },
}

/// Reads and answers from a private snapshot and records every write.
///
/// `commit` replays the log under the write lock by name, so rows written by
/// other callers since `begin_seed` are kept and nothing is inserted twice.
struct InMemorySeedTx {
    target: Arc<RwLock<Tables>>,
    work: Tables,
    log: Vec<SeedOp>,
}

impl Tables {
    fn apply(&mut self, op: SeedOp) {
        match op {
            SeedOp::Role(role) => {
                if !self.role_name_taken(&role.name, None) {
                    self.roles.insert(role.id, role);
                }
            }
            SeedOp::Permission(permission) => {
                if !self.permission_name_taken(&permission.name, None) {
                    self.permissions.insert(permission.id, permission);
                }
            }
            SeedOp::Link { role, permission } => {
                let role_id = self.role_id_named(&role);
                let permission_id = self.permission_id_named(&permission);
                if let (Some(r), Some(p)) = (role_id, permission_id) {
                    self.links.insert((r, p));
                }
            }
        }
    }
}

#[async_trait]
impl SeedTx for InMemorySeedTx {
    async fn ensure_role(&mut self, role: Role) -> Result<bool, StoreError> {
        if self.work.role_name_taken(&role.name, None) {
            return Ok(false);
        }
        self.work.roles.insert(role.id, role.clone());
        self.log.push(SeedOp::Role(role));
        Ok(true)
    }

    async fn ensure_permission(&mut self, permission: Permission) -> Result<bool, StoreError> {
        if self.work.permission_name_taken(&permission.name, None) {
            return Ok(false);
        }
        self.work.permissions.insert(permission.id, permission.clone());
        self.log.push(SeedOp::Permission(permission));
        Ok(true)
    }

    async fn role_id_by_name(&mut self, name: &str) -> Result<Option<RoleId>, StoreError> {
        Ok(self.work.role_id_named(name))
    }

    async fn active_permissions(&mut self) -> Result<Vec<Permission>, StoreError> {
        Ok(self
            .work
            .permissions
            .values()
            .filter(|p| p.is_active())
            .cloned()
            .collect())
    }

    async fn link_if_absent(&mut self, role_id: RoleId, permission_id: PermissionId) -> Result<bool, StoreError> {
        let role = self.work.active_role(role_id).ok_or(StoreError::NotFound("role"))?;
        let permission = self
            .work
            .active_permission(permission_id)
            .ok_or(StoreError::NotFound("permission"))?;
        let op = SeedOp::Link {
            role: role.name.clone(),
            permission: permission.name.clone(),
        };
        if !self.work.links.insert((role_id, permission_id)) {
            return Ok(false);
        }
        self.log.push(op);
        Ok(true)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut guard = self
            .target
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        for op in self.log {
            guard.apply(op);
        }
        Ok(())
    }
}

#[async_trait]
impl SeedStore for InMemoryStore {
    async fn begin_seed(&self) -> Result<Box<dyn SeedTx>, StoreError> {
        let work = self.read(Tables::clone)?;
        Ok(Box::new(InMemorySeedTx {
            target: Arc::clone(&self.tables),
            work,
            log: Vec::new(),
        }))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use simplerp_auth::{NewPermission, NewRole};
    use simplerp_core::PageDefaults;

    fn perm(name: &str, module: &str) -> Permission {
        NewPermission::new(name, "description", module)
            .normalize()
            .unwrap()
            .into_permission(Utc::now())
    }

    fn role(name: &str) -> Role {
        NewRole::new(name, "").normalize().unwrap().into_role(Utc::now())
    }

    #[tokio::test]
    async fn tombstoned_name_can_be_reused() {
        let store = InMemoryStore::new();
        let p = store.insert_permission(perm("sales.view", "sales")).await.unwrap();
        store.delete_permission(p.id, Utc::now()).await.unwrap();
        assert!(store.get_permission(p.id).await.unwrap().is_none());
        store.insert_permission(perm("sales.view", "sales")).await.unwrap();
    }

    #[tokio::test]
    async fn role_link_filter_splits_linked_and_unlinked() {
        let store = InMemoryStore::new();
        let a = store.insert_permission(perm("sales.view", "sales")).await.unwrap();
        let b = store.insert_permission(perm("sales.edit", "sales")).await.unwrap();
        let r = store.insert_role(role("VENDAS")).await.unwrap();
        store
            .replace_role_permissions(r.id, &BTreeSet::from([a.id]), Utc::now())
            .await
            .unwrap();

        let linked = PermissionFilter {
            role_id: Some(r.id),
            ..Default::default()
        };
        let page = store.list_permissions(&linked, &PageRequest::default()).await.unwrap();
        assert_eq!(page.items.iter().map(|p| p.id).collect::<Vec<_>>(), vec![a.id]);

        let unlinked = PermissionFilter {
            role_id: Some(r.id),
            linked: Some(false),
            ..Default::default()
        };
        let page = store.list_permissions(&unlinked, &PageRequest::default()).await.unwrap();
        assert_eq!(page.items.iter().map(|p| p.id).collect::<Vec<_>>(), vec![b.id]);
    }

    #[tokio::test]
    async fn dropped_seed_tx_leaves_tables_untouched() {
        let store = InMemoryStore::new();
        {
            let mut tx = store.begin_seed().await.unwrap();
            assert!(tx.ensure_role(role("ADMIN")).await.unwrap());
        }
        assert!(store.find_role_by_name("ADMIN").await.unwrap().is_none());

        let mut tx = store.begin_seed().await.unwrap();
        tx.ensure_role(role("ADMIN")).await.unwrap();
        tx.commit().await.unwrap();
        assert!(store.find_role_by_name("ADMIN").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn seed_commit_keeps_concurrent_writes() {
        let store = InMemoryStore::new();
        let mut tx = store.begin_seed().await.unwrap();
        tx.ensure_role(role("ADMIN")).await.unwrap();
        tx.ensure_permission(perm("sales.view", "sales")).await.unwrap();
        let admin = tx.role_id_by_name("ADMIN").await.unwrap().unwrap();
        let seeded = tx.active_permissions().await.unwrap();
        tx.link_if_absent(admin, seeded[0].id).await.unwrap();

        let outside = store.insert_permission(perm("customers.view", "customers")).await.unwrap();
        let racing = store.insert_permission(perm("sales.view", "sales")).await.unwrap();
        tx.commit().await.unwrap();

        assert!(store.get_permission(outside.id).await.unwrap().is_some());
        let all = store.all_permissions().await.unwrap();
        assert_eq!(all.iter().filter(|p| p.name == "sales.view").count(), 1);

        let admin = store.find_role_by_name("ADMIN").await.unwrap().unwrap();
        let linked = store.role_permissions(admin.id).await.unwrap();
        assert_eq!(linked.iter().map(|p| p.id).collect::<Vec<_>>(), vec![racing.id]);
    }

    fn user(username: &str, role_id: RoleId) -> User {
        let now = Utc::now();
        User {
            id: UserId::new(),
            username: username.into(),
            password_hash: "h".into(),
            name: username.into(),
            email: format!("{username}@simplerp.test"),
            phone: None,
            is_active: true,
            last_login: None,
            role_id,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn users_cannot_land_on_a_deleted_role() {
        let store = InMemoryStore::new();
        let gone = store.insert_role(role("TEMP")).await.unwrap();
        store.delete_role(gone.id, Utc::now()).await.unwrap();

        let err = store.insert_user(user("maria", gone.id)).await.unwrap_err();
        assert_eq!(err, StoreError::NotFound("role"));
        assert!(store.list_users(&PageRequest::default()).await.unwrap().items.is_empty());

        let vendas = store.insert_role(role("VENDAS")).await.unwrap();
        let mut maria = store.insert_user(user("maria", vendas.id)).await.unwrap();
        maria.role_id = gone.id;
        assert_eq!(store.update_user(maria).await.unwrap_err(), StoreError::NotFound("role"));
    }

    #[tokio::test]
    async fn update_user_keeps_username_and_hash() {
        let store = InMemoryStore::new();
        let vendas = store.insert_role(role("VENDAS")).await.unwrap();
        let original = store.insert_user(user("maria", vendas.id)).await.unwrap();
        store.insert_user(user("joana", vendas.id)).await.unwrap();

        let mut edited = original.clone();
        edited.username = "other".into();
        edited.password_hash = "changed".into();
        edited.name = "Maria Silva".into();
        let saved = store.update_user(edited.clone()).await.unwrap();
        assert_eq!(saved.username, "maria");
        assert_eq!(saved.password_hash, "h");
        assert_eq!(saved.name, "Maria Silva");

        edited.email = "JOANA@simplerp.test".into();
        assert!(matches!(
            store.update_user(edited).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn list_sorts_by_name_ascending() {
        let store = InMemoryStore::new();
        for name in ["roles.view", "admin.view", "sales.view"] {
            store.insert_permission(perm(name, "misc")).await.unwrap();
        }
        let page = PageRequest::parse(PageDefaults::NEWEST_FIRST, None, None, Some("name"), Some("asc")).unwrap();
        let names: Vec<String> = store
            .list_permissions(&PermissionFilter::default(), &page)
            .await
            .unwrap()
            .items
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["admin.view", "roles.view", "sales.view"]);
    }
}
