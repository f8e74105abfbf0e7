//! Permission records and their input rules.
//!
//! A permission is identified by a dotted `module.action` name (for example
//! `customers.view`). The `module` field is a free-form grouping key and is
//! not required to match the name prefix.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use simplerp_core::{DomainError, Entity, FieldErrors, PermissionId, RoleId, SoftDelete};

pub const NAME_LEN: (usize, usize) = (3, 100);
pub const DESCRIPTION_LEN: (usize, usize) = (3, 500);
pub const MODULE_LEN: (usize, usize) = (3, 50);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub name: String,
    pub description: String,
    pub module: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Entity for Permission {
    type Id = PermissionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl SoftDelete for Permission {
    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}

/// Input for creating a permission.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewPermission {
    pub name: String,
    pub description: String,
    pub module: String,
}

impl NewPermission {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        module: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            module: module.into(),
        }
    }

    /// Trims every field and checks the length bounds.
    pub fn normalize(self) -> Result<Self, DomainError> {
        let name = self.name.trim().to_string();
        let description = self.description.trim().to_string();
        let module = self.module.trim().to_string();

        let mut errors = FieldErrors::new();
        errors.check_len("name", &name, NAME_LEN.0, NAME_LEN.1);
        errors.check_len("description", &description, DESCRIPTION_LEN.0, DESCRIPTION_LEN.1);
        errors.check_len("module", &module, MODULE_LEN.0, MODULE_LEN.1);
        errors.into_result()?;

        Ok(Self {
            name,
            description,
            module,
        })
    }

    pub fn into_permission(self, now: DateTime<Utc>) -> Permission {
        Permission {
            id: PermissionId::new(),
            name: self.name,
            description: self.description,
            module: self.module,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

/// Partial update. Supplied fields replace prior values; `None` keeps them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PermissionChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub module: Option<String>,
}

impl PermissionChanges {
    pub fn normalize(self) -> Result<Self, DomainError> {
        let name = self.name.map(|v| v.trim().to_string());
        let description = self.description.map(|v| v.trim().to_string());
        let module = self.module.map(|v| v.trim().to_string());

        let mut errors = FieldErrors::new();
        if let Some(v) = &name {
            errors.check_len("name", v, NAME_LEN.0, NAME_LEN.1);
        }
        if let Some(v) = &description {
            errors.check_len("description", v, DESCRIPTION_LEN.0, DESCRIPTION_LEN.1);
        }
        if let Some(v) = &module {
            errors.check_len("module", v, MODULE_LEN.0, MODULE_LEN.1);
        }
        errors.into_result()?;

        Ok(Self {
            name,
            description,
            module,
        })
    }

    pub fn apply(&self, permission: &mut Permission, now: DateTime<Utc>) {
        if let Some(v) = &self.name {
            permission.name = v.clone();
        }
        if let Some(v) = &self.description {
            permission.description = v.clone();
        }
        if let Some(v) = &self.module {
            permission.module = v.clone();
        }
        permission.updated_at = now;
    }
}

/// List filter.
///
/// With `role_id` set, `linked` selects permissions linked to the role
/// (`None` or `Some(true)`) or the ones the role does not have (`Some(false)`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionFilter {
    pub name: Option<String>,
    pub module: Option<String>,
    pub role_id: Option<RoleId>,
    pub linked: Option<bool>,
}

impl PermissionFilter {
    /// Lowercased, trimmed name pattern; blank patterns are ignored.
    pub fn name_pattern(&self) -> Option<String> {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }

    pub fn module(&self) -> Option<&str> {
        self.module.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn role_link(&self) -> Option<(RoleId, bool)> {
        self.role_id.map(|r| (r, self.linked.unwrap_or(true)))
    }

    /// Name and module predicates. Role linkage is evaluated by the store.
    pub fn matches_fields(&self, permission: &Permission) -> bool {
        if let Some(pattern) = self.name_pattern() {
            if !permission.name.to_lowercase().contains(&pattern) {
                return false;
            }
        }
        if let Some(module) = self.module() {
            if permission.module != module {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleGroup {
    pub module: String,
    pub permissions: Vec<Permission>,
}

/// Partitions active permissions by module, sorted by module then name.
pub fn group_by_module(permissions: impl IntoIterator<Item = Permission>) -> Vec<ModuleGroup> {
    let mut groups: BTreeMap<String, Vec<Permission>> = BTreeMap::new();
    for p in permissions.into_iter().filter(|p| p.is_active()) {
        groups.entry(p.module.clone()).or_default().push(p);
    }
    groups
        .into_iter()
        .map(|(module, mut permissions)| {
            permissions.sort_by(|a, b| a.name.cmp(&b.name));
            ModuleGroup {
                module,
                permissions,
            }
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn perm(name: &str, module: &str) -> Permission {
        NewPermission::new(name, "some description", module)
            .normalize()
            .unwrap()
            .into_permission(Utc::now())
    }

    #[test]
    fn normalize_trims_and_accepts_bounds() {
        let p = NewPermission::new("  customers.view ", " Visualizar clientes ", " sales.cadastros ")
            .normalize()
            .unwrap();
        assert_eq!(p.name, "customers.view");
        assert_eq!(p.description, "Visualizar clientes");
        assert_eq!(p.module, "sales.cadastros");
    }

    #[test]
    fn normalize_reports_every_failing_field() {
        let err = NewPermission::new("ab", "", &"m".repeat(51)).normalize().unwrap_err();
        let DomainError::Validation(fields) = err else {
            panic!("expected validation error");
        };
        let map = fields.to_map();
        assert!(map.contains_key("name"));
        assert!(map.contains_key("description"));
        assert!(map.contains_key("module"));
    }

    #[test]
    fn changes_keep_omitted_fields() {
        let mut p = perm("sales.view", "sales");
        let changes = PermissionChanges {
            description: Some("Visualizar vendas".into()),
            ..Default::default()
        }
        .normalize()
        .unwrap();
        changes.apply(&mut p, Utc::now());
        assert_eq!(p.name, "sales.view");
        assert_eq!(p.module, "sales");
        assert_eq!(p.description, "Visualizar vendas");
    }

    #[test]
    fn filter_name_is_case_insensitive_substring() {
        let p = perm("Customers.View", "sales");
        let filter = PermissionFilter {
            name: Some("omers.v".into()),
            ..Default::default()
        };
        assert!(filter.matches_fields(&p));

        let filter = PermissionFilter {
            module: Some("Sales".into()),
            ..Default::default()
        };
        assert!(!filter.matches_fields(&p), "module match is exact");
    }

    #[test]
    fn role_link_defaults_to_linked() {
        let role = RoleId::new();
        let filter = PermissionFilter {
            role_id: Some(role),
            ..Default::default()
        };
        assert_eq!(filter.role_link(), Some((role, true)));
    }

    #[test]
    fn group_by_module_skips_deleted_rows() {
        let mut gone = perm("finance.view", "finance");
        gone.deleted_at = Some(Utc::now());
        let groups = group_by_module(vec![
            perm("sales.view", "sales"),
            perm("sales.create", "sales"),
            gone,
        ]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].module, "sales");
        assert_eq!(groups[0].permissions[0].name, "sales.create");
    }
}
