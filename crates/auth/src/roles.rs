//! Role records.
//!
//! A role owns its permission links; the links are only ever changed as a
//! whole set (replace) or link-if-absent by the seeder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use simplerp_core::{DomainError, Entity, FieldErrors, RoleId, SoftDelete};

use crate::Permission;

pub const NAME_LEN: (usize, usize) = (3, 50);
pub const DESCRIPTION_MAX: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Entity for Role {
    type Id = RoleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl SoftDelete for Role {
    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}

/// A role with its resolved permission set, sorted by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleWithPermissions {
    #[serde(flatten)]
    pub role: Role,
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewRole {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl NewRole {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }

    pub fn normalize(self) -> Result<Self, DomainError> {
        let name = self.name.trim().to_string();
        let description = self.description.trim().to_string();

        let mut errors = FieldErrors::new();
        errors.check_len("name", &name, NAME_LEN.0, NAME_LEN.1);
        errors.check_len("description", &description, 0, DESCRIPTION_MAX);
        errors.into_result()?;

        Ok(Self { name, description })
    }

    /// New roles start with an empty permission set.
    pub fn into_role(self, now: DateTime<Utc>) -> Role {
        Role {
            id: RoleId::new(),
            name: self.name,
            description: self.description,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RoleChanges {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl RoleChanges {
    pub fn normalize(self) -> Result<Self, DomainError> {
        let name = self.name.map(|v| v.trim().to_string());
        let description = self.description.map(|v| v.trim().to_string());

        let mut errors = FieldErrors::new();
        if let Some(v) = &name {
            errors.check_len("name", v, NAME_LEN.0, NAME_LEN.1);
        }
        if let Some(v) = &description {
            errors.check_len("description", v, 0, DESCRIPTION_MAX);
        }
        errors.into_result()?;

        Ok(Self { name, description })
    }

    pub fn apply(&self, role: &mut Role, now: DateTime<Utc>) {
        if let Some(v) = &self.name {
            role.name = v.clone();
        }
        if let Some(v) = &self.description {
            role.description = v.clone();
        }
        role.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_name_bounds() {
        assert!(NewRole::new("AB", "").normalize().is_err());
        assert!(NewRole::new("x".repeat(51), "").normalize().is_err());
        assert!(NewRole::new("VENDAS", "").normalize().is_ok());
    }

    #[test]
    fn description_is_optional_but_bounded() {
        let err = NewRole::new("GESTOR", "d".repeat(256)).normalize().unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn changes_update_only_supplied_fields() {
        let mut role = NewRole::new("ESTOQUE", "Acesso ao módulo de estoque")
            .normalize()
            .unwrap()
            .into_role(Utc::now());
        RoleChanges {
            name: Some(" ESTOQUE2 ".into()),
            description: None,
        }
        .normalize()
        .unwrap()
        .apply(&mut role, Utc::now());
        assert_eq!(role.name, "ESTOQUE2");
        assert_eq!(role.description, "Acesso ao módulo de estoque");
    }
}
