//! User accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use simplerp_core::{DomainError, Entity, FieldErrors, RoleId, UserId};

pub const USERNAME_LEN: (usize, usize) = (3, 50);
pub const PASSWORD_MIN: usize = 6;

/// A user account.
///
/// Users are never tombstoned; they are deactivated (`is_active = false`),
/// which blocks login and refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub role_id: RoleId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub role_id: RoleId,
}

impl NewUser {
    /// Trims text fields (never the password) and checks their shape.
    pub fn normalize(self) -> Result<Self, DomainError> {
        let username = self.username.trim().to_string();
        let name = self.name.trim().to_string();
        let email = self.email.trim().to_string();
        let phone = self
            .phone
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());

        let mut errors = FieldErrors::new();
        errors.check_len("username", &username, USERNAME_LEN.0, USERNAME_LEN.1);
        check_password(&mut errors, "password", &self.password);
        errors.check_len("name", &name, 1, 100);
        check_email(&mut errors, &email);
        if let Some(p) = &phone {
            errors.check_len("phone", p, 1, 20);
        }
        errors.into_result()?;

        Ok(Self {
            username,
            password: self.password,
            name,
            email,
            phone,
            role_id: self.role_id,
        })
    }

    pub fn into_user(self, password_hash: String, now: DateTime<Utc>) -> User {
        User {
            id: UserId::new(),
            username: self.username,
            password_hash,
            name: self.name,
            email: self.email,
            phone: self.phone,
            is_active: true,
            last_login: None,
            role_id: self.role_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update of an account. The username and password are not
/// changed here.
///
/// A blank `phone` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role_id: Option<RoleId>,
    pub is_active: Option<bool>,
}

impl UserChanges {
    pub fn normalize(self) -> Result<Self, DomainError> {
        let name = self.name.map(|v| v.trim().to_string());
        let email = self.email.map(|v| v.trim().to_string());
        let phone = self.phone.map(|v| v.trim().to_string());

        let mut errors = FieldErrors::new();
        if let Some(v) = &name {
            errors.check_len("name", v, 1, 100);
        }
        if let Some(v) = &email {
            check_email(&mut errors, v);
        }
        if let Some(v) = phone.as_deref().filter(|v| !v.is_empty()) {
            errors.check_len("phone", v, 1, 20);
        }
        errors.into_result()?;

        Ok(Self {
            name,
            email,
            phone,
            role_id: self.role_id,
            is_active: self.is_active,
        })
    }

    pub fn apply(&self, user: &mut User, now: DateTime<Utc>) {
        if let Some(v) = &self.name {
            user.name = v.clone();
        }
        if let Some(v) = &self.email {
            user.email = v.clone();
        }
        if let Some(v) = &self.phone {
            user.phone = Some(v.clone()).filter(|p| !p.is_empty());
        }
        if let Some(v) = self.role_id {
            user.role_id = v;
        }
        if let Some(v) = self.is_active {
            user.is_active = v;
        }
        user.updated_at = now;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
}

impl PasswordChange {
    pub fn validate(&self) -> Result<(), DomainError> {
        let mut errors = FieldErrors::new();
        if self.current_password.is_empty() {
            errors.add("current_password", "current_password is required");
        }
        check_password(&mut errors, "new_password", &self.new_password);
        errors.into_result()
    }
}

fn check_password(errors: &mut FieldErrors, field: &str, password: &str) {
    if password.chars().count() < PASSWORD_MIN {
        errors.add(field, format!("{field} must be at least {PASSWORD_MIN} characters"));
    }
}

fn check_email(errors: &mut FieldErrors, email: &str) {
    if !looks_like_email(email) {
        errors.add("email", "email must be a valid address");
    } else {
        errors.check_len("email", email, 3, 100);
    }
}

fn looks_like_email(s: &str) -> bool {
    match s.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> NewUser {
        NewUser {
            username: " maria ".into(),
            password: "secret1".into(),
            name: "Maria".into(),
            email: "maria@example.com".into(),
            phone: Some("  ".into()),
            role_id: RoleId::new(),
        }
    }

    #[test]
    fn normalize_trims_and_drops_blank_phone() {
        let u = input().normalize().unwrap();
        assert_eq!(u.username, "maria");
        assert_eq!(u.phone, None);
    }

    #[test]
    fn short_password_and_bad_email_rejected() {
        let err = NewUser {
            password: "12345".into(),
            email: "maria".into(),
            ..input()
        }
        .normalize()
        .unwrap_err();
        let DomainError::Validation(fields) = err else {
            panic!("expected validation error");
        };
        let map = fields.to_map();
        assert!(map.contains_key("password"));
        assert!(map.contains_key("email"));
    }

    #[test]
    fn changes_touch_only_supplied_fields() {
        let mut user = input().normalize().unwrap().into_user("h".into(), Utc::now());
        user.phone = Some("5511999990000".into());
        let role = RoleId::new();

        UserChanges {
            name: Some(" Maria Silva ".into()),
            phone: Some(" ".into()),
            role_id: Some(role),
            ..Default::default()
        }
        .normalize()
        .unwrap()
        .apply(&mut user, Utc::now());

        assert_eq!(user.name, "Maria Silva");
        assert_eq!(user.email, "maria@example.com");
        assert_eq!(user.phone, None);
        assert_eq!(user.role_id, role);
        assert!(user.is_active);
    }

    #[test]
    fn bad_email_change_is_a_field_error() {
        let err = UserChanges {
            email: Some("nope".into()),
            ..Default::default()
        }
        .normalize()
        .unwrap_err();
        let DomainError::Validation(fields) = err else {
            panic!("expected validation error");
        };
        assert!(fields.to_map().contains_key("email"));
    }

    #[test]
    fn new_password_must_meet_minimum() {
        let change = PasswordChange {
            current_password: String::new(),
            new_password: "123".into(),
        };
        let DomainError::Validation(fields) = change.validate().unwrap_err() else {
            panic!("expected validation error");
        };
        let map = fields.to_map();
        assert!(map.contains_key("current_password"));
        assert!(map.contains_key("new_password"));
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let user = input().normalize().unwrap().into_user("$argon2id$x".into(), Utc::now());
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["is_active"], true);
    }
}
