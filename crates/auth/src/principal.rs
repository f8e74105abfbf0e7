use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use simplerp_core::{RoleId, UserId};

/// The authenticated caller, as decoded from a validated access token.
///
/// `permissions` is the snapshot taken when the token was issued; role changes
/// made afterwards are only visible after the next login or refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub user_id: UserId,
    pub username: String,
    pub role_id: RoleId,
    pub role_name: String,
    pub permissions: BTreeSet<String>,
}

impl AuthContext {
    pub fn new(
        user_id: UserId,
        username: impl Into<String>,
        role_id: RoleId,
        role_name: impl Into<String>,
        permissions: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            user_id,
            username: username.into(),
            role_id,
            role_name: role_name.into(),
            permissions: permissions.into_iter().collect(),
        }
    }

    pub fn has_permission(&self, name: &str) -> bool {
        self.permissions.contains(name)
    }
}
