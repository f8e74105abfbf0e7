//! Permission guard for handlers.
//!
//! Every protected handler calls [`require`] before touching a service. The
//! check is exact string membership in the token's permission set.

use tracing::debug;

use simplerp_auth::{AuthContext, authorize};
use simplerp_core::DomainError;

use crate::app::errors::ApiError;

/// Permission names guarding each route.
pub mod perms {
    pub const PERMISSIONS_VIEW: &str = "permissions.view";
    pub const PERMISSIONS_CREATE: &str = "permissions.create";
    pub const PERMISSIONS_EDIT: &str = "permissions.edit";
    pub const PERMISSIONS_DELETE: &str = "permissions.delete";

    pub const ROLES_VIEW: &str = "roles.view";
    pub const ROLES_CREATE: &str = "roles.create";
    pub const ROLES_EDIT: &str = "roles.edit";
    pub const ROLES_DELETE: &str = "roles.delete";

    pub const USERS_VIEW: &str = "users.view";
    pub const USERS_CREATE: &str = "users.create";
    pub const USERS_EDIT: &str = "users.edit";
    pub const USERS_DELETE: &str = "users.delete";

    pub const ALL: &[&str] = &[
        PERMISSIONS_VIEW,
        PERMISSIONS_CREATE,
        PERMISSIONS_EDIT,
        PERMISSIONS_DELETE,
        ROLES_VIEW,
        ROLES_CREATE,
        ROLES_EDIT,
        ROLES_DELETE,
        USERS_VIEW,
        USERS_CREATE,
        USERS_EDIT,
        USERS_DELETE,
    ];
}

pub fn require(ctx: &AuthContext, permission: &str) -> Result<(), ApiError> {
    authorize(ctx, permission).map_err(|e| {
        debug!(user_id = %ctx.user_id, permission, "permission denied");
        ApiError(DomainError::from(e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use simplerp_auth::SeedCatalog;
    use simplerp_core::{RoleId, UserId};

    #[test]
    fn every_guard_permission_is_in_the_seed_catalog() {
        let catalog = SeedCatalog::default();
        for name in perms::ALL {
            assert!(
                catalog.permissions.iter().any(|p| p.name == *name),
                "{name} missing from catalog"
            );
        }
    }

    #[test]
    fn require_maps_denial_to_forbidden() {
        let ctx = AuthContext::new(
            UserId::new(),
            "maria",
            RoleId::new(),
            "VENDAS",
            ["roles.view".to_string()],
        );
        assert!(require(&ctx, perms::ROLES_VIEW).is_ok());
        let err = require(&ctx, perms::ROLES_EDIT).unwrap_err();
        assert_eq!(err.0, DomainError::forbidden("roles.edit"));
    }
}
