//! `simplerp-auth`: pure authentication/authorization boundary.
//!
//! RBAC records, token issuing, credential hashing and the seed catalog.
//! This crate is intentionally decoupled from HTTP and storage.

pub mod authorize;
pub mod claims;
pub mod password;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod seed;
pub mod token;
pub mod user;

pub use authorize::{AuthzError, authorize};
pub use claims::{Claims, TokenKind};
pub use password::{Argon2Verifier, CredentialVerifier, PasswordError};
pub use permissions::{ModuleGroup, NewPermission, Permission, PermissionChanges, PermissionFilter};
pub use principal::AuthContext;
pub use roles::{NewRole, Role, RoleChanges, RoleWithPermissions};
pub use seed::{AssignmentRule, PermissionSeed, RoleSeed, SeedCatalog};
pub use token::{TokenError, TokenIssuer, TokenPair};
pub use user::{NewUser, PasswordChange, User, UserChanges};
