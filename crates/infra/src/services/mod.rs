//! Application services: input normalization, existence/uniqueness checks and
//! the mapping of store failures into [`simplerp_core::DomainError`].

pub mod auth;
pub mod permissions;
pub mod roles;
pub mod users;

pub use auth::{AuthService, Profile, Session};
pub use permissions::PermissionService;
pub use roles::RoleService;
pub use users::UserService;
