//! `simplerp-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod entity;
pub mod error;
pub mod id;
pub mod pagination;
pub mod validation;

pub use entity::{Entity, SoftDelete};
pub use error::{DomainError, DomainResult};
pub use id::{PermissionId, RoleId, UserId};
pub use pagination::{Page, PageDefaults, PageMeta, PageRequest, SortOrder};
pub use validation::{FieldError, FieldErrors};
