//! Infrastructure layer: persistence, configuration, seeding and the
//! application services built on top of them.

pub mod config;
pub mod db;
pub mod seeder;
pub mod services;
pub mod store;

pub use config::{AppConfig, ConfigError, Environment};
pub use seeder::{SeedReport, ensure_admin_user, seed_rbac};
pub use store::{InMemoryStore, PostgresStore, RbacStore, StoreError};
