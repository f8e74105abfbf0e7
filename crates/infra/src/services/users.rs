use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use simplerp_auth::{CredentialVerifier, NewUser, PasswordChange, User, UserChanges};
use simplerp_core::{DomainError, DomainResult, Page, PageRequest, UserId};

use crate::store::{StoreError, UserStore};

#[derive(Clone)]
pub struct UserService<S> {
    store: S,
    verifier: Arc<dyn CredentialVerifier>,
}

/// The role is re-checked by the store inside the write; a missing or deleted
/// role is reported against the `role_id` field.
fn role_field_error(err: StoreError) -> DomainError {
    match err {
        StoreError::NotFound("role") => DomainError::invalid_field("role_id", "role not found"),
        other => other.into(),
    }
}

impl<S> UserService<S>
where
    S: UserStore,
{
    pub fn new(store: S, verifier: Arc<dyn CredentialVerifier>) -> Self {
        Self { store, verifier }
    }

    pub async fn list(&self, page: &PageRequest) -> DomainResult<Page<User>> {
        Ok(self.store.list_users(page).await?)
    }

    pub async fn get(&self, id: UserId) -> DomainResult<User> {
        self.store.get_user(id).await?.ok_or(DomainError::not_found("user"))
    }

    /// Hashes the password and stores an active user. The role must exist.
    pub async fn create(&self, input: NewUser) -> DomainResult<User> {
        let input = input.normalize()?;
        let hash = self.verifier.hash(&input.password)?;
        let user = self
            .store
            .insert_user(input.into_user(hash, Utc::now()))
            .await
            .map_err(role_field_error)?;
        info!(user_id = %user.id, username = %user.username, "user created");
        Ok(user)
    }

    pub async fn update(&self, id: UserId, changes: UserChanges) -> DomainResult<User> {
        let changes = changes.normalize()?;
        let mut user = self.get(id).await?;
        changes.apply(&mut user, Utc::now());
        let user = self.store.update_user(user).await.map_err(role_field_error)?;
        info!(user_id = %id, role_id = %user.role_id, active = user.is_active, "user updated");
        Ok(user)
    }

    /// The current password is always checked, whoever makes the change.
    pub async fn change_password(&self, id: UserId, change: PasswordChange) -> DomainResult<()> {
        change.validate()?;
        let user = self.get(id).await?;
        if !self.verifier.verify(&change.current_password, &user.password_hash) {
            return Err(DomainError::invalid_field(
                "current_password",
                "current password is incorrect",
            ));
        }

        let hash = self.verifier.hash(&change.new_password)?;
        self.store.set_user_password(id, &hash, Utc::now()).await?;
        info!(user_id = %id, "password changed");
        Ok(())
    }

    /// Deactivation blocks login and refresh; the row is kept.
    pub async fn deactivate(&self, id: UserId) -> DomainResult<User> {
        let user = self.store.set_user_active(id, false, Utc::now()).await?;
        info!(user_id = %id, "user deactivated");
        Ok(user)
    }
}
