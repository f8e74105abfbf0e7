//! Credential hashing and verification.

use argon2::{Algorithm, Argon2, Params, PasswordHasher, PasswordVerifier, Version};
use password_hash::{PasswordHash, SaltString};
use thiserror::Error;

use simplerp_core::DomainError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PasswordError {
    #[error("password hashing failed: {0}")]
    Hash(String),
}

impl From<PasswordError> for DomainError {
    fn from(value: PasswordError) -> Self {
        DomainError::internal(value.to_string())
    }
}

/// One-way, salted, verifiable credential function.
pub trait CredentialVerifier: Send + Sync {
    fn hash(&self, plain: &str) -> Result<String, PasswordError>;

    /// `false` for a wrong password and for an unparseable stored hash alike.
    fn verify(&self, plain: &str, hash: &str) -> bool;
}

impl<V: CredentialVerifier + ?Sized> CredentialVerifier for std::sync::Arc<V> {
    fn hash(&self, plain: &str) -> Result<String, PasswordError> {
        (**self).hash(plain)
    }

    fn verify(&self, plain: &str, hash: &str) -> bool {
        (**self).verify(plain, hash)
    }
}

/// Argon2id producing PHC strings.
#[derive(Debug, Clone, Default)]
pub struct Argon2Verifier {
    params: Option<Params>,
}

impl Argon2Verifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Custom cost parameters for newly created hashes. Verification always
    /// uses the parameters recorded in the stored hash.
    pub fn with_params(params: Params) -> Self {
        Self {
            params: Some(params),
        }
    }

    /// Minimum-cost parameters; only suitable for tests.
    pub fn insecure_fast() -> Self {
        let params = Params::new(Params::MIN_M_COST, 1, 1, None).ok();
        Self { params }
    }

    fn hasher(&self) -> Argon2<'static> {
        match &self.params {
            Some(p) => Argon2::new(Algorithm::Argon2id, Version::V0x13, p.clone()),
            None => Argon2::default(),
        }
    }
}

impl CredentialVerifier for Argon2Verifier {
    fn hash(&self, plain: &str) -> Result<String, PasswordError> {
        let mut salt_bytes = [0u8; 16];
        getrandom::getrandom(&mut salt_bytes).map_err(|e| PasswordError::Hash(e.to_string()))?;
        let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| PasswordError::Hash(e.to_string()))?;
        let phc = self
            .hasher()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| PasswordError::Hash(e.to_string()))?;
        Ok(phc.to_string())
    }

    fn verify(&self, plain: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(plain.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}
