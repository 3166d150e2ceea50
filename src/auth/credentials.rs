//! PIN hashing and verification.

use argon2::{Algorithm, Argon2, Params, Version};
use argon2::{PasswordHasher, PasswordVerifier};
use password_hash::rand_core::OsRng;
use password_hash::{PasswordHash, SaltString};
use thiserror::Error;

use crate::error::ServiceError;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("stored pin hash is malformed")]
    InvalidHashFormat,
    #[error("hashing failed: {0}")]
    Hashing(String),
}

impl From<CredentialError> for ServiceError {
    fn from(err: CredentialError) -> Self {
        ServiceError::Hashing(err.to_string())
    }
}

// Argon2id tuned for roughly 50-200ms per hash on commodity hardware.
const M_COST_KIB: u32 = 19_456;
const T_COST: u32 = 2;
const P_COST: u32 = 1;

fn argon2() -> Result<Argon2<'static>, CredentialError> {
    let params = Params::new(M_COST_KIB, T_COST, P_COST, None)
        .map_err(|e| CredentialError::Hashing(e.to_string()))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

fn hash_pin_blocking(pin: &str) -> Result<String, CredentialError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2()?
        .hash_password(pin.as_bytes(), &salt)
        .map_err(|e| CredentialError::Hashing(e.to_string()))?;
    Ok(hash.to_string())
}

fn verify_pin_blocking(pin: &str, pin_hash: &str) -> Result<bool, CredentialError> {
    let parsed = PasswordHash::new(pin_hash).map_err(|_| CredentialError::InvalidHashFormat)?;
    match argon2()?.verify_password(pin.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => Err(CredentialError::Hashing(e.to_string())),
    }
}

/// Hash a PIN for storage. The work is deliberately expensive, so it runs on
/// the blocking pool instead of an executor thread.
pub async fn hash_pin(pin: &str) -> Result<String, CredentialError> {
    let pin = pin.to_owned();
    tokio::task::spawn_blocking(move || hash_pin_blocking(&pin))
        .await
        .map_err(|e| CredentialError::Hashing(e.to_string()))?
}

/// Verify a PIN against a stored hash. Mismatch is `Ok(false)`; only a
/// malformed stored hash is an error.
pub async fn verify_pin(pin: &str, pin_hash: &str) -> Result<bool, CredentialError> {
    let pin = pin.to_owned();
    let pin_hash = pin_hash.to_owned();
    tokio::task::spawn_blocking(move || verify_pin_blocking(&pin, &pin_hash))
        .await
        .map_err(|e| CredentialError::Hashing(e.to_string()))?
}
