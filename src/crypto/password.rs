// Password hashing
// Argon2id in PHC string format with fixed cost parameters

use super::CryptoError;
use argon2::{Algorithm, Argon2, Params, PasswordHasher, PasswordVerifier, Version};
use password_hash::{PasswordHash, SaltString};

const ARGON2ID_ITERATIONS: u32 = 2;
const ARGON2ID_MEMORY_KIB: u32 = 19 * 1024;
const ARGON2ID_PARALLELISM: u32 = 1;
const ARGON2ID_KEY_LENGTH: usize = 32;
const ARGON2ID_SALT_LENGTH: usize = 16;

/// Password hashing capability
pub trait PasswordManager: Send + Sync {
    fn hash(&self, password: &str) -> Result<String, CryptoError>;

    fn verify(&self, password: &str, hash: &str) -> Result<bool, CryptoError>;
}

/// Argon2id implementation of `PasswordManager`
pub struct Argon2PasswordManager;

impl Argon2PasswordManager {
    pub fn new() -> Self {
        Self
    }

    fn context() -> Result<Argon2<'static>, CryptoError> {
        let params = Params::new(
            ARGON2ID_MEMORY_KIB,
            ARGON2ID_ITERATIONS,
            ARGON2ID_PARALLELISM,
            Some(ARGON2ID_KEY_LENGTH),
        )
        .map_err(|e| CryptoError::Hash(e.to_string()))?;

        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

impl Default for Argon2PasswordManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PasswordManager for Argon2PasswordManager {
    fn hash(&self, password: &str) -> Result<String, CryptoError> {
        let mut salt_bytes = [0u8; ARGON2ID_SALT_LENGTH];
        getrandom::getrandom(&mut salt_bytes).map_err(|e| CryptoError::Entropy(e.to_string()))?;

        let salt =
            SaltString::encode_b64(&salt_bytes).map_err(|e| CryptoError::Hash(e.to_string()))?;

        let hashed = Self::context()?
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| CryptoError::Hash(e.to_string()))?;

        Ok(hashed.to_string())
    }

    fn verify(&self, password: &str, hash: &str) -> Result<bool, CryptoError> {
        let parsed = PasswordHash::new(hash).map_err(|e| CryptoError::Hash(e.to_string()))?;

        // Parameters are read back from the PHC string itself
        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(CryptoError::Hash(e.to_string())),
        }
    }
}
