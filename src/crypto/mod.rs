// Cryptographic helpers
// Secure identifier generation, general-purpose random strings, and password
// hashing behind capability traits

pub mod generator;
pub mod password;

pub use generator::{Generator, SystemGenerator};
pub use password::{Argon2PasswordManager, PasswordManager};

/// Errors from the crypto layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The OS entropy source failed
    Entropy(String),
    /// Password hashing or hash parsing failed
    Hash(String),
}

impl std::fmt::Display for CryptoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CryptoError::Entropy(msg) => {
                write!(f, "Generate secure id failed with error: {}", msg)
            }
            CryptoError::Hash(msg) => write!(f, "Password hashing error: {}", msg),
        }
    }
}

impl std::error::Error for CryptoError {}
