// Random value generation
// Secure ids come from OS entropy; the letters-only random strings come from
// an explicitly injected pseudo-random source so thread safety and
// reproducibility are part of the contract, not an accident of a global

use super::CryptoError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Random value capability consumed by the session manager and user flows
pub trait Generator: Send + Sync {
    /// Cryptographically unpredictable identifier: `byte_length` random bytes,
    /// hex-encoded, so the output is twice as many characters.
    fn secure_id(&self, byte_length: usize) -> Result<String, CryptoError>;

    /// Non-cryptographic random string over a letters-only alphabet
    fn random_string(&self, length: usize) -> String;
}

/// Default `Generator` backed by OS entropy and a seeded PRNG
pub struct SystemGenerator {
    rng: Mutex<StdRng>,
}

impl SystemGenerator {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Inject the pseudo-random source, e.g. a fixed seed in tests
    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
        }
    }
}

impl Default for SystemGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Generator for SystemGenerator {
    fn secure_id(&self, byte_length: usize) -> Result<String, CryptoError> {
        let mut bytes = vec![0u8; byte_length];

        getrandom::getrandom(&mut bytes).map_err(|e| CryptoError::Entropy(e.to_string()))?;

        Ok(hex::encode(bytes))
    }

    fn random_string(&self, length: usize) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        (0..length)
            .map(|_| LETTERS[rng.gen_range(0..LETTERS.len())] as char)
            .collect()
    }
}
