// Key-value store abstraction
// Narrow capability interface over an expiring key-value backend, with an
// atomic transaction handle for multi-key writes

pub mod dragonfly;
pub mod memory;

use async_trait::async_trait;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

pub use dragonfly::{DragonflyKeyValueStore, DragonflyOptions};
pub use memory::InMemoryKeyValueStore;

/// Errors surfaced by the key-value layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvError {
    /// The requested key (or item) does not exist. Distinguished from all
    /// backend failures so callers can treat absence as a domain condition.
    NoItem,
    /// A queued transaction command was read before `exec` ran
    NotExecuted,
    /// Backend failure (connectivity, protocol, type mismatch), passed
    /// through verbatim
    Backend(String),
}

impl std::fmt::Display for KvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KvError::NoItem => write!(f, "There is no item"),
            KvError::NotExecuted => write!(f, "Transaction has not been executed"),
            KvError::Backend(msg) => write!(f, "Backend error: {}", msg),
        }
    }
}

impl std::error::Error for KvError {}

pub(crate) type TxSlot<T> = Arc<OnceLock<Result<T, KvError>>>;

/// Handle to the result of a single queued transaction command.
///
/// The value is unavailable until the owning transaction's `exec` has run;
/// reading earlier yields `KvError::NotExecuted`.
#[derive(Debug, Clone)]
pub struct TxResult<T> {
    slot: TxSlot<T>,
}

impl<T: Clone> TxResult<T> {
    pub(crate) fn pending() -> (Self, TxSlot<T>) {
        let slot: TxSlot<T> = Arc::new(OnceLock::new());
        (Self { slot: slot.clone() }, slot)
    }

    pub fn result(&self) -> Result<T, KvError> {
        match self.slot.get() {
            Some(result) => result.clone(),
            None => Err(KvError::NotExecuted),
        }
    }
}

/// Buffered batch of commands executed atomically by the backend.
///
/// Queued commands do nothing until `exec`; the backend applies the whole
/// batch all-or-nothing, and only afterwards do the returned handles resolve.
#[async_trait]
pub trait KeyValueStoreTransaction: Send {
    fn set(&mut self, key: &str, value: &str) -> TxResult<String>;

    fn set_with_expiration(
        &mut self,
        key: &str,
        value: &str,
        expiration: Duration,
    ) -> TxResult<bool>;

    fn get(&mut self, key: &str) -> TxResult<String>;

    fn delete(&mut self, key: &str) -> TxResult<i64>;

    fn add_to_vector(&mut self, key: &str, members: &[String]) -> TxResult<i64>;

    fn delete_from_vector(&mut self, key: &str, members: &[String]) -> TxResult<i64>;

    fn get_vector(&mut self, key: &str) -> TxResult<Vec<String>>;

    fn assign_expiration(&mut self, key: &str, expiration: Duration) -> TxResult<bool>;

    async fn exec(self: Box<Self>) -> Result<(), KvError>;
}

/// Capability interface over the key-value backend.
///
/// Implementations must be safe for concurrent use through a shared `Arc`
/// without external locking.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Unconditional write. Clears any TTL previously set on the key.
    async fn set(&self, key: &str, value: &str) -> Result<(), KvError>;

    /// Write only if the key does not already exist, with a TTL.
    /// Returns `false` when the key was already present.
    async fn set_with_expiration(
        &self,
        key: &str,
        value: &str,
        expiration: Duration,
    ) -> Result<bool, KvError>;

    /// Read a scalar value. `KvError::NoItem` when the key is absent.
    async fn get(&self, key: &str) -> Result<String, KvError>;

    /// Remove a key. Returns the number of keys actually removed.
    async fn delete(&self, key: &str) -> Result<i64, KvError>;

    /// Add members to a set-valued key, creating it if absent.
    /// Returns the number of members newly added.
    async fn add_to_vector(&self, key: &str, members: &[String]) -> Result<i64, KvError>;

    /// Remove members from a set-valued key.
    /// Returns the number of members actually removed.
    async fn delete_from_vector(&self, key: &str, members: &[String]) -> Result<i64, KvError>;

    /// List all members of a set-valued key. An absent or empty key yields
    /// an empty vector, never an error.
    async fn get_vector(&self, key: &str) -> Result<Vec<String>, KvError>;

    /// Refresh a key's TTL. Returns `false` when the key did not exist.
    async fn assign_expiration(&self, key: &str, expiration: Duration) -> Result<bool, KvError>;

    fn start_transaction(&self) -> Box<dyn KeyValueStoreTransaction>;
}
