// In-memory key-value store
// Process-local backend used by tests and single-node development setups.
// Mirrors the networked backend's semantics: lazy TTL eviction, WRONGTYPE on
// scalar/set mismatches, set keys vanish when their last member is removed.

use super::{KeyValueStore, KeyValueStoreTransaction, KvError, TxResult, TxSlot};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

const WRONG_TYPE_ERROR: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

#[derive(Debug, Clone)]
enum Stored {
    Scalar(String),
    Vector(HashSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Stored,
    expires_at: Option<Instant>,
}

type Entries = HashMap<String, Entry>;

/// In-memory implementation of `KeyValueStore`
pub struct InMemoryKeyValueStore {
    entries: Arc<RwLock<Entries>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryKeyValueStore {
    fn default() -> Self {
        Self::new()
    }
}

// Every access goes through the write lock so lazy expiry stays in one place.
fn purge_expired(entries: &mut Entries, key: &str) {
    if let Some(entry) = entries.get(key) {
        if let Some(expires_at) = entry.expires_at {
            if Instant::now() >= expires_at {
                entries.remove(key);
            }
        }
    }
}

fn apply_set(entries: &mut Entries, key: &str, value: &str) -> String {
    entries.insert(
        key.to_string(),
        Entry {
            value: Stored::Scalar(value.to_string()),
            expires_at: None,
        },
    );

    "OK".to_string()
}

fn apply_set_with_expiration(
    entries: &mut Entries,
    key: &str,
    value: &str,
    expiration: Duration,
) -> bool {
    purge_expired(entries, key);

    if entries.contains_key(key) {
        return false;
    }

    entries.insert(
        key.to_string(),
        Entry {
            value: Stored::Scalar(value.to_string()),
            expires_at: Some(Instant::now() + expiration),
        },
    );

    true
}

fn apply_get(entries: &mut Entries, key: &str) -> Result<String, KvError> {
    purge_expired(entries, key);

    match entries.get(key) {
        None => Err(KvError::NoItem),
        Some(entry) => match &entry.value {
            Stored::Scalar(value) => Ok(value.clone()),
            Stored::Vector(_) => Err(KvError::Backend(WRONG_TYPE_ERROR.to_string())),
        },
    }
}

fn apply_delete(entries: &mut Entries, key: &str) -> i64 {
    purge_expired(entries, key);

    match entries.remove(key) {
        Some(_) => 1,
        None => 0,
    }
}

fn apply_add_to_vector(
    entries: &mut Entries,
    key: &str,
    members: &[String],
) -> Result<i64, KvError> {
    purge_expired(entries, key);

    if members.is_empty() {
        return Ok(0);
    }

    let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
        value: Stored::Vector(HashSet::new()),
        expires_at: None,
    });

    match &mut entry.value {
        Stored::Scalar(_) => Err(KvError::Backend(WRONG_TYPE_ERROR.to_string())),
        Stored::Vector(set) => {
            let mut added = 0;

            for member in members {
                if set.insert(member.clone()) {
                    added += 1;
                }
            }

            Ok(added)
        }
    }
}

fn apply_delete_from_vector(
    entries: &mut Entries,
    key: &str,
    members: &[String],
) -> Result<i64, KvError> {
    purge_expired(entries, key);

    let entry = match entries.get_mut(key) {
        None => return Ok(0),
        Some(entry) => entry,
    };

    match &mut entry.value {
        Stored::Scalar(_) => Err(KvError::Backend(WRONG_TYPE_ERROR.to_string())),
        Stored::Vector(set) => {
            let mut removed = 0;

            for member in members {
                if set.remove(member) {
                    removed += 1;
                }
            }

            // An emptied set key ceases to exist, as on the real backend
            if set.is_empty() {
                entries.remove(key);
            }

            Ok(removed)
        }
    }
}

fn apply_get_vector(entries: &mut Entries, key: &str) -> Result<Vec<String>, KvError> {
    purge_expired(entries, key);

    match entries.get(key) {
        None => Ok(Vec::new()),
        Some(entry) => match &entry.value {
            Stored::Scalar(_) => Err(KvError::Backend(WRONG_TYPE_ERROR.to_string())),
            Stored::Vector(set) => Ok(set.iter().cloned().collect()),
        },
    }
}

fn apply_assign_expiration(entries: &mut Entries, key: &str, expiration: Duration) -> bool {
    purge_expired(entries, key);

    match entries.get_mut(key) {
        None => false,
        Some(entry) => {
            entry.expires_at = Some(Instant::now() + expiration);
            true
        }
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        let mut entries = self.entries.write().await;
        apply_set(&mut entries, key, value);

        Ok(())
    }

    async fn set_with_expiration(
        &self,
        key: &str,
        value: &str,
        expiration: Duration,
    ) -> Result<bool, KvError> {
        let mut entries = self.entries.write().await;

        Ok(apply_set_with_expiration(&mut entries, key, value, expiration))
    }

    async fn get(&self, key: &str) -> Result<String, KvError> {
        let mut entries = self.entries.write().await;

        apply_get(&mut entries, key)
    }

    async fn delete(&self, key: &str) -> Result<i64, KvError> {
        let mut entries = self.entries.write().await;

        Ok(apply_delete(&mut entries, key))
    }

    async fn add_to_vector(&self, key: &str, members: &[String]) -> Result<i64, KvError> {
        let mut entries = self.entries.write().await;

        apply_add_to_vector(&mut entries, key, members)
    }

    async fn delete_from_vector(&self, key: &str, members: &[String]) -> Result<i64, KvError> {
        let mut entries = self.entries.write().await;

        apply_delete_from_vector(&mut entries, key, members)
    }

    async fn get_vector(&self, key: &str) -> Result<Vec<String>, KvError> {
        let mut entries = self.entries.write().await;

        apply_get_vector(&mut entries, key)
    }

    async fn assign_expiration(&self, key: &str, expiration: Duration) -> Result<bool, KvError> {
        let mut entries = self.entries.write().await;

        Ok(apply_assign_expiration(&mut entries, key, expiration))
    }

    fn start_transaction(&self) -> Box<dyn KeyValueStoreTransaction> {
        Box::new(InMemoryTransaction {
            entries: self.entries.clone(),
            commands: Vec::new(),
        })
    }
}

enum QueuedCommand {
    Set {
        key: String,
        value: String,
        slot: TxSlot<String>,
    },
    SetWithExpiration {
        key: String,
        value: String,
        expiration: Duration,
        slot: TxSlot<bool>,
    },
    Get {
        key: String,
        slot: TxSlot<String>,
    },
    Delete {
        key: String,
        slot: TxSlot<i64>,
    },
    AddToVector {
        key: String,
        members: Vec<String>,
        slot: TxSlot<i64>,
    },
    DeleteFromVector {
        key: String,
        members: Vec<String>,
        slot: TxSlot<i64>,
    },
    GetVector {
        key: String,
        slot: TxSlot<Vec<String>>,
    },
    AssignExpiration {
        key: String,
        expiration: Duration,
        slot: TxSlot<bool>,
    },
}

/// Transaction over the in-memory store. Commands are buffered and applied
/// under a single write-lock acquisition, which makes the batch atomic with
/// respect to every other store operation.
pub struct InMemoryTransaction {
    entries: Arc<RwLock<Entries>>,
    commands: Vec<QueuedCommand>,
}

#[async_trait]
impl KeyValueStoreTransaction for InMemoryTransaction {
    fn set(&mut self, key: &str, value: &str) -> TxResult<String> {
        let (result, slot) = TxResult::pending();

        self.commands.push(QueuedCommand::Set {
            key: key.to_string(),
            value: value.to_string(),
            slot,
        });

        result
    }

    fn set_with_expiration(
        &mut self,
        key: &str,
        value: &str,
        expiration: Duration,
    ) -> TxResult<bool> {
        let (result, slot) = TxResult::pending();

        self.commands.push(QueuedCommand::SetWithExpiration {
            key: key.to_string(),
            value: value.to_string(),
            expiration,
            slot,
        });

        result
    }

    fn get(&mut self, key: &str) -> TxResult<String> {
        let (result, slot) = TxResult::pending();

        self.commands.push(QueuedCommand::Get {
            key: key.to_string(),
            slot,
        });

        result
    }

    fn delete(&mut self, key: &str) -> TxResult<i64> {
        let (result, slot) = TxResult::pending();

        self.commands.push(QueuedCommand::Delete {
            key: key.to_string(),
            slot,
        });

        result
    }

    fn add_to_vector(&mut self, key: &str, members: &[String]) -> TxResult<i64> {
        let (result, slot) = TxResult::pending();

        self.commands.push(QueuedCommand::AddToVector {
            key: key.to_string(),
            members: members.to_vec(),
            slot,
        });

        result
    }

    fn delete_from_vector(&mut self, key: &str, members: &[String]) -> TxResult<i64> {
        let (result, slot) = TxResult::pending();

        self.commands.push(QueuedCommand::DeleteFromVector {
            key: key.to_string(),
            members: members.to_vec(),
            slot,
        });

        result
    }

    fn get_vector(&mut self, key: &str) -> TxResult<Vec<String>> {
        let (result, slot) = TxResult::pending();

        self.commands.push(QueuedCommand::GetVector {
            key: key.to_string(),
            slot,
        });

        result
    }

    fn assign_expiration(&mut self, key: &str, expiration: Duration) -> TxResult<bool> {
        let (result, slot) = TxResult::pending();

        self.commands.push(QueuedCommand::AssignExpiration {
            key: key.to_string(),
            expiration,
            slot,
        });

        result
    }

    async fn exec(self: Box<Self>) -> Result<(), KvError> {
        let mut entries = self.entries.write().await;

        for command in self.commands {
            match command {
                QueuedCommand::Set { key, value, slot } => {
                    let _ = slot.set(Ok(apply_set(&mut entries, &key, &value)));
                }
                QueuedCommand::SetWithExpiration {
                    key,
                    value,
                    expiration,
                    slot,
                } => {
                    let _ = slot.set(Ok(apply_set_with_expiration(
                        &mut entries,
                        &key,
                        &value,
                        expiration,
                    )));
                }
                QueuedCommand::Get { key, slot } => {
                    let _ = slot.set(apply_get(&mut entries, &key));
                }
                QueuedCommand::Delete { key, slot } => {
                    let _ = slot.set(Ok(apply_delete(&mut entries, &key)));
                }
                QueuedCommand::AddToVector { key, members, slot } => {
                    let _ = slot.set(apply_add_to_vector(&mut entries, &key, &members));
                }
                QueuedCommand::DeleteFromVector { key, members, slot } => {
                    let _ = slot.set(apply_delete_from_vector(&mut entries, &key, &members));
                }
                QueuedCommand::GetVector { key, slot } => {
                    let _ = slot.set(apply_get_vector(&mut entries, &key));
                }
                QueuedCommand::AssignExpiration {
                    key,
                    expiration,
                    slot,
                } => {
                    let _ = slot.set(Ok(apply_assign_expiration(&mut entries, &key, expiration)));
                }
            }
        }

        Ok(())
    }
}
