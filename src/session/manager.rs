// Key-value-backed session manager
// All dual-writes (record + per-user index) go through one atomic
// transaction batch; correctness relies on backend per-key atomicity, not on
// any in-process lock

use super::{
    known_sessions_key, session_key, SessionData, SessionError, SessionManager, SessionSettings,
};
use crate::crypto::Generator;
use crate::kv::KeyValueStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Session manager over any `KeyValueStore` backend
pub struct KvSessionManager {
    store: Arc<dyn KeyValueStore>,
    ids: Arc<dyn Generator>,
    settings: SessionSettings,
}

impl KvSessionManager {
    pub fn new(store: Arc<dyn KeyValueStore>, ids: Arc<dyn Generator>) -> Self {
        Self::with_settings(store, ids, SessionSettings::default())
    }

    pub fn with_settings(
        store: Arc<dyn KeyValueStore>,
        ids: Arc<dyn Generator>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            store,
            ids,
            settings,
        }
    }
}

#[async_trait]
impl SessionManager for KvSessionManager {
    async fn create_session(&self, data: &SessionData) -> Result<String, SessionError> {
        // The conditional write detects identifier collisions; retry with a
        // fresh id until it wins. At 128 bits of entropy repeated collisions
        // are not a practical concern, so the loop is unbounded.
        loop {
            let session_id = self.ids.secure_id(self.settings.id_byte_length)?;

            let mut tx = self.store.start_transaction();

            let set_cmd = tx.set_with_expiration(
                &session_key(&session_id),
                &data.user_id.to_string(),
                self.settings.ttl,
            );
            tx.add_to_vector(
                &known_sessions_key(data.user_id),
                std::slice::from_ref(&session_id),
            );

            tx.exec().await?;

            if set_cmd.result()? {
                info!("Created session for user {}", data.user_id);

                return Ok(session_id);
            }

            // The index add still landed for the losing id; that member is
            // harmless noise and gets dropped by the lazy cleanup paths.
            debug!("Session id collision for user {}, retrying", data.user_id);
        }
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), SessionError> {
        let record_key = session_key(session_id);

        let user_id = self.store.get(&record_key).await?;
        let index_key = known_sessions_key(&user_id);

        let mut tx = self.store.start_transaction();

        tx.delete(&record_key);
        tx.delete_from_vector(&index_key, std::slice::from_ref(&session_id.to_string()));

        tx.exec().await?;

        // Drop the index key once its last member is gone so per-user sets do
        // not accumulate forever. This read-then-delete is not atomic with
        // the batch above: a create for the same user landing in between can
        // lose its index entry while its record lives on.
        let remaining = self.store.get_vector(&index_key).await?;

        if remaining.is_empty() {
            self.store.delete(&index_key).await?;
        }

        info!("Deleted session for user {}", user_id);

        Ok(())
    }

    async fn renewal_session(&self, session_id: &str) -> Result<(), SessionError> {
        let refreshed = self
            .store
            .assign_expiration(&session_key(session_id), self.settings.ttl)
            .await?;

        if !refreshed {
            return Err(SessionError::NotFound);
        }

        Ok(())
    }

    async fn get_session_data(&self, session_id: &str) -> Result<SessionData, SessionError> {
        let value = self.store.get(&session_key(session_id)).await?;

        let user_id = value
            .parse::<u32>()
            .map_err(|_| SessionError::InvalidData)?;

        Ok(SessionData { user_id })
    }

    async fn reset_sessions(&self, user_id: u32) -> Result<(), SessionError> {
        let index_key = known_sessions_key(user_id);

        let session_ids = self.store.get_vector(&index_key).await?;

        let mut tx = self.store.start_transaction();

        for session_id in &session_ids {
            tx.delete(&session_key(session_id));
        }
        tx.delete(&index_key);

        tx.exec().await?;

        info!(
            "Reset {} session(s) for user {}",
            session_ids.len(),
            user_id
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{CryptoError, SystemGenerator};
    use crate::kv::InMemoryKeyValueStore;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Generator returning a pre-programmed id sequence
    struct ScriptedGenerator {
        ids: Mutex<VecDeque<String>>,
    }

    impl ScriptedGenerator {
        fn new(ids: &[&str]) -> Self {
            Self {
                ids: Mutex::new(ids.iter().map(|id| id.to_string()).collect()),
            }
        }
    }

    impl Generator for ScriptedGenerator {
        fn secure_id(&self, _byte_length: usize) -> Result<String, CryptoError> {
            Ok(self
                .ids
                .lock()
                .unwrap()
                .pop_front()
                .expect("scripted id sequence exhausted"))
        }

        fn random_string(&self, _length: usize) -> String {
            unreachable!("not used by the session manager")
        }
    }

    fn manager(store: Arc<InMemoryKeyValueStore>) -> KvSessionManager {
        KvSessionManager::new(store, Arc::new(SystemGenerator::new()))
    }

    #[tokio::test]
    async fn test_create_session_roundtrip() {
        let store = Arc::new(InMemoryKeyValueStore::new());
        let manager = manager(store);

        let session_id = manager
            .create_session(&SessionData { user_id: 1337 })
            .await
            .unwrap();

        assert_eq!(session_id.len(), 32);
        assert!(session_id.chars().all(|c| c.is_ascii_hexdigit()));

        let data = manager.get_session_data(&session_id).await.unwrap();
        assert_eq!(data, SessionData { user_id: 1337 });
    }

    #[tokio::test]
    async fn test_create_session_retries_on_collision() {
        let store = Arc::new(InMemoryKeyValueStore::new());
        let generator = ScriptedGenerator::new(&["aaaa", "aaaa", "aaaa", "bbbb"]);
        let manager = KvSessionManager::new(store.clone(), Arc::new(generator));

        let first = manager
            .create_session(&SessionData { user_id: 1 })
            .await
            .unwrap();
        assert_eq!(first, "aaaa");

        // The next create draws "aaaa" twice more before the distinct id wins
        let second = manager
            .create_session(&SessionData { user_id: 1 })
            .await
            .unwrap();
        assert_eq!(second, "bbbb");

        assert_eq!(
            manager.get_session_data("aaaa").await.unwrap().user_id,
            1
        );
        assert_eq!(
            manager.get_session_data("bbbb").await.unwrap().user_id,
            1
        );
    }

    #[tokio::test]
    async fn test_delete_session_maintains_index() {
        let store = Arc::new(InMemoryKeyValueStore::new());
        let generator = ScriptedGenerator::new(&["s1", "s2"]);
        let manager = KvSessionManager::new(store.clone(), Arc::new(generator));

        manager
            .create_session(&SessionData { user_id: 42 })
            .await
            .unwrap();
        manager
            .create_session(&SessionData { user_id: 42 })
            .await
            .unwrap();

        manager.delete_session("s1").await.unwrap();

        assert_eq!(
            store.get_vector(&known_sessions_key(42u32)).await.unwrap(),
            vec!["s2".to_string()]
        );
        assert_eq!(
            manager.get_session_data("s1").await,
            Err(SessionError::NotFound)
        );

        manager.delete_session("s2").await.unwrap();

        // Last deletion removes the index key itself
        assert!(!store
            .assign_expiration(&known_sessions_key(42u32), Duration::from_secs(1))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_delete_session_not_found() {
        let store = Arc::new(InMemoryKeyValueStore::new());
        let manager = manager(store);

        assert_eq!(
            manager.delete_session("missing").await,
            Err(SessionError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_renewal_extends_session_lifetime() {
        let store = Arc::new(InMemoryKeyValueStore::new());
        let manager = KvSessionManager::with_settings(
            store.clone(),
            Arc::new(SystemGenerator::new()),
            SessionSettings {
                ttl: Duration::from_millis(400),
                id_byte_length: 16,
            },
        );

        let session_id = manager
            .create_session(&SessionData { user_id: 7 })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;
        manager.renewal_session(&session_id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;

        // Without the renewal the record would have expired by now
        assert!(manager.get_session_data(&session_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_renewal_session_not_found() {
        let store = Arc::new(InMemoryKeyValueStore::new());
        let manager = manager(store);

        assert_eq!(
            manager.renewal_session("missing").await,
            Err(SessionError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_session_expires_naturally() {
        let store = Arc::new(InMemoryKeyValueStore::new());
        let manager = KvSessionManager::with_settings(
            store,
            Arc::new(SystemGenerator::new()),
            SessionSettings {
                ttl: Duration::from_millis(20),
                id_byte_length: 16,
            },
        );

        let session_id = manager
            .create_session(&SessionData { user_id: 7 })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(
            manager.get_session_data(&session_id).await,
            Err(SessionError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_get_session_data_rejects_corrupt_value() {
        let store = Arc::new(InMemoryKeyValueStore::new());
        let manager = KvSessionManager::new(store.clone(), Arc::new(SystemGenerator::new()));

        let session_id = manager
            .create_session(&SessionData { user_id: 9 })
            .await
            .unwrap();

        store
            .set(&session_key(&session_id), "definitely-not-a-user-id")
            .await
            .unwrap();

        assert_eq!(
            manager.get_session_data(&session_id).await,
            Err(SessionError::InvalidData)
        );
    }

    #[tokio::test]
    async fn test_reset_sessions_revokes_everything() {
        let store = Arc::new(InMemoryKeyValueStore::new());
        let generator = ScriptedGenerator::new(&["s1", "s2", "s3"]);
        let manager = KvSessionManager::new(store.clone(), Arc::new(generator));

        for _ in 0..3 {
            manager
                .create_session(&SessionData { user_id: 42 })
                .await
                .unwrap();
        }

        manager.reset_sessions(42).await.unwrap();

        for session_id in ["s1", "s2", "s3"] {
            assert_eq!(
                manager.get_session_data(session_id).await,
                Err(SessionError::NotFound)
            );
        }
        assert_eq!(
            store.get_vector(&known_sessions_key(42u32)).await.unwrap(),
            Vec::<String>::new()
        );
    }

    #[tokio::test]
    async fn test_reset_sessions_with_no_sessions_is_a_noop() {
        let store = Arc::new(InMemoryKeyValueStore::new());
        let manager = manager(store);

        manager.reset_sessions(42).await.unwrap();
    }

    #[tokio::test]
    async fn test_sessions_are_isolated_per_user() {
        let store = Arc::new(InMemoryKeyValueStore::new());
        let generator = ScriptedGenerator::new(&["u1-a", "u2-a"]);
        let manager = KvSessionManager::new(store.clone(), Arc::new(generator));

        manager
            .create_session(&SessionData { user_id: 1 })
            .await
            .unwrap();
        manager
            .create_session(&SessionData { user_id: 2 })
            .await
            .unwrap();

        manager.reset_sessions(1).await.unwrap();

        assert_eq!(
            manager.get_session_data("u1-a").await,
            Err(SessionError::NotFound)
        );
        assert_eq!(manager.get_session_data("u2-a").await.unwrap().user_id, 2);
    }
}
