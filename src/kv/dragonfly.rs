// Dragonfly key-value store
// Networked backend over the Redis wire protocol. Transactions map to
// MULTI/EXEC pipelines; command results are decoded into the queued handles
// once the batch has executed.

use super::{KeyValueStore, KeyValueStoreTransaction, KvError, TxResult};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Connection options for a Dragonfly (or Redis) instance
#[derive(Debug, Clone)]
pub struct DragonflyOptions {
    pub host: String,
    pub port: u16,
    pub database_id: i64,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl DragonflyOptions {
    fn connection_url(&self) -> String {
        let auth = match (&self.username, &self.password) {
            (None, None) => String::new(),
            (username, password) => format!(
                "{}:{}@",
                username.as_deref().unwrap_or(""),
                password.as_deref().unwrap_or("")
            ),
        };

        format!(
            "redis://{}{}:{}/{}",
            auth, self.host, self.port, self.database_id
        )
    }
}

fn backend_error(err: redis::RedisError) -> KvError {
    KvError::Backend(err.to_string())
}

/// Dragonfly-backed implementation of `KeyValueStore`
pub struct DragonflyKeyValueStore {
    conn: Arc<Mutex<MultiplexedConnection>>,
}

impl DragonflyKeyValueStore {
    /// Connect using structured options
    pub async fn connect(options: &DragonflyOptions) -> Result<Self, KvError> {
        Self::connect_url(&options.connection_url()).await
    }

    /// Connect using a `redis://` URL
    pub async fn connect_url(url: &str) -> Result<Self, KvError> {
        let client = redis::Client::open(url).map_err(backend_error)?;
        let conn = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(backend_error)?;

        debug!("Connected to key-value backend");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl KeyValueStore for DragonflyKeyValueStore {
    async fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        let mut conn = self.conn.lock().await;

        conn.set::<_, _, ()>(key, value).await.map_err(backend_error)
    }

    async fn set_with_expiration(
        &self,
        key: &str,
        value: &str,
        expiration: Duration,
    ) -> Result<bool, KvError> {
        let mut conn = self.conn.lock().await;

        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(expiration.as_millis() as u64)
            .query_async(&mut *conn)
            .await
            .map_err(backend_error)?;

        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> Result<String, KvError> {
        let mut conn = self.conn.lock().await;

        let value: Option<String> = conn.get(key).await.map_err(backend_error)?;

        value.ok_or(KvError::NoItem)
    }

    async fn delete(&self, key: &str) -> Result<i64, KvError> {
        let mut conn = self.conn.lock().await;

        conn.del(key).await.map_err(backend_error)
    }

    async fn add_to_vector(&self, key: &str, members: &[String]) -> Result<i64, KvError> {
        if members.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.lock().await;

        conn.sadd(key, members).await.map_err(backend_error)
    }

    async fn delete_from_vector(&self, key: &str, members: &[String]) -> Result<i64, KvError> {
        if members.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.lock().await;

        conn.srem(key, members).await.map_err(backend_error)
    }

    async fn get_vector(&self, key: &str) -> Result<Vec<String>, KvError> {
        let mut conn = self.conn.lock().await;

        conn.smembers(key).await.map_err(backend_error)
    }

    async fn assign_expiration(&self, key: &str, expiration: Duration) -> Result<bool, KvError> {
        let mut conn = self.conn.lock().await;

        conn.pexpire(key, expiration.as_millis() as i64)
            .await
            .map_err(backend_error)
    }

    fn start_transaction(&self) -> Box<dyn KeyValueStoreTransaction> {
        let mut pipe = redis::pipe();
        pipe.atomic();

        Box::new(DragonflyTransaction {
            conn: self.conn.clone(),
            pipe,
            decoders: Vec::new(),
        })
    }
}

type Decoder = Box<dyn FnOnce(&redis::Value) + Send>;

fn decode_into<T>(value: &redis::Value) -> Result<T, KvError>
where
    T: redis::FromRedisValue,
{
    redis::from_redis_value(value).map_err(backend_error)
}

/// MULTI/EXEC transaction against the Dragonfly backend
pub struct DragonflyTransaction {
    conn: Arc<Mutex<MultiplexedConnection>>,
    pipe: redis::Pipeline,
    decoders: Vec<Decoder>,
}

impl DragonflyTransaction {
    fn queue<T, D>(&mut self, decoder: D) -> TxResult<T>
    where
        T: Clone + Send + Sync + 'static,
        D: FnOnce(&redis::Value) -> Result<T, KvError> + Send + 'static,
    {
        let (result, slot) = TxResult::pending();

        self.decoders.push(Box::new(move |value| {
            let _ = slot.set(decoder(value));
        }));

        result
    }

    // Keeps handles consistent for commands that are skipped client-side
    // (e.g. membership changes with an empty member list).
    fn resolved<T: Clone + Send + Sync + 'static>(value: T) -> TxResult<T> {
        let (result, slot) = TxResult::pending();
        let _ = slot.set(Ok(value));

        result
    }
}

#[async_trait]
impl KeyValueStoreTransaction for DragonflyTransaction {
    fn set(&mut self, key: &str, value: &str) -> TxResult<String> {
        self.pipe.set(key, value);

        self.queue(decode_into::<String>)
    }

    fn set_with_expiration(
        &mut self,
        key: &str,
        value: &str,
        expiration: Duration,
    ) -> TxResult<bool> {
        self.pipe
            .cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(expiration.as_millis() as u64);

        // NX that lost the race replies nil instead of OK
        self.queue(|value| Ok(!matches!(value, redis::Value::Nil)))
    }

    fn get(&mut self, key: &str) -> TxResult<String> {
        self.pipe.get(key);

        self.queue(|value| match value {
            redis::Value::Nil => Err(KvError::NoItem),
            other => decode_into::<String>(other),
        })
    }

    fn delete(&mut self, key: &str) -> TxResult<i64> {
        self.pipe.del(key);

        self.queue(decode_into::<i64>)
    }

    fn add_to_vector(&mut self, key: &str, members: &[String]) -> TxResult<i64> {
        if members.is_empty() {
            return Self::resolved(0);
        }

        self.pipe.sadd(key, members);

        self.queue(decode_into::<i64>)
    }

    fn delete_from_vector(&mut self, key: &str, members: &[String]) -> TxResult<i64> {
        if members.is_empty() {
            return Self::resolved(0);
        }

        self.pipe.srem(key, members);

        self.queue(decode_into::<i64>)
    }

    fn get_vector(&mut self, key: &str) -> TxResult<Vec<String>> {
        self.pipe.smembers(key);

        self.queue(decode_into::<Vec<String>>)
    }

    fn assign_expiration(&mut self, key: &str, expiration: Duration) -> TxResult<bool> {
        self.pipe.pexpire(key, expiration.as_millis() as i64);

        self.queue(decode_into::<bool>)
    }

    async fn exec(self: Box<Self>) -> Result<(), KvError> {
        let mut conn = self.conn.lock().await;

        let values: Vec<redis::Value> = self
            .pipe
            .query_async(&mut *conn)
            .await
            .map_err(backend_error)?;

        for (decoder, value) in self.decoders.into_iter().zip(values.iter()) {
            decoder(value);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests require a Dragonfly or Redis instance running locally.
    // Skip them in CI unless one is available.

    #[tokio::test]
    #[ignore] // Remove this to run with a local instance
    async fn test_scalar_roundtrip() {
        let store = DragonflyKeyValueStore::connect_url("redis://127.0.0.1/")
            .await
            .expect("Failed to connect");

        store.delete("pmp-test:alpha").await.unwrap();

        store.set("pmp-test:alpha", "1").await.unwrap();
        assert_eq!(store.get("pmp-test:alpha").await.unwrap(), "1");

        assert_eq!(store.delete("pmp-test:alpha").await.unwrap(), 1);
        assert_eq!(store.get("pmp-test:alpha").await, Err(KvError::NoItem));
    }

    #[tokio::test]
    #[ignore] // Remove this to run with a local instance
    async fn test_transactional_conditional_write() {
        let store = DragonflyKeyValueStore::connect_url("redis://127.0.0.1/")
            .await
            .expect("Failed to connect");

        store.delete("pmp-test:record").await.unwrap();
        store.delete("pmp-test:index").await.unwrap();

        let mut tx = store.start_transaction();
        let set_cmd = tx.set_with_expiration("pmp-test:record", "1337", Duration::from_secs(60));
        let add_cmd = tx.add_to_vector("pmp-test:index", &["member".to_string()]);

        tx.exec().await.unwrap();

        assert_eq!(set_cmd.result(), Ok(true));
        assert_eq!(add_cmd.result(), Ok(1));

        // A second conditional write on the same key loses
        let mut tx = store.start_transaction();
        let set_cmd = tx.set_with_expiration("pmp-test:record", "7331", Duration::from_secs(60));
        tx.exec().await.unwrap();

        assert_eq!(set_cmd.result(), Ok(false));
        assert_eq!(store.get("pmp-test:record").await.unwrap(), "1337");

        store.delete("pmp-test:record").await.unwrap();
        store.delete("pmp-test:index").await.unwrap();
    }
}
