//! Redis-backed staging store (feature `redis`).
//!
//! Values are plain strings/bytes, indexes are Redis sets and counters use
//! `INCR`, which is atomic on the server and returns the new value.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use crate::core::{StagingStore, WorkerError};

/// `SET marker NX` and `INCR counter` in one server-side step.
const INCREMENT_ONCE: &str = r"
if redis.call('SET', KEYS[2], '1', 'NX') then
  return redis.call('INCR', KEYS[1])
end
return false
";

/// `DEL key` only while it still holds the expected bytes.
const DELETE_IF_EQUALS: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
end
return 0
";

fn store_err(e: &redis::RedisError) -> WorkerError {
    WorkerError::Store(e.to_string())
}

/// Staging store over a multiplexed Redis connection.
#[derive(Clone)]
pub struct RedisStagingStore {
    conn: MultiplexedConnection,
}

impl RedisStagingStore {
    /// Connect to `redis_url` (for example `redis://127.0.0.1:6379`).
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::Store` if the URL is invalid or the server is
    /// unreachable.
    pub async fn connect(redis_url: &str) -> Result<Self, WorkerError> {
        let client = redis::Client::open(redis_url).map_err(|e| store_err(&e))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| store_err(&e))?;
        tracing::info!("redis staging store connected");
        Ok(Self { conn })
    }

    fn conn(&self) -> MultiplexedConnection {
        self.conn.clone()
    }
}

#[async_trait]
impl StagingStore for RedisStagingStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, WorkerError> {
        self.conn()
            .get::<_, Option<Vec<u8>>>(key)
            .await
            .map_err(|e| store_err(&e))
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), WorkerError> {
        self.conn()
            .set::<_, _, ()>(key, value)
            .await
            .map_err(|e| store_err(&e))
    }

    async fn delete(&self, key: &str) -> Result<(), WorkerError> {
        self.conn()
            .del::<_, ()>(key)
            .await
            .map_err(|e| store_err(&e))
    }

    async fn add_to_set(&self, set_key: &str, member: &str) -> Result<bool, WorkerError> {
        let added: i64 = self
            .conn()
            .sadd(set_key, member)
            .await
            .map_err(|e| store_err(&e))?;
        Ok(added > 0)
    }

    async fn remove_from_set(&self, set_key: &str, member: &str) -> Result<bool, WorkerError> {
        let removed: i64 = self
            .conn()
            .srem(set_key, member)
            .await
            .map_err(|e| store_err(&e))?;
        Ok(removed > 0)
    }

    async fn members_of(&self, set_key: &str) -> Result<Vec<String>, WorkerError> {
        self.conn()
            .smembers::<_, Vec<String>>(set_key)
            .await
            .map_err(|e| store_err(&e))
    }

    async fn increment_counter(&self, name: &str) -> Result<u64, WorkerError> {
        self.conn()
            .incr::<_, _, u64>(name, 1u64)
            .await
            .map_err(|e| store_err(&e))
    }

    async fn get_counter(&self, name: &str) -> Result<u64, WorkerError> {
        let value: Option<u64> = self
            .conn()
            .get(name)
            .await
            .map_err(|e| store_err(&e))?;
        Ok(value.unwrap_or(0))
    }

    async fn increment_once(&self, name: &str, marker: &str) -> Result<Option<u64>, WorkerError> {
        let mut conn = self.conn();
        redis::Script::new(INCREMENT_ONCE)
            .key(name)
            .key(marker)
            .invoke_async::<_, Option<u64>>(&mut conn)
            .await
            .map_err(|e| store_err(&e))
    }

    async fn delete_if_equals(&self, key: &str, expected: &[u8]) -> Result<bool, WorkerError> {
        let mut conn = self.conn();
        let deleted: i64 = redis::Script::new(DELETE_IF_EQUALS)
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| store_err(&e))?;
        Ok(deleted > 0)
    }
}
