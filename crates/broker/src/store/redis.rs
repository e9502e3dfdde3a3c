//! Redis-backed credential store.
//!
//! Records are Redis hashes keyed by identity; ephemeral entries are plain
//! string keys with `SET EX`, claimed atomically with `GETDEL` so a state
//! token redeems at most once even across processes.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::{BrokerError, Result};

use super::KeyValueStore;

/// [`KeyValueStore`] over a shared [`ConnectionManager`], which reconnects
/// on failure and is cheap to clone per operation.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis at `url` (e.g. `redis://127.0.0.1:6379/0`).
    ///
    /// # Errors
    /// Returns [`BrokerError::Store`] when the URL is invalid or the
    /// initial connection fails.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| BrokerError::Store(format!("invalid redis url: {e}")))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| BrokerError::Store(format!("redis connection failed: {e}")))?;
        tracing::info!("connected to redis credential store");
        Ok(Self { manager })
    }
}

fn store_err(e: redis::RedisError) -> BrokerError {
    BrokerError::Store(e.to_string())
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get_field(&self, key: &str, field: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        conn.hget(key, field).await.map_err(store_err)
    }

    async fn set_field(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        conn.hset::<_, _, _, ()>(key, field, value)
            .await
            .map_err(store_err)
    }

    async fn set_fields(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.manager.clone();
        conn.hset_multiple::<_, _, _, ()>(key, fields)
            .await
            .map_err(store_err)
    }

    async fn field_exists(&self, key: &str, field: &str) -> Result<bool> {
        let mut conn = self.manager.clone();
        conn.hexists(key, field).await.map_err(store_err)
    }

    async fn delete_field(&self, key: &str, field: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        conn.hdel::<_, _, ()>(key, field).await.map_err(store_err)
    }

    async fn put_ephemeral(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.manager.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs())
            .await
            .map_err(store_err)
    }

    async fn take_ephemeral(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        redis::cmd("GETDEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(store_err)
    }
}
