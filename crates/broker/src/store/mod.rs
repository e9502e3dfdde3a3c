//! Credential store abstraction.
//!
//! Persistent state lives behind [`KeyValueStore`] so the broker can run
//! against Redis in production and an in-memory map in tests. Records are
//! field maps keyed by identity; ephemeral entries (anti-forgery state)
//! live in a separate keyspace with a TTL and take-once semantics.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

pub mod memory;
pub mod redis;

pub use memory::InMemoryStore;
pub use redis::RedisStore;

/// Async key/value backend for credential records and ephemeral state.
///
/// `key` addresses a record (an Identity Key), `field` a named slot inside
/// it. Ephemeral entries are standalone keys with a TTL; `take_ephemeral`
/// is atomic so a value can be claimed by at most one caller.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read one field of a record, `None` when absent.
    async fn get_field(&self, key: &str, field: &str) -> Result<Option<String>>;

    /// Write one field of a record.
    async fn set_field(&self, key: &str, field: &str, value: &str) -> Result<()>;

    /// Write several fields of a record in order, in one call.
    async fn set_fields(&self, key: &str, fields: &[(String, String)]) -> Result<()>;

    /// Whether a record has the given field.
    async fn field_exists(&self, key: &str, field: &str) -> Result<bool>;

    /// Remove one field of a record; absent fields are a no-op.
    async fn delete_field(&self, key: &str, field: &str) -> Result<()>;

    /// Store an ephemeral value that expires after `ttl`.
    async fn put_ephemeral(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Atomically read and delete an ephemeral value. Returns `None` when
    /// the key is absent, expired, or already taken.
    async fn take_ephemeral(&self, key: &str) -> Result<Option<String>>;
}
