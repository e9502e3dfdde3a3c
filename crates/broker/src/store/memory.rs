//! In-memory store for tests and single-process deployments.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::Result;

use super::KeyValueStore;

#[derive(Debug)]
struct EphemeralEntry {
    value: String,
    expires_at: Instant,
}

/// Process-local [`KeyValueStore`] backed by mutex-guarded maps.
///
/// Ephemeral expiry is checked lazily on access, which is enough for the
/// take-once contract.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: Mutex<HashMap<String, HashMap<String, String>>>,
    ephemeral: Mutex<HashMap<String, EphemeralEntry>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get_field(&self, key: &str, field: &str) -> Result<Option<String>> {
        let records = self.records.lock().await;
        Ok(records.get(key).and_then(|r| r.get(field)).cloned())
    }

    async fn set_field(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut records = self.records.lock().await;
        records
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn set_fields(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        let mut records = self.records.lock().await;
        let record = records.entry(key.to_string()).or_default();
        for (field, value) in fields {
            record.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    async fn field_exists(&self, key: &str, field: &str) -> Result<bool> {
        let records = self.records.lock().await;
        Ok(records.get(key).is_some_and(|r| r.contains_key(field)))
    }

    async fn delete_field(&self, key: &str, field: &str) -> Result<()> {
        let mut records = self.records.lock().await;
        if let Some(record) = records.get_mut(key) {
            record.remove(field);
        }
        Ok(())
    }

    async fn put_ephemeral(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut ephemeral = self.ephemeral.lock().await;
        ephemeral.insert(
            key.to_string(),
            EphemeralEntry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn take_ephemeral(&self, key: &str) -> Result<Option<String>> {
        let mut ephemeral = self.ephemeral.lock().await;
        match ephemeral.remove(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value)),
            _ => Ok(None),
        }
    }
}
