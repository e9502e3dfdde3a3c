//! Anti-forgery state ledger.
//!
//! Every authorization flow mints a state token that must round-trip
//! through the provider unchanged. The ledger binds that token to the
//! identity (and, for PKCE providers, the code verifier) that started the
//! flow, and hands the binding back exactly once.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BrokerError, Result};
use crate::store::KeyValueStore;

/// Default lifetime of a pending authorization flow.
pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(600);

const STATE_KEY_PREFIX: &str = "STATE:";

/// What a state token was bound to when the flow began.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    /// Serialized Identity Key of the flow's initiator.
    pub identity: String,
    /// PKCE code verifier, present only for PKCE providers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verifier: Option<String>,
}

/// Take-once store of pending authorization state.
#[derive(Clone)]
pub struct StateLedger {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl StateLedger {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Record a pending flow under its state token.
    ///
    /// # Errors
    /// Returns [`BrokerError::Store`] when the backend write fails.
    pub async fn put(&self, state: &str, record: &StateRecord) -> Result<()> {
        let payload = serde_json::to_string(record)
            .map_err(|e| BrokerError::Store(format!("state serialization failed: {e}")))?;
        self.store
            .put_ephemeral(&format!("{STATE_KEY_PREFIX}{state}"), &payload, self.ttl)
            .await
    }

    /// Redeem a state token, consuming it.
    ///
    /// # Errors
    /// Returns [`BrokerError::InvalidOrExpiredState`] when the token is
    /// unknown, expired, or was already redeemed.
    pub async fn take(&self, state: &str) -> Result<StateRecord> {
        let payload = self
            .store
            .take_ephemeral(&format!("{STATE_KEY_PREFIX}{state}"))
            .await?
            .ok_or(BrokerError::InvalidOrExpiredState)?;
        serde_json::from_str(&payload)
            .map_err(|e| BrokerError::Store(format!("corrupt state record: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use crate::store::InMemoryStore;

    use super::*;

    fn ledger() -> StateLedger {
        StateLedger::new(Arc::new(InMemoryStore::new()), DEFAULT_STATE_TTL)
    }

    #[tokio::test]
    async fn put_then_take_returns_the_record() {
        let ledger = ledger();
        let record = StateRecord {
            identity: "acme::alice".to_string(),
            verifier: Some("v".to_string()),
        };
        ledger.put("abc123", &record).await.unwrap();

        assert_eq!(ledger.take("abc123").await.unwrap(), record);
    }

    #[tokio::test]
    async fn take_consumes_the_state() {
        let ledger = ledger();
        let record = StateRecord { identity: "acme::alice".to_string(), verifier: None };
        ledger.put("abc123", &record).await.unwrap();

        ledger.take("abc123").await.unwrap();
        assert!(matches!(
            ledger.take("abc123").await,
            Err(BrokerError::InvalidOrExpiredState)
        ));
    }

    #[tokio::test]
    async fn unknown_state_is_rejected() {
        assert!(matches!(
            ledger().take("never-issued").await,
            Err(BrokerError::InvalidOrExpiredState)
        ));
    }

    #[tokio::test]
    async fn verifier_absence_round_trips() {
        let ledger = ledger();
        let record = StateRecord { identity: "acme::bob".to_string(), verifier: None };
        ledger.put("s1", &record).await.unwrap();
        assert!(ledger.take("s1").await.unwrap().verifier.is_none());
    }
}
