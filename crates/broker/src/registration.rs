//! Per-operator provider app registrations.
//!
//! Before an operator can start flows against a provider, they register
//! their OAuth app credentials. Registrations are persisted as
//! `{provider}_{FIELD}` slots on the operator's record, with the secret
//! fields encrypted the same way issued tokens are.

use std::sync::Arc;

use crate::crypto::FieldCipher;
use crate::error::{BrokerError, Result};
use crate::store::KeyValueStore;

/// OAuth app credentials an operator registered for one provider.
#[derive(Debug, Clone, Default)]
pub struct AppRegistration {
    pub client_id: String,
    pub client_secret: String,
    /// Consumer key pair, used by providers that authenticate the token
    /// exchange with HTTP Basic instead of body parameters.
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    /// Space-separated scopes to request; falls back to the provider's
    /// defaults when absent.
    pub scopes: Option<String>,
}

/// Reads and writes [`AppRegistration`] records.
#[derive(Clone)]
pub struct RegistrationStore {
    store: Arc<dyn KeyValueStore>,
    cipher: Arc<FieldCipher>,
}

impl RegistrationStore {
    pub fn new(store: Arc<dyn KeyValueStore>, cipher: Arc<FieldCipher>) -> Self {
        Self { store, cipher }
    }

    /// Persist an operator's app registration for `provider`.
    ///
    /// # Errors
    /// Returns [`BrokerError::Store`] or [`BrokerError::Crypto`] on backend
    /// failure.
    pub async fn save(
        &self,
        operator: &str,
        provider: &str,
        registration: &AppRegistration,
    ) -> Result<()> {
        let mut fields = vec![
            (format!("{provider}_CLIENT_ID"), registration.client_id.clone()),
            (
                format!("{provider}_CLIENT_SECRET"),
                self.cipher.encrypt(&registration.client_secret)?,
            ),
        ];
        if let Some(api_key) = &registration.api_key {
            fields.push((format!("{provider}_API_KEY"), api_key.clone()));
        }
        if let Some(api_secret) = &registration.api_secret {
            fields.push((format!("{provider}_API_SECRET"), self.cipher.encrypt(api_secret)?));
        }
        if let Some(scopes) = &registration.scopes {
            fields.push((format!("{provider}_SCOPES"), scopes.clone()));
        }
        self.store.set_fields(operator, &fields).await?;
        tracing::info!(operator, provider, "stored app registration");
        Ok(())
    }

    /// Whether `operator` has registered an app for `provider`.
    pub async fn exists(&self, operator: &str, provider: &str) -> Result<bool> {
        self.store.field_exists(operator, &format!("{provider}_CLIENT_ID")).await
    }

    /// Load an operator's registration, failing when none exists.
    ///
    /// # Errors
    /// Returns [`BrokerError::MissingAppRegistration`] when the operator has
    /// not registered an app for `provider`.
    pub async fn load(&self, operator: &str, provider: &str) -> Result<AppRegistration> {
        let client_id = self
            .store
            .get_field(operator, &format!("{provider}_CLIENT_ID"))
            .await?
            .ok_or_else(|| BrokerError::MissingAppRegistration {
                operator: operator.to_string(),
                provider: provider.to_string(),
            })?;

        let client_secret = match self
            .store
            .get_field(operator, &format!("{provider}_CLIENT_SECRET"))
            .await?
        {
            Some(encrypted) => self.cipher.decrypt(&encrypted)?,
            None => String::new(),
        };

        let api_key = self.store.get_field(operator, &format!("{provider}_API_KEY")).await?;
        let api_secret = match self
            .store
            .get_field(operator, &format!("{provider}_API_SECRET"))
            .await?
        {
            Some(encrypted) => Some(self.cipher.decrypt(&encrypted)?),
            None => None,
        };
        let scopes = self.store.get_field(operator, &format!("{provider}_SCOPES")).await?;

        Ok(AppRegistration { client_id, client_secret, api_key, api_secret, scopes })
    }
}

#[cfg(test)]
mod tests {
    use crate::store::InMemoryStore;

    use super::*;

    fn registrations() -> RegistrationStore {
        let cipher = FieldCipher::from_base64(&FieldCipher::generate_key()).unwrap();
        RegistrationStore::new(Arc::new(InMemoryStore::new()), Arc::new(cipher))
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let store = registrations();
        let registration = AppRegistration {
            client_id: "cid".to_string(),
            client_secret: "csecret".to_string(),
            api_key: Some("akey".to_string()),
            api_secret: Some("asecret".to_string()),
            scopes: Some("read write".to_string()),
        };
        store.save("acme", "twitter", &registration).await.unwrap();

        let loaded = store.load("acme", "twitter").await.unwrap();
        assert_eq!(loaded.client_id, "cid");
        assert_eq!(loaded.client_secret, "csecret");
        assert_eq!(loaded.api_key.as_deref(), Some("akey"));
        assert_eq!(loaded.api_secret.as_deref(), Some("asecret"));
        assert_eq!(loaded.scopes.as_deref(), Some("read write"));
    }

    #[tokio::test]
    async fn missing_registration_is_reported_per_operator() {
        let store = registrations();
        let err = store.load("acme", "google").await.unwrap_err();
        assert!(matches!(
            err,
            BrokerError::MissingAppRegistration { ref operator, ref provider }
                if operator == "acme" && provider == "google"
        ));
    }

    #[tokio::test]
    async fn secrets_are_not_stored_in_the_clear() {
        let backing = Arc::new(InMemoryStore::new());
        let cipher = FieldCipher::from_base64(&FieldCipher::generate_key()).unwrap();
        let store = RegistrationStore::new(backing.clone(), Arc::new(cipher));

        let registration = AppRegistration {
            client_id: "cid".to_string(),
            client_secret: "csecret".to_string(),
            ..AppRegistration::default()
        };
        store.save("acme", "google", &registration).await.unwrap();

        use crate::store::KeyValueStore as _;
        let raw = backing
            .get_field("acme", "google_CLIENT_SECRET")
            .await
            .unwrap()
            .unwrap();
        assert_ne!(raw, "csecret");
    }

    #[tokio::test]
    async fn exists_tracks_client_id() {
        let store = registrations();
        assert!(!store.exists("acme", "slack").await.unwrap());

        let registration = AppRegistration {
            client_id: "cid".to_string(),
            client_secret: "cs".to_string(),
            ..AppRegistration::default()
        };
        store.save("acme", "slack", &registration).await.unwrap();
        assert!(store.exists("acme", "slack").await.unwrap());
    }
}
