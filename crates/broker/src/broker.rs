//! Token broker orchestration.
//!
//! [`TokenBroker`] ties the registry, store, cipher, ledger, and exchange
//! client together into the five operations the rest of the system calls:
//! app registration, authorization begin/complete, token retrieval with
//! transparent refresh, and metadata persistence.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::crypto::FieldCipher;
use crate::error::{BrokerError, Result};
use crate::exchange::TokenExchanger;
use crate::identity::IdentityKey;
use crate::ledger::{StateLedger, StateRecord};
use crate::pkce::{generate_state_token, PkceChallenge};
use crate::registration::{AppRegistration, RegistrationStore};
use crate::registry::{ProviderDescriptor, ProviderRegistry};
use crate::store::KeyValueStore;
use crate::token::{parse_expiry, TokenSet};

/// A started authorization flow: the URL to send the user's browser to and
/// the state token that will round-trip through the provider.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub authorize_url: String,
    pub state: String,
}

/// Outcome of redeeming a provider redirect.
#[derive(Debug, Clone)]
pub struct CompletedAuthorization {
    /// Who the issued credentials belong to.
    pub identity: IdentityKey,
    /// The freshly issued token set, already persisted. Handed back so the
    /// caller can run post-authorization enrichment without a second
    /// store round trip.
    pub token: TokenSet,
}

/// Orchestrates the full delegated-access token lifecycle.
pub struct TokenBroker {
    registry: ProviderRegistry,
    store: Arc<dyn KeyValueStore>,
    cipher: Arc<FieldCipher>,
    exchanger: Arc<dyn TokenExchanger>,
    registrations: RegistrationStore,
    ledger: StateLedger,
    public_host: String,
    refresh_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TokenBroker {
    pub fn new(
        registry: ProviderRegistry,
        store: Arc<dyn KeyValueStore>,
        cipher: Arc<FieldCipher>,
        exchanger: Arc<dyn TokenExchanger>,
        public_host: impl Into<String>,
        state_ttl: Duration,
    ) -> Self {
        let registrations = RegistrationStore::new(Arc::clone(&store), Arc::clone(&cipher));
        let ledger = StateLedger::new(Arc::clone(&store), state_ttl);
        let public_host = public_host.into().trim_end_matches('/').to_string();
        Self {
            registry,
            store,
            cipher,
            exchanger,
            registrations,
            ledger,
            public_host,
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    /// The provider catalog this broker serves.
    #[must_use]
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Register an operator's OAuth app for a provider.
    ///
    /// # Errors
    /// Returns [`BrokerError::Unauthenticated`] for an empty operator id and
    /// [`BrokerError::UnknownProvider`] for an uncataloged provider.
    pub async fn register_app(
        &self,
        operator: &str,
        provider: &str,
        registration: &AppRegistration,
    ) -> Result<()> {
        if operator.is_empty() {
            return Err(BrokerError::Unauthenticated);
        }
        self.registry.describe(provider)?;
        self.registrations.save(operator, provider, registration).await
    }

    /// Start an authorization flow for an end-user.
    ///
    /// Mints a fresh state token (and PKCE verifier where the provider
    /// requires one), records the pending flow, and builds the provider's
    /// authorization URL.
    ///
    /// # Errors
    /// Returns [`BrokerError::MissingAppRegistration`] when the operator has
    /// not registered an app for the provider; never falls back to shared
    /// credentials.
    pub async fn begin_authorization(
        &self,
        identity: &IdentityKey,
        provider: &str,
        extra_params: &[(String, String)],
    ) -> Result<AuthorizationRequest> {
        let descriptor = self.registry.describe(provider)?;
        let registration = self.registrations.load(identity.operator(), provider).await?;

        let state = generate_state_token();
        let challenge = descriptor.quirks.pkce.then(PkceChallenge::generate);

        let record = StateRecord {
            identity: identity.to_string(),
            verifier: challenge.as_ref().map(|c| c.verifier.clone()),
        };
        self.ledger.put(&state, &record).await?;

        let default_scopes = descriptor.default_scope_string();
        let scope = registration.scopes.as_deref().unwrap_or(&default_scopes);

        let mut url = url::Url::parse(descriptor.authorize_url)
            .map_err(|e| BrokerError::Store(format!("invalid authorize url: {e}")))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("client_id", &registration.client_id)
                .append_pair("redirect_uri", &self.redirect_uri(descriptor))
                .append_pair("response_type", "code")
                .append_pair("scope", scope)
                .append_pair("state", &state);
            if let Some(challenge) = &challenge {
                pairs
                    .append_pair("code_challenge", &challenge.challenge)
                    .append_pair("code_challenge_method", PkceChallenge::method());
            }
            for (key, value) in extra_params {
                pairs.append_pair(key, value);
            }
        }

        tracing::info!(provider, identity = %identity, "authorization flow started");
        Ok(AuthorizationRequest { authorize_url: url.into(), state })
    }

    /// Redeem a provider redirect: consume the state, exchange the code,
    /// and persist the issued credentials.
    ///
    /// # Errors
    /// Returns [`BrokerError::InvalidOrExpiredState`] for an unknown,
    /// expired, or replayed state token; no provider request is made in
    /// that case.
    pub async fn complete_authorization(
        &self,
        provider: &str,
        code: &str,
        state: &str,
    ) -> Result<CompletedAuthorization> {
        let descriptor = self.registry.describe(provider)?;
        let record = self.ledger.take(state).await?;
        let identity: IdentityKey = record.identity.parse()?;

        let registration = self.registrations.load(identity.operator(), provider).await?;
        let token = self
            .exchanger
            .exchange_code(
                descriptor,
                &registration,
                code,
                &self.redirect_uri(descriptor),
                record.verifier.as_deref(),
            )
            .await?;

        self.persist_token(&identity, provider, &token).await?;
        tracing::info!(provider, identity = %identity, "authorization completed");
        Ok(CompletedAuthorization { identity, token })
    }

    /// Fetch a live access token for (identity, provider).
    ///
    /// Returns `Ok(None)` when the end-user has never authorized the
    /// provider. An expired token is refreshed before returning; a stale
    /// token is never handed out.
    ///
    /// # Errors
    /// Returns [`BrokerError::RefreshFailed`] when the stored token is
    /// expired and cannot be refreshed; the record is marked as needing
    /// re-authorization.
    pub async fn get_access_token(
        &self,
        identity: &IdentityKey,
        provider: &str,
    ) -> Result<Option<String>> {
        let descriptor = self.registry.describe(provider)?;
        let key = identity.to_string();

        let Some(live) = self.live_access_token(&key, descriptor).await? else {
            return Ok(None);
        };
        if let Some(token) = live {
            return Ok(Some(token));
        }

        // Expired. Serialize refreshes per (identity, provider) and
        // re-check under the lock so concurrent callers do one exchange.
        let lock_key = format!("{key}/{provider}");
        let lock = self.refresh_lock(&lock_key).await;
        let result = {
            let _guard = lock.lock().await;
            self.refresh_under_lock(identity, descriptor, &key).await
        };
        drop(lock);
        self.release_refresh_lock(&lock_key).await;
        result
    }

    /// Double-checked refresh body, entered with the per-key lock held.
    async fn refresh_under_lock(
        &self,
        identity: &IdentityKey,
        descriptor: &ProviderDescriptor,
        key: &str,
    ) -> Result<Option<String>> {
        match self.live_access_token(key, descriptor).await? {
            Some(Some(token)) => return Ok(Some(token)),
            Some(None) => {}
            None => return Ok(None),
        }

        let refreshed = self.refresh_credentials(identity, descriptor).await;
        if let Err(error) = &refreshed {
            tracing::warn!(provider = descriptor.id, identity = %identity, %error,
                "token refresh failed");
            // The marker is best effort; the refresh failure is what
            // surfaces to the caller.
            if let Err(marker_error) = self
                .store
                .set_field(key, &field(descriptor.id, "NEEDS_REAUTH"), "1")
                .await
            {
                tracing::error!(provider = descriptor.id, identity = %identity, %marker_error,
                    "failed to record re-authorization marker");
            }
        }
        refreshed.map(Some)
    }

    /// Persist an issued token set for (identity, provider).
    ///
    /// Token fields are encrypted; everything lands in one multi-field
    /// write with the expiry ordered last, so a reader never observes a new
    /// access token with no expiry.
    pub async fn persist_token(
        &self,
        identity: &IdentityKey,
        provider: &str,
        token: &TokenSet,
    ) -> Result<()> {
        let key = identity.to_string();
        self.store.delete_field(&key, &field(provider, "NEEDS_REAUTH")).await?;

        let mut fields =
            vec![(field(provider, "ACCESS"), self.cipher.encrypt(&token.access_token)?)];
        if let Some(refresh) = &token.refresh_token {
            fields.push((field(provider, "REFRESH"), self.cipher.encrypt(refresh)?));
        }
        if let Some(scope) = &token.scope {
            fields.push((field(provider, "SCOPES"), scope.clone()));
        }
        fields.push((
            field(provider, "EXPIRES_AT"),
            token.expires_at(Utc::now()).timestamp().to_string(),
        ));

        self.store.set_fields(&key, &fields).await?;
        tracing::debug!(provider, identity = %identity, "credentials persisted");
        Ok(())
    }

    /// Store externally fetched provider metadata (e.g. a cloud site id)
    /// as clear-text fields on the identity's record.
    pub async fn store_metadata(
        &self,
        identity: &IdentityKey,
        provider: &str,
        metadata: &[(String, String)],
    ) -> Result<()> {
        self.registry.describe(provider)?;
        let fields: Vec<(String, String)> = metadata
            .iter()
            .map(|(name, value)| (field(provider, name), value.clone()))
            .collect();
        self.store.set_fields(&identity.to_string(), &fields).await
    }

    /// Decrypt the stored access token when one exists.
    ///
    /// `Ok(None)` means no credentials at all; `Ok(Some(None))` means
    /// credentials exist but are expired.
    async fn live_access_token(
        &self,
        key: &str,
        descriptor: &ProviderDescriptor,
    ) -> Result<Option<Option<String>>> {
        let Some(ciphertext) = self.store.get_field(key, &field(descriptor.id, "ACCESS")).await?
        else {
            return Ok(None);
        };
        let Some(raw_expiry) =
            self.store.get_field(key, &field(descriptor.id, "EXPIRES_AT")).await?
        else {
            // An access token is always written together with its expiry;
            // a record without one is corrupt.
            return Err(BrokerError::Store(format!(
                "credential record for {} is missing its expiry",
                descriptor.id
            )));
        };

        if Utc::now() < parse_expiry(&raw_expiry)? {
            Ok(Some(Some(self.cipher.decrypt(&ciphertext)?)))
        } else {
            Ok(Some(None))
        }
    }

    async fn refresh_credentials(
        &self,
        identity: &IdentityKey,
        descriptor: &ProviderDescriptor,
    ) -> Result<String> {
        let key = identity.to_string();
        let refresh_ciphertext = self
            .store
            .get_field(&key, &field(descriptor.id, "REFRESH"))
            .await?
            .ok_or_else(|| {
                BrokerError::RefreshFailed("no refresh token on record".to_string())
            })?;
        let refresh_token = self.cipher.decrypt(&refresh_ciphertext)?;

        let registration = self.registrations.load(identity.operator(), descriptor.id).await?;
        let mut token = self
            .exchanger
            .refresh(descriptor, &registration, &refresh_token)
            .await?;

        // Providers may rotate the refresh token or omit it; keep the old
        // one when none comes back.
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token);
        }
        self.persist_token(identity, descriptor.id, &token).await?;
        tracing::info!(provider = descriptor.id, identity = %identity, "access token refreshed");
        Ok(token.access_token)
    }

    async fn refresh_lock(&self, lock_key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.refresh_locks.lock().await;
        Arc::clone(locks.entry(lock_key.to_string()).or_default())
    }

    /// Drop the lock entry once no caller holds it, so the map stays
    /// bounded by in-flight refreshes rather than growing per identity.
    async fn release_refresh_lock(&self, lock_key: &str) {
        let mut locks = self.refresh_locks.lock().await;
        if locks.get(lock_key).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(lock_key);
        }
    }

    fn redirect_uri(&self, descriptor: &ProviderDescriptor) -> String {
        format!("{}/{}", self.public_host, descriptor.redirect_path)
    }
}

/// Field name for one slot of a provider's persisted record; the provider
/// id is the prefix as-is (`google_ACCESS`, `atlassian_CLOUD_ID`).
fn field(provider: &str, suffix: &str) -> String {
    format!("{provider}_{suffix}")
}
