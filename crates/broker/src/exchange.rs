//! Token endpoint client.
//!
//! [`TokenExchanger`] is the seam the broker talks to providers through;
//! [`HttpTokenExchanger`] is the production implementation over reqwest.
//! Provider quirks decide how the exchange authenticates itself: most
//! providers take `client_id`/`client_secret` in the form body, while
//! `basic_auth_exchange` providers take a consumer key pair as an HTTP
//! Basic header and no client parameters at all.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{BrokerError, Result};
use crate::registration::AppRegistration;
use crate::registry::ProviderDescriptor;
use crate::token::{normalize_response, TokenSet};

const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(10);
const EXCHANGE_USER_AGENT: &str = "keybridge-broker";

/// Error payload providers return on a failed exchange.
#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: Option<String>,
    error_description: Option<String>,
}

/// Performs code and refresh exchanges against a provider.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    /// Exchange an authorization code for a token set.
    async fn exchange_code(
        &self,
        descriptor: &ProviderDescriptor,
        registration: &AppRegistration,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> Result<TokenSet>;

    /// Exchange a refresh token for a fresh token set.
    async fn refresh(
        &self,
        descriptor: &ProviderDescriptor,
        registration: &AppRegistration,
        refresh_token: &str,
    ) -> Result<TokenSet>;
}

/// reqwest-backed [`TokenExchanger`].
#[derive(Debug, Clone)]
pub struct HttpTokenExchanger {
    client: reqwest::Client,
}

impl HttpTokenExchanger {
    /// # Errors
    /// Returns [`BrokerError::TokenExchangeFailed`] when the HTTP client
    /// cannot be constructed.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(EXCHANGE_TIMEOUT)
            .build()
            .map_err(|e| {
                BrokerError::TokenExchangeFailed(format!("failed to build http client: {e}"))
            })?;
        Ok(Self { client })
    }

    async fn post_form(
        &self,
        descriptor: &ProviderDescriptor,
        registration: &AppRegistration,
        url: &str,
        mut form: Vec<(&'static str, String)>,
    ) -> Result<Value> {
        let mut request = self.client.post(url);

        if descriptor.quirks.basic_auth_exchange {
            let api_key = registration.api_key.as_deref().unwrap_or_default();
            let api_secret = registration.api_secret.as_deref().unwrap_or_default();
            let credentials = BASE64.encode(format!("{api_key}:{api_secret}"));
            request = request
                .header(reqwest::header::AUTHORIZATION, format!("Basic {credentials}"))
                .header(reqwest::header::USER_AGENT, EXCHANGE_USER_AGENT)
                .header(
                    reqwest::header::CONTENT_TYPE,
                    "application/x-www-form-urlencoded",
                );
        } else {
            form.push(("client_id", registration.client_id.clone()));
            form.push(("client_secret", registration.client_secret.clone()));
        }

        let response = request
            .form(&form)
            .send()
            .await
            .map_err(|e| BrokerError::TokenExchangeFailed(format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BrokerError::TokenExchangeFailed(format!("unreadable response: {e}")))?;

        if !status.is_success() {
            return Err(BrokerError::TokenExchangeFailed(describe_failure(status, &body)));
        }

        serde_json::from_str(&body)
            .map_err(|e| BrokerError::TokenExchangeFailed(format!("non-json response: {e}")))
    }
}

/// Summarize a provider error response for the error message, preferring
/// the structured `error`/`error_description` fields when present.
fn describe_failure(status: reqwest::StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ProviderErrorBody>(body) {
        match (parsed.error, parsed.error_description) {
            (Some(error), Some(description)) => {
                return format!("{status}: {error}: {description}");
            }
            (Some(error), None) => return format!("{status}: {error}"),
            _ => {}
        }
    }
    format!("{status}: {body}")
}

#[async_trait]
impl TokenExchanger for HttpTokenExchanger {
    async fn exchange_code(
        &self,
        descriptor: &ProviderDescriptor,
        registration: &AppRegistration,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> Result<TokenSet> {
        let mut form = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("redirect_uri", redirect_uri.to_string()),
        ];
        if let Some(verifier) = code_verifier {
            form.push(("code_verifier", verifier.to_string()));
        }

        tracing::debug!(provider = descriptor.id, "exchanging authorization code");
        let raw = self
            .post_form(descriptor, registration, descriptor.token_url, form)
            .await?;
        normalize_response(raw, &descriptor.quirks)
    }

    async fn refresh(
        &self,
        descriptor: &ProviderDescriptor,
        registration: &AppRegistration,
        refresh_token: &str,
    ) -> Result<TokenSet> {
        let form = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.to_string()),
        ];

        tracing::debug!(provider = descriptor.id, "refreshing access token");
        let raw = self
            .post_form(descriptor, registration, descriptor.refresh_url, form)
            .await
            .map_err(|e| match e {
                BrokerError::TokenExchangeFailed(msg) => BrokerError::RefreshFailed(msg),
                other => other,
            })?;
        normalize_response(raw, &descriptor.quirks).map_err(|e| match e {
            BrokerError::TokenExchangeFailed(msg) => BrokerError::RefreshFailed(msg),
            other => other,
        })
    }
}
