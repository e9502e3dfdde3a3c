//! Normalized token shapes.
//!
//! Providers answer the token endpoint with differently shaped JSON. The
//! broker reduces every response to one [`TokenSet`] before anything is
//! persisted; quirk-specific reshaping happens in [`normalize_response`]
//! and nowhere else.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{BrokerError, Result};
use crate::registry::ProviderQuirks;

/// Lifetime assigned when a provider issues a token without `expires_in`
/// (Slack user tokens never expire). Keeps the "access token is always
/// accompanied by an expiry" invariant without forcing refreshes of tokens
/// that have no refresh token.
const NON_EXPIRING_LIFETIME_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Common token shape every provider response is normalized into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSet {
    /// Bearer token for API access.
    pub access_token: String,
    /// Refresh token; some providers omit it.
    pub refresh_token: Option<String>,
    /// Token type, `Bearer` for every provider in the catalog.
    pub token_type: String,
    /// Lifetime in seconds, as granted by the provider.
    pub expires_in: i64,
    /// Granted scopes, space separated.
    pub scope: Option<String>,
}

impl TokenSet {
    /// Absolute expiry instant computed from `now`.
    #[must_use]
    pub fn expires_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + chrono::Duration::seconds(self.expires_in)
    }
}

/// Wire shape of a standard RFC 6749 token response.
#[derive(Debug, Deserialize)]
struct RawTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<i64>,
    scope: Option<String>,
}

/// Normalize a provider token response into a [`TokenSet`].
///
/// With the `nested_user_token` quirk the user token sits under
/// `authed_user` and `token_type` is absent; it is lifted to the top level
/// with `token_type = Bearer` before the standard decode.
///
/// # Errors
/// Returns [`BrokerError::TokenExchangeFailed`] when the response does not
/// carry a usable access token.
pub fn normalize_response(mut raw: Value, quirks: &ProviderQuirks) -> Result<TokenSet> {
    if quirks.nested_user_token {
        let mut nested = match raw.get_mut("authed_user").map(Value::take) {
            Some(Value::Object(map)) => map,
            _ => {
                return Err(BrokerError::TokenExchangeFailed(
                    "response is missing the authed_user object".to_string(),
                ))
            }
        };
        nested.insert("token_type".to_string(), Value::from("Bearer"));
        raw = Value::Object(nested);
    }

    let decoded: RawTokenResponse = serde_json::from_value(raw)
        .map_err(|e| BrokerError::TokenExchangeFailed(format!("malformed token response: {e}")))?;

    Ok(TokenSet {
        access_token: decoded.access_token,
        refresh_token: decoded.refresh_token,
        token_type: decoded.token_type.unwrap_or_else(|| "Bearer".to_string()),
        expires_in: decoded.expires_in.unwrap_or(NON_EXPIRING_LIFETIME_SECS),
        scope: decoded.scope,
    })
}

/// Parse a persisted epoch-seconds expiry field.
///
/// # Errors
/// Returns [`BrokerError::Store`] when the field is not a valid timestamp;
/// a credential record with an access token always carries one.
pub fn parse_expiry(raw: &str) -> Result<DateTime<Utc>> {
    let secs: i64 = raw
        .parse()
        .map_err(|_| BrokerError::Store(format!("invalid expiry timestamp '{raw}'")))?;
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| BrokerError::Store(format!("expiry timestamp '{raw}' out of range")))
}

#[cfg(test)]
mod tests {
    //! Unit tests for token normalization.
    use serde_json::json;

    use super::*;

    const NO_QUIRKS: ProviderQuirks = ProviderQuirks {
        basic_auth_exchange: false,
        pkce: false,
        nested_user_token: false,
    };

    const NESTED: ProviderQuirks = ProviderQuirks {
        basic_auth_exchange: false,
        pkce: false,
        nested_user_token: true,
    };

    #[test]
    fn standard_response_passes_through() {
        let raw = json!({
            "access_token": "t1",
            "refresh_token": "r1",
            "token_type": "Bearer",
            "expires_in": 3600,
            "scope": "read write",
        });

        let token = normalize_response(raw, &NO_QUIRKS).unwrap();
        assert_eq!(token.access_token, "t1");
        assert_eq!(token.refresh_token.as_deref(), Some("r1"));
        assert_eq!(token.expires_in, 3600);
        assert_eq!(token.scope.as_deref(), Some("read write"));
    }

    /// The nested-user shape `{"authed_user": {...}}` is lifted to the top
    /// level with `token_type = Bearer` before normalization.
    #[test]
    fn nested_user_token_is_lifted() {
        let raw = json!({
            "ok": true,
            "authed_user": { "access_token": "t1", "scope": "s" },
        });

        let token = normalize_response(raw, &NESTED).unwrap();
        assert_eq!(token.access_token, "t1");
        assert_eq!(token.token_type, "Bearer");
        assert_eq!(token.scope.as_deref(), Some("s"));
        assert!(token.refresh_token.is_none());
    }

    #[test]
    fn nested_quirk_without_authed_user_fails() {
        let raw = json!({ "access_token": "top-level" });
        let err = normalize_response(raw, &NESTED).unwrap_err();
        assert!(matches!(err, BrokerError::TokenExchangeFailed(_)));
    }

    #[test]
    fn missing_expires_in_maps_to_a_long_lifetime() {
        let raw = json!({ "access_token": "t1", "token_type": "Bearer" });
        let token = normalize_response(raw, &NO_QUIRKS).unwrap();
        assert!(token.expires_in > 365 * 24 * 60 * 60);
    }

    #[test]
    fn missing_access_token_is_an_exchange_failure() {
        let raw = json!({ "token_type": "Bearer", "expires_in": 3600 });
        assert!(matches!(
            normalize_response(raw, &NO_QUIRKS),
            Err(BrokerError::TokenExchangeFailed(_))
        ));
    }

    #[test]
    fn expiry_round_trips_through_epoch_seconds() {
        let token = TokenSet {
            access_token: "t".to_string(),
            refresh_token: None,
            token_type: "Bearer".to_string(),
            expires_in: 120,
            scope: None,
        };

        let now = Utc::now();
        let expires_at = token.expires_at(now);
        let parsed = parse_expiry(&expires_at.timestamp().to_string()).unwrap();
        assert_eq!(parsed.timestamp(), expires_at.timestamp());
        assert!(parsed > now);
    }

    #[test]
    fn garbage_expiry_is_a_store_error() {
        assert!(matches!(parse_expiry("soon"), Err(BrokerError::Store(_))));
    }
}
