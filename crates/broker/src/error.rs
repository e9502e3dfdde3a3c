//! Error taxonomy for the token broker.
//!
//! Every failure is surfaced to the caller as a structured variant; nothing
//! is swallowed or retried transparently. The only caller-visible retry path
//! is restarting the flow with a fresh `begin_authorization` call.

use thiserror::Error;

/// Errors produced by the broker and its collaborators.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Provider id is not in the closed catalog.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// The operator never registered client credentials for this provider.
    /// Actionable: call `register_app` first.
    #[error("no app registration for provider '{provider}' under operator '{operator}'")]
    MissingAppRegistration { operator: String, provider: String },

    /// The callback carried a state token we did not mint, already redeemed,
    /// or let expire. Treated as a forged or replayed redirect; never retried.
    #[error("invalid or expired authorization state")]
    InvalidOrExpiredState,

    /// The provider rejected the authorization code, or the exchange request
    /// failed on the wire.
    #[error("token exchange failed: {0}")]
    TokenExchangeFailed(String),

    /// The refresh token was rejected or the refresh request failed. The
    /// stored credential needs a human to re-authorize; the stale token is
    /// kept for diagnostics but never returned as valid.
    #[error("token refresh failed, re-authorization required: {0}")]
    RefreshFailed(String),

    /// No verified operator identity was supplied by the identity
    /// collaborator.
    #[error("no verified operator identity supplied")]
    Unauthenticated,

    /// Operator or end-user id is empty or contains the `::` separator.
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    /// Underlying key-value store failure.
    #[error("store error: {0}")]
    Store(String),

    /// Encryption or decryption of a credential field failed.
    #[error("crypto error: {0}")]
    Crypto(String),
}

/// Result type alias for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;
