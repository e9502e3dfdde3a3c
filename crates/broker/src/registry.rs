//! Static catalog of supported providers.
//!
//! Each provider is described once by an immutable [`ProviderDescriptor`]
//! built at process start and never mutated. Provider-specific protocol
//! deviations are expressed as [`ProviderQuirks`] flags on the descriptor
//! and consulted at a single dispatch point in the exchange client, not
//! scattered as name comparisons.

use crate::error::{BrokerError, Result};

/// Protocol deviations a provider requires during the token exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderQuirks {
    /// Client authentication is a `Basic b64(api_key:api_secret)` header
    /// with a fixed `User-Agent` and form content type; the default
    /// client_id/client_secret exchange parameters must NOT be sent.
    pub basic_auth_exchange: bool,

    /// The authorization request carries an S256 code challenge and the
    /// exchange must replay the per-flow code verifier.
    pub pkce: bool,

    /// The token response nests the user token under `authed_user` and
    /// omits `token_type`; it must be lifted to the top level with
    /// `token_type = Bearer` before normalization.
    pub nested_user_token: bool,
}

/// Immutable description of one supported provider.
#[derive(Debug, Clone)]
pub struct ProviderDescriptor {
    /// Unique short name, also the prefix of persisted field names.
    pub id: &'static str,
    /// Authorization endpoint the user's browser is redirected to.
    pub authorize_url: &'static str,
    /// Code-for-token exchange endpoint.
    pub token_url: &'static str,
    /// Refresh-token exchange endpoint (often equal to `token_url`).
    pub refresh_url: &'static str,
    /// Path segment of the redirect URI under the public host.
    pub redirect_path: &'static str,
    /// Scopes requested when the app registration does not override them.
    pub default_scopes: &'static [&'static str],
    /// Protocol deviations consulted by the exchange client.
    pub quirks: ProviderQuirks,
}

impl ProviderDescriptor {
    /// Space-separated default scope string.
    #[must_use]
    pub fn default_scope_string(&self) -> String {
        self.default_scopes.join(" ")
    }
}

/// Closed catalog of provider descriptors.
///
/// Purely a lookup table; adding a provider means adding a descriptor (and
/// any quirk handling in the exchange client), not changing this contract.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    descriptors: Vec<ProviderDescriptor>,
}

impl ProviderRegistry {
    /// Build a registry from an explicit descriptor set.
    ///
    /// Used by tests and alternate deployments; production uses
    /// [`ProviderRegistry::builtin`].
    #[must_use]
    pub fn new(descriptors: Vec<ProviderDescriptor>) -> Self {
        Self { descriptors }
    }

    /// The compiled-in catalog: google, twitter, atlassian, slack.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(vec![
            ProviderDescriptor {
                id: "google",
                authorize_url: "https://accounts.google.com/o/oauth2/v2/auth",
                token_url: "https://www.googleapis.com/oauth2/v4/token",
                refresh_url: "https://www.googleapis.com/oauth2/v4/token",
                redirect_path: "gdrive-authorization-success",
                default_scopes: &[
                    "https://www.googleapis.com/auth/drive.readonly",
                    "https://www.googleapis.com/auth/gmail.readonly",
                ],
                quirks: ProviderQuirks::default(),
            },
            ProviderDescriptor {
                id: "twitter",
                authorize_url: "https://twitter.com/i/oauth2/authorize",
                token_url: "https://api.twitter.com/2/oauth2/token",
                refresh_url: "https://api.twitter.com/2/oauth2/token",
                redirect_path: "twitter-authorization-success",
                default_scopes: &["offline.access", "tweet.read", "tweet.write"],
                quirks: ProviderQuirks {
                    basic_auth_exchange: true,
                    pkce: true,
                    nested_user_token: false,
                },
            },
            ProviderDescriptor {
                id: "atlassian",
                authorize_url: "https://auth.atlassian.com/authorize",
                token_url: "https://auth.atlassian.com/oauth/token",
                refresh_url: "https://auth.atlassian.com/oauth/token",
                redirect_path: "atlassian-authorization-success",
                default_scopes: &[
                    "read:content-details:confluence",
                    "read:issue-details:jira",
                    "read:audit-log:jira",
                    "read:avatar:jira",
                    "read:field-configuration:jira",
                    "read:issue-meta:jira",
                    "offline_access",
                ],
                quirks: ProviderQuirks::default(),
            },
            ProviderDescriptor {
                id: "slack",
                authorize_url: "https://slack.com/oauth/v2/authorize",
                token_url: "https://slack.com/api/oauth.v2.access",
                refresh_url: "https://slack.com/api/oauth.v2.access",
                redirect_path: "slack-authorization-success",
                // User scopes travel as the `user_scope` extra parameter.
                default_scopes: &[],
                quirks: ProviderQuirks {
                    basic_auth_exchange: false,
                    pkce: false,
                    nested_user_token: true,
                },
            },
        ])
    }

    /// Look up a descriptor by provider id.
    ///
    /// # Errors
    /// Returns [`BrokerError::UnknownProvider`] when the id is not in the
    /// catalog.
    pub fn describe(&self, provider_id: &str) -> Result<&ProviderDescriptor> {
        self.descriptors
            .iter()
            .find(|d| d.id == provider_id)
            .ok_or_else(|| BrokerError::UnknownProvider(provider_id.to_string()))
    }

    /// Iterate all descriptors, e.g. to mount one redirect route each.
    pub fn descriptors(&self) -> impl Iterator<Item = &ProviderDescriptor> {
        self.descriptors.iter()
    }
}
