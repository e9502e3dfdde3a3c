//! Environment-driven server configuration.

use std::time::Duration;

use anyhow::{Context, Result};

use keybridge_broker::DEFAULT_STATE_TTL;

/// Everything the server reads from the environment at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to bind, `KEYBRIDGE_BIND` (default `0.0.0.0:8000`).
    pub bind_addr: String,
    /// Public base URL provider redirects point back to,
    /// `KEYBRIDGE_PUBLIC_HOST`.
    pub public_host: String,
    /// Base64-encoded 32-byte field encryption key,
    /// `KEYBRIDGE_ENCRYPTION_KEY`.
    pub encryption_key: String,
    /// Redis connection URL, `KEYBRIDGE_REDIS_URL`. Absent means the
    /// in-memory store, for local development only.
    pub redis_url: Option<String>,
    /// Pending-authorization TTL override in seconds,
    /// `KEYBRIDGE_STATE_TTL_SECS`.
    pub state_ttl: Duration,
}

impl ServerConfig {
    /// Read configuration from the process environment.
    ///
    /// # Errors
    /// Fails when a required variable is missing or an override does not
    /// parse.
    pub fn from_env() -> Result<Self> {
        let bind_addr =
            std::env::var("KEYBRIDGE_BIND").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
        let public_host = std::env::var("KEYBRIDGE_PUBLIC_HOST")
            .context("KEYBRIDGE_PUBLIC_HOST must be set to the public base URL")?;
        let encryption_key = std::env::var("KEYBRIDGE_ENCRYPTION_KEY")
            .context("KEYBRIDGE_ENCRYPTION_KEY must be set (base64, 32 bytes)")?;
        let redis_url = std::env::var("KEYBRIDGE_REDIS_URL").ok();

        let state_ttl = match std::env::var("KEYBRIDGE_STATE_TTL_SECS") {
            Ok(raw) => Duration::from_secs(
                raw.parse().context("KEYBRIDGE_STATE_TTL_SECS must be an integer")?,
            ),
            Err(_) => DEFAULT_STATE_TTL,
        };

        Ok(Self { bind_addr, public_host, encryption_key, redis_url, state_ttl })
    }
}
