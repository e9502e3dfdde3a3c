//! Process entry point.

use std::sync::Arc;

use anyhow::Context;

use keybridge_broker::{
    FieldCipher, HttpTokenExchanger, InMemoryStore, KeyValueStore, ProviderRegistry, RedisStore,
    TokenBroker,
};
use keybridge_server::{router, AppState, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    let store: Arc<dyn KeyValueStore> = match &config.redis_url {
        Some(url) => Arc::new(RedisStore::connect(url).await?),
        None => {
            tracing::warn!("KEYBRIDGE_REDIS_URL not set, using in-memory store");
            Arc::new(InMemoryStore::new())
        }
    };
    let cipher = Arc::new(FieldCipher::from_base64(&config.encryption_key)?);

    let broker = TokenBroker::new(
        ProviderRegistry::builtin(),
        store,
        cipher,
        Arc::new(HttpTokenExchanger::new()?),
        config.public_host.clone(),
        config.state_ttl,
    );

    let app = router(AppState { broker: Arc::new(broker), http: reqwest::Client::new() });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "token broker listening");
    axum::serve(listener, app).await.context("server terminated")?;
    Ok(())
}
