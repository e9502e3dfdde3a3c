//! Post-authorization provider metadata enrichment.
//!
//! Some providers scope their APIs to a site the token was granted for,
//! discovered with a follow-up call right after authorization. The broker
//! core only persists the result; the fetch lives here.

use serde::Deserialize;

use keybridge_broker::{CompletedAuthorization, TokenBroker};

const ATLASSIAN_RESOURCES_URL: &str =
    "https://api.atlassian.com/oauth/token/accessible-resources";

#[derive(Debug, Deserialize)]
struct AccessibleResource {
    id: String,
    url: String,
}

/// Run any provider-specific enrichment for a freshly completed flow.
///
/// Enrichment failures are logged and swallowed; the issued token is
/// already persisted and stays usable without the metadata.
pub async fn enrich_authorization(
    broker: &TokenBroker,
    http: &reqwest::Client,
    provider: &str,
    completed: &CompletedAuthorization,
) {
    if provider == "atlassian" {
        if let Err(error) =
            store_atlassian_site(broker, http, ATLASSIAN_RESOURCES_URL, completed).await
        {
            tracing::warn!(provider, identity = %completed.identity, %error,
                "metadata enrichment failed");
        }
    }
}

/// Fetch the accessible-resources list and persist the first site's
/// id and URL as `CLOUD_ID`/`CLOUD_URL` metadata.
async fn store_atlassian_site(
    broker: &TokenBroker,
    http: &reqwest::Client,
    resources_url: &str,
    completed: &CompletedAuthorization,
) -> anyhow::Result<()> {
    let resources: Vec<AccessibleResource> = http
        .get(resources_url)
        .bearer_auth(&completed.token.access_token)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let Some(site) = resources.first() else {
        tracing::debug!(identity = %completed.identity, "no accessible resources returned");
        return Ok(());
    };

    broker
        .store_metadata(
            &completed.identity,
            "atlassian",
            &[
                ("CLOUD_ID".to_string(), site.id.clone()),
                ("CLOUD_URL".to_string(), site.url.clone()),
            ],
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use keybridge_broker::{
        FieldCipher, HttpTokenExchanger, IdentityKey, InMemoryStore, KeyValueStore,
        ProviderRegistry, TokenSet, DEFAULT_STATE_TTL,
    };

    use super::*;

    fn broker() -> (TokenBroker, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let cipher =
            Arc::new(FieldCipher::from_base64(&FieldCipher::generate_key()).unwrap());
        let broker = TokenBroker::new(
            ProviderRegistry::builtin(),
            store.clone() as Arc<dyn KeyValueStore>,
            cipher,
            Arc::new(HttpTokenExchanger::new().unwrap()),
            "https://broker.example.com",
            DEFAULT_STATE_TTL,
        );
        (broker, store)
    }

    fn completed() -> CompletedAuthorization {
        CompletedAuthorization {
            identity: IdentityKey::new("acme", "alice").unwrap(),
            token: TokenSet {
                access_token: "at-token".to_string(),
                refresh_token: None,
                token_type: "Bearer".to_string(),
                expires_in: 3600,
                scope: None,
            },
        }
    }

    #[tokio::test]
    async fn stores_first_accessible_site() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oauth/token/accessible-resources"))
            .and(header("authorization", "Bearer at-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": "site-1", "url": "https://acme.atlassian.net", "name": "acme" },
                { "id": "site-2", "url": "https://other.atlassian.net", "name": "other" },
            ])))
            .mount(&server)
            .await;

        let (broker, store) = broker();
        let url = format!("{}/oauth/token/accessible-resources", server.uri());
        store_atlassian_site(&broker, &reqwest::Client::new(), &url, &completed())
            .await
            .unwrap();

        assert_eq!(
            store.get_field("acme::alice", "atlassian_CLOUD_ID").await.unwrap().as_deref(),
            Some("site-1")
        );
        assert_eq!(
            store.get_field("acme::alice", "atlassian_CLOUD_URL").await.unwrap().as_deref(),
            Some("https://acme.atlassian.net")
        );
    }

    #[tokio::test]
    async fn empty_resource_list_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oauth/token/accessible-resources"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let (broker, store) = broker();
        let url = format!("{}/oauth/token/accessible-resources", server.uri());
        store_atlassian_site(&broker, &reqwest::Client::new(), &url, &completed())
            .await
            .unwrap();

        assert!(store
            .get_field("acme::alice", "atlassian_CLOUD_ID")
            .await
            .unwrap()
            .is_none());
    }
}
