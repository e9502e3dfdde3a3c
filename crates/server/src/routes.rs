//! HTTP surface of the broker.
//!
//! Thin translation layer: extract the operator id and request parameters,
//! call the broker, map [`BrokerError`] onto status codes. The operator id
//! arrives as the opaque `x-operator-id` header from the upstream identity
//! layer; nothing here parses or verifies assertions.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use keybridge_broker::{AppRegistration, BrokerError, IdentityKey, TokenBroker};

use crate::enrich::enrich_authorization;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<TokenBroker>,
    pub http: reqwest::Client,
}

/// [`BrokerError`] with an HTTP status.
pub struct ApiError(BrokerError);

impl From<BrokerError> for ApiError {
    fn from(error: BrokerError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            BrokerError::UnknownProvider(_) | BrokerError::InvalidIdentity(_) => {
                StatusCode::BAD_REQUEST
            }
            BrokerError::Unauthenticated => StatusCode::UNAUTHORIZED,
            BrokerError::InvalidOrExpiredState => StatusCode::FORBIDDEN,
            BrokerError::MissingAppRegistration { .. } => StatusCode::CONFLICT,
            BrokerError::TokenExchangeFailed(_) | BrokerError::RefreshFailed(_) => {
                StatusCode::BAD_GATEWAY
            }
            BrokerError::Store(_) | BrokerError::Crypto(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// Build the full route table, including one redirect endpoint per
/// cataloged provider.
pub fn router(state: AppState) -> Router {
    let redirects: Vec<(&'static str, String)> = state
        .broker
        .registry()
        .descriptors()
        .map(|d| (d.id, format!("/{}", d.redirect_path)))
        .collect();

    let mut app = Router::new()
        .route("/providers/{provider}/apps", post(register_app))
        .route("/providers/{provider}/authorizations", post(begin_authorization))
        .route("/providers/{provider}/token", get(fetch_access_token));

    for (provider, redirect_path) in redirects {
        app = app.route(
            &redirect_path,
            get(move |state: State<AppState>, query: Query<CallbackParams>| {
                handle_redirect(state, provider, query)
            }),
        );
    }

    app.with_state(state)
}

/// Pull the opaque operator id out of the request headers.
fn operator_id(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("x-operator-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(ApiError(BrokerError::Unauthenticated))
}

#[derive(Debug, Deserialize)]
struct RegisterAppBody {
    client_id: String,
    client_secret: String,
    api_key: Option<String>,
    api_secret: Option<String>,
    scopes: Option<String>,
}

async fn register_app(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    Json(body): Json<RegisterAppBody>,
) -> Result<impl IntoResponse, ApiError> {
    let operator = operator_id(&headers)?;
    let registration = AppRegistration {
        client_id: body.client_id,
        client_secret: body.client_secret,
        api_key: body.api_key,
        api_secret: body.api_secret,
        scopes: body.scopes,
    };
    state.broker.register_app(&operator, &provider, &registration).await?;
    Ok((StatusCode::CREATED, Json(json!({ "status": "registered" }))))
}

#[derive(Debug, Deserialize)]
struct BeginAuthorizationBody {
    end_user_id: String,
    #[serde(default)]
    extra_params: HashMap<String, String>,
}

async fn begin_authorization(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    Json(body): Json<BeginAuthorizationBody>,
) -> Result<impl IntoResponse, ApiError> {
    let operator = operator_id(&headers)?;
    let identity = IdentityKey::new(operator, body.end_user_id)?;
    let extra_params: Vec<(String, String)> = body.extra_params.into_iter().collect();

    let request = state.broker.begin_authorization(&identity, &provider, &extra_params).await?;
    Ok(Json(json!({
        "authorization_url": request.authorize_url,
        "state": request.state,
    })))
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    end_user_id: String,
}

async fn fetch_access_token(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let operator = operator_id(&headers)?;
    let identity = IdentityKey::new(operator, query.end_user_id)?;

    let token = state.broker.get_access_token(&identity, &provider).await?;
    Ok(Json(json!({ "access_token": token })))
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: String,
    state: String,
}

/// Provider redirect endpoint: redeem the state, exchange the code, run
/// enrichment, and show the end-user a terminal page.
async fn handle_redirect(
    State(state): State<AppState>,
    provider: &'static str,
    Query(params): Query<CallbackParams>,
) -> Result<impl IntoResponse, ApiError> {
    let completed = state
        .broker
        .complete_authorization(provider, &params.code, &params.state)
        .await?;

    enrich_authorization(&state.broker, &state.http, provider, &completed).await;

    Ok(Html(
        "<html><body><h3>Authorization complete.</h3>\
         <p>You can close this window.</p></body></html>",
    ))
}
