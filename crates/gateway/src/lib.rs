//! Multi-dialect LLM gateway core.
//!
//! Terminates OpenAI Chat, OpenAI Responses and Anthropic Messages traffic,
//! picks a provider binding by weighted draw, transcodes between dialects
//! where needed, retries failed attempts before anything is written to the
//! client, and records one log row per attempt.

mod adapter;
pub mod catalog;
mod dispatch;
mod error;
mod http_client;
mod messages;
mod preparse;
mod recorder;
mod selector;
pub mod storage;
mod streaming;
mod weights;

pub use dispatch::{Dispatcher, RequestContext};
pub use error::{GatewayError, Result};
pub use http_client::ClientPool;
pub use recorder::LogRecorder;
pub use weights::WeightController;

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use catalog::Dialect;
use preparse::PreParsed;
use storage::Repository;

struct AppState {
    dispatcher: Dispatcher,
    repo: Arc<dyn Repository>,
    token: String,
}

/// Build the client-facing router.
///
/// The repository and the API token are passed in explicitly so tests can
/// substitute fakes; the dispatcher owns its own HTTP client pool.
pub fn router(repo: Arc<dyn Repository>, token: impl Into<String>) -> Router {
    let state = Arc::new(AppState {
        dispatcher: Dispatcher::new(repo.clone(), ClientPool::new()),
        repo,
        token: token.into(),
    });

    Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/responses", post(responses))
        .route("/v1/messages", post(messages_endpoint))
        .route("/v1/models", get(list_models))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn chat_completions(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    handle(state, Dialect::OpenAiChat, headers, body).await
}

async fn responses(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    handle(state, Dialect::OpenAiResponses, headers, body).await
}

async fn messages_endpoint(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    handle(state, Dialect::Anthropic, headers, body).await
}

async fn handle(state: Arc<AppState>, dialect: Dialect, headers: HeaderMap, body: Bytes) -> Response {
    if !authorized(dialect, &headers, &state.token) {
        return GatewayError::Unauthorized.into_response_for(dialect);
    }

    let pre = match PreParsed::parse(dialect, body) {
        Ok(pre) => pre,
        Err(error) => return error.into_response_for(dialect),
    };

    let ctx = RequestContext {
        dialect,
        user_agent: header_str(&headers, http::header::USER_AGENT.as_str()),
        remote_ip: client_ip(&headers),
    };

    log::debug!(
        "dispatching {dialect} request for model '{}' (stream: {})",
        pre.model,
        pre.stream
    );

    match state.dispatcher.dispatch(pre, ctx).await {
        Ok(response) => response,
        Err(error) => error.into_response_for(dialect),
    }
}

/// OpenAI-style endpoints authenticate with a bearer token, the Anthropic
/// endpoint with `x-api-key`. The model listing accepts either.
fn authorized(dialect: Dialect, headers: &HeaderMap, token: &str) -> bool {
    match dialect {
        Dialect::OpenAiChat | Dialect::OpenAiResponses => bearer_matches(headers, token),
        Dialect::Anthropic => api_key_matches(headers, token),
    }
}

fn bearer_matches(headers: &HeaderMap, token: &str) -> bool {
    headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|presented| presented == token)
}

fn api_key_matches(headers: &HeaderMap, token: &str) -> bool {
    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|presented| presented == token)
}

fn header_str(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn client_ip(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match forwarded {
        Some(ip) => ip.to_string(),
        None => header_str(headers, "x-real-ip"),
    }
}

#[derive(Serialize)]
struct ModelEntry {
    id: String,
    object: &'static str,
    created: u64,
    owned_by: &'static str,
}

#[derive(Serialize)]
struct ModelsResponse {
    object: &'static str,
    data: Vec<ModelEntry>,
}

/// Aggregate model listing across every registered model.
async fn list_models(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if !bearer_matches(&headers, &state.token) && !api_key_matches(&headers, &state.token) {
        return GatewayError::Unauthorized.into_response_for(Dialect::OpenAiChat);
    }

    let models = match state.repo.models().await {
        Ok(models) => models,
        Err(error) => return GatewayError::from(error).into_response_for(Dialect::OpenAiChat),
    };

    let data = models
        .into_iter()
        .map(|model| ModelEntry {
            id: model.name,
            object: "model",
            created: 0,
            owned_by: "relay",
        })
        .collect();

    Json(ModelsResponse {
        object: "list",
        data,
    })
    .into_response()
}

async fn healthz() -> Response {
    Json(serde_json::json!({"status": "ok"})).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                http::HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn bearer_auth_guards_openai_dialects() {
        let ok = headers(&[("authorization", "Bearer t0ken")]);
        let wrong = headers(&[("authorization", "Bearer nope")]);
        let missing = headers(&[]);

        assert!(authorized(Dialect::OpenAiChat, &ok, "t0ken"));
        assert!(authorized(Dialect::OpenAiResponses, &ok, "t0ken"));
        assert!(!authorized(Dialect::OpenAiChat, &wrong, "t0ken"));
        assert!(!authorized(Dialect::OpenAiChat, &missing, "t0ken"));
    }

    #[test]
    fn api_key_auth_guards_anthropic_dialect() {
        let ok = headers(&[("x-api-key", "t0ken")]);
        let bearer_only = headers(&[("authorization", "Bearer t0ken")]);

        assert!(authorized(Dialect::Anthropic, &ok, "t0ken"));
        assert!(!authorized(Dialect::Anthropic, &bearer_only, "t0ken"));
    }

    #[test]
    fn client_ip_prefers_forwarded_for() {
        let map = headers(&[("x-forwarded-for", "10.0.0.1, 10.0.0.2"), ("x-real-ip", "10.9.9.9")]);
        assert_eq!(client_ip(&map), "10.0.0.1");

        let map = headers(&[("x-real-ip", "10.9.9.9")]);
        assert_eq!(client_ip(&map), "10.9.9.9");
    }
}
