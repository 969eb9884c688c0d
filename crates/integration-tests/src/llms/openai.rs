//! Mock OpenAI-style upstream (Chat Completions and Responses paths).

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use serde_json::{Value, json};

use super::{CapturedRequests, sse_body, start_server};

/// Builder for an OpenAI-dialect test upstream.
pub struct OpenAiMock {
    response_text: String,
    error: Option<(u16, String)>,
    stream_payloads: Option<Vec<String>>,
    abort_after: Option<usize>,
    delay: Option<Duration>,
}

impl Default for OpenAiMock {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenAiMock {
    pub fn new() -> Self {
        Self {
            response_text: "Hello from the mock!".to_string(),
            error: None,
            stream_payloads: None,
            abort_after: None,
            delay: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.response_text = text.into();
        self
    }

    pub fn with_error(mut self, status: u16, body: impl Into<String>) -> Self {
        self.error = Some((status, body.into()));
        self
    }

    /// Stream the given `data:` payloads, then `[DONE]`.
    pub fn with_stream(mut self, payloads: Vec<String>) -> Self {
        self.stream_payloads = Some(payloads);
        self
    }

    /// Reset the connection after emitting `n` stream payloads.
    pub fn aborting_after(mut self, n: usize) -> Self {
        self.abort_after = Some(n);
        self
    }

    /// Sleep before answering, to trip response-header timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn spawn(self) -> MockUpstream {
        let captured = CapturedRequests::default();

        let state = Arc::new(MockState {
            mock: self,
            captured: captured.clone(),
        });

        let app = Router::new()
            .route("/v1/chat/completions", post(chat_completions))
            .route("/v1/responses", post(responses))
            .with_state(state);

        let url = start_server(app).await;

        MockUpstream {
            base_url: format!("{url}/v1"),
            captured,
        }
    }
}

pub struct MockUpstream {
    pub base_url: String,
    pub captured: CapturedRequests,
}

struct MockState {
    mock: OpenAiMock,
    captured: CapturedRequests,
}

async fn chat_completions(State(state): State<Arc<MockState>>, body: Bytes) -> Response {
    respond(&state, &body, false).await
}

async fn responses(State(state): State<Arc<MockState>>, body: Bytes) -> Response {
    respond(&state, &body, true).await
}

async fn respond(state: &MockState, body: &[u8], responses_path: bool) -> Response {
    let request: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
    state.captured.push(request.clone());

    if let Some(delay) = state.mock.delay {
        tokio::time::sleep(delay).await;
    }

    if let Some((status, body)) = &state.mock.error {
        return (
            StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            [(http::header::CONTENT_TYPE, "application/json")],
            body.clone(),
        )
            .into_response();
    }

    if let Some(payloads) = &state.mock.stream_payloads {
        let mut frames: Vec<String> = payloads.iter().map(|p| format!("data: {p}\n\n")).collect();

        if state.mock.abort_after.is_none() {
            frames.push("data: [DONE]\n\n".to_string());
        }

        return sse_body(frames, state.mock.abort_after);
    }

    let model = request.get("model").and_then(Value::as_str).unwrap_or("mock-model");

    let response = if responses_path {
        json!({
            "id": "resp_mock1",
            "object": "response",
            "created_at": 1700000000,
            "status": "completed",
            "model": model,
            "output": [{
                "type": "message",
                "role": "assistant",
                "status": "completed",
                "content": [{"type": "output_text", "text": state.mock.response_text, "annotations": []}]
            }],
            "usage": {"input_tokens": 9, "output_tokens": 12, "total_tokens": 21}
        })
    } else {
        json!({
            "id": "chatcmpl-mock1",
            "object": "chat.completion",
            "created": 1700000000,
            "model": model,
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": state.mock.response_text},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 9, "completion_tokens": 12, "total_tokens": 21}
        })
    };

    axum::Json(response).into_response()
}
