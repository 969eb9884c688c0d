//! Mock Anthropic-style upstream (Messages path).

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use serde_json::{Value, json};

use super::{CapturedRequests, sse_body, start_server};

/// Builder for an Anthropic-dialect test upstream.
pub struct AnthropicMock {
    response_text: String,
    error: Option<(u16, String)>,
    stream_events: Option<Vec<(String, String)>>,
    abort_after: Option<usize>,
}

impl Default for AnthropicMock {
    fn default() -> Self {
        Self::new()
    }
}

impl AnthropicMock {
    pub fn new() -> Self {
        Self {
            response_text: "Hello from Claude mock!".to_string(),
            error: None,
            stream_events: None,
            abort_after: None,
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

    /// Stream the given `(event, data)` pairs verbatim.
    pub fn with_stream(mut self, events: Vec<(String, String)>) -> Self {
        self.stream_events = Some(events);
        self
    }

    /// Reset the connection after emitting `n` events.
    pub fn aborting_after(mut self, n: usize) -> Self {
        self.abort_after = Some(n);
        self
    }

    /// A plain three-delta text stream ending in `message_stop`.
    pub fn with_text_stream(self, deltas: &[&str]) -> Self {
        let mut events = vec![
            (
                "message_start".to_string(),
                json!({
                    "type": "message_start",
                    "message": {
                        "id": "msg_mock1", "type": "message", "role": "assistant",
                        "model": "claude-mock", "content": [],
                        "usage": {"input_tokens": 4, "output_tokens": 0}
                    }
                })
                .to_string(),
            ),
            (
                "content_block_start".to_string(),
                json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}})
                    .to_string(),
            ),
        ];

        for delta in deltas {
            events.push((
                "content_block_delta".to_string(),
                json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": delta}})
                    .to_string(),
            ));
        }

        events.push((
            "content_block_stop".to_string(),
            json!({"type": "content_block_stop", "index": 0}).to_string(),
        ));
        events.push((
            "message_delta".to_string(),
            json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 2}})
                .to_string(),
        ));
        events.push(("message_stop".to_string(), json!({"type": "message_stop"}).to_string()));

        self.with_stream(events)
    }

    pub async fn spawn(self) -> MockUpstream {
        let captured = CapturedRequests::default();

        let state = Arc::new(MockState {
            mock: self,
            captured: captured.clone(),
        });

        let app = Router::new().route("/v1/messages", post(messages)).with_state(state);
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
    mock: AnthropicMock,
    captured: CapturedRequests,
}

async fn messages(State(state): State<Arc<MockState>>, body: Bytes) -> Response {
    let request: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    state.captured.push(request.clone());

    if let Some((status, body)) = &state.mock.error {
        return (
            StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            [(http::header::CONTENT_TYPE, "application/json")],
            body.clone(),
        )
            .into_response();
    }

    if let Some(events) = &state.mock.stream_events {
        let frames: Vec<String> = events
            .iter()
            .map(|(event, data)| format!("event: {event}\ndata: {data}\n\n"))
            .collect();

        return sse_body(frames, state.mock.abort_after);
    }

    let model = request.get("model").and_then(Value::as_str).unwrap_or("claude-mock");

    axum::Json(json!({
        "id": "msg_mock1",
        "type": "message",
        "role": "assistant",
        "model": model,
        "content": [{"type": "text", "text": state.mock.response_text}],
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 8, "output_tokens": 6}
    }))
    .into_response()
}
