//! Mock upstream LLM servers the gateway is tested against.

pub mod anthropic;
pub mod openai;

use std::io;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::{Body, Bytes};
use axum::response::{IntoResponse, Response};
use serde_json::Value;

/// Bodies a mock upstream has received, in arrival order.
#[derive(Clone, Default)]
pub struct CapturedRequests {
    inner: Arc<Mutex<Vec<Value>>>,
}

impl CapturedRequests {
    pub(crate) fn push(&self, value: Value) {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).push(value);
    }

    pub fn all(&self) -> Vec<Value> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn last(&self) -> Option<Value> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).last().cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Serve `app` on an ephemeral port, returning the base URL.
pub(crate) async fn start_server(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind mock upstream");

    let addr = listener.local_addr().expect("mock upstream has no local addr");

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    format!("http://{addr}")
}

/// An SSE response streaming `frames` one by one; optionally errors out
/// after `abort_after` frames to simulate a dropped upstream connection.
pub(crate) fn sse_body(frames: Vec<String>, abort_after: Option<usize>) -> Response {
    let items: Vec<Result<Bytes, io::Error>> = match abort_after {
        Some(n) => frames
            .into_iter()
            .take(n)
            .map(|f| Ok(Bytes::from(f)))
            .chain(std::iter::once(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "upstream reset",
            ))))
            .collect(),
        None => frames.into_iter().map(|f| Ok(Bytes::from(f))).collect(),
    };

    let body = Body::from_stream(futures::stream::iter(items));

    (
        [
            (http::header::CONTENT_TYPE, "text/event-stream"),
            (http::header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}
