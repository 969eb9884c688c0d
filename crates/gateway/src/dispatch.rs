//! The dispatch loop: candidate iteration, upstream calls, streaming
//! hand-off, per-attempt logging.
//!
//! Retry is strictly pre-commit. Once a byte of the response has been handed
//! to the client the attempt is final; a later upstream failure truncates
//! the stream and is only recorded.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::response::Response;
use futures::StreamExt;
use futures::channel::mpsc;
use http::header::{CACHE_CONTROL, CONTENT_TYPE};
use serde_json::Value;

use crate::adapter::ProviderAdapter;
use crate::catalog::{AttemptStatus, Binding, ChatLogRecord, Dialect, Model, Provider};
use crate::error::GatewayError;
use crate::http_client::ClientPool;
use crate::preparse::PreParsed;
use crate::recorder::LogRecorder;
use crate::selector;
use crate::storage::Repository;
use crate::streaming::{self, StreamOutcome};
use crate::weights::WeightController;

const DEFAULT_HEADER_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-request metadata recorded with every attempt.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub dialect: Dialect,
    pub user_agent: String,
    pub remote_ip: String,
}

pub struct Dispatcher {
    repo: Arc<dyn Repository>,
    clients: ClientPool,
    weights: WeightController,
    recorder: LogRecorder,
}

impl Dispatcher {
    /// The client pool is passed in rather than reached through a global so
    /// tests can substitute their own.
    pub fn new(repo: Arc<dyn Repository>, clients: ClientPool) -> Self {
        Self {
            clients,
            weights: WeightController::new(repo.clone()),
            recorder: LogRecorder::new(repo.clone()),
            repo,
        }
    }

    pub fn weights(&self) -> &WeightController {
        &self.weights
    }

    /// Run one client request to completion.
    pub async fn dispatch(&self, pre: PreParsed, ctx: RequestContext) -> Result<Response, GatewayError> {
        let accepted = Instant::now();
        let settings = self.repo.settings().await?;

        let model = self
            .repo
            .model_by_name(&pre.model)
            .await?
            .ok_or_else(|| GatewayError::ModelNotFound(pre.model.clone()))?;

        let bindings = self.repo.bindings_for_model(model.id).await?;

        let candidates = selector::order_candidates(
            bindings,
            pre.required,
            &settings,
            model.max_retry,
            &mut rand::rng(),
        )?;

        let mut last_error = None;

        for (attempt, binding) in candidates.into_iter().enumerate() {
            let attempt = attempt as u32;

            let Some(provider) = self.repo.provider(binding.provider_id).await? else {
                log::warn!(
                    "binding {} references missing provider {}; skipping",
                    binding.id,
                    binding.provider_id
                );
                continue;
            };

            match self
                .attempt(&pre, &ctx, &model, &binding, &provider, attempt, accepted)
                .await
            {
                Ok(response) => return Ok(response),
                Err(error) => {
                    if error.is_retryable() {
                        log::warn!(
                            "attempt {attempt} via {}/{} failed: {error}",
                            provider.name,
                            binding.provider_model
                        );
                    } else {
                        log::error!(
                            "attempt {attempt} via {}/{} failed: {error}",
                            provider.name,
                            binding.provider_model
                        );
                    }

                    let record = failure_record(&pre, &ctx, &binding, &provider, attempt, accepted, &error);
                    self.recorder.record(record).await;
                    self.weights.on_failure(&binding, &settings).await;

                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or(GatewayError::NoCandidate))
    }

    /// One upstream attempt. Any `Err` here is pre-commit and retryable by
    /// the caller; once this returns `Ok` the response is committed.
    #[allow(clippy::too_many_arguments)]
    async fn attempt(
        &self,
        pre: &PreParsed,
        ctx: &RequestContext,
        model: &Model,
        binding: &Binding,
        provider: &Provider,
        attempt: u32,
        accepted: Instant,
    ) -> Result<Response, GatewayError> {
        let body = build_attempt_body(pre, ctx.dialect, provider.dialect, &binding.provider_model)?;

        let timeout = if model.header_timeout_ms == 0 {
            DEFAULT_HEADER_TIMEOUT
        } else {
            Duration::from_millis(model.header_timeout_ms)
        };

        let client = self.clients.for_provider(provider, timeout)?;
        let adapter = ProviderAdapter::new(provider, client);
        let overlay = binding.with_header.then_some(&binding.custom_headers);
        let request = adapter.build_request(body, overlay)?;

        // The response-header timeout covers exactly the send: connect,
        // request write, and the wait for upstream headers.
        let response = match tokio::time::timeout(timeout, request.send()).await {
            Err(_) => return Err(GatewayError::UpstreamTimeout(timeout.as_millis() as u64)),
            Ok(Err(e)) => return Err(GatewayError::Connection(e.to_string())),
            Ok(Ok(response)) => response,
        };

        let status = response.status();

        if status.as_u16() >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let responded = Instant::now();

        if is_event_stream(&response) {
            Ok(self.stream_response(response, pre, ctx, model, binding, provider, attempt, accepted, responded))
        } else {
            self.buffered_response(response, pre, ctx, model, binding, provider, attempt, accepted, responded)
                .await
        }
    }

    /// Streaming path: hand the upstream body to a transcoder task and
    /// return a channel-backed body immediately. The channel closes exactly
    /// when the task finishes, so the client sees EOF when transcoding ends.
    #[allow(clippy::too_many_arguments)]
    fn stream_response(
        &self,
        response: reqwest::Response,
        pre: &PreParsed,
        ctx: &RequestContext,
        model: &Model,
        binding: &Binding,
        provider: &Provider,
        attempt: u32,
        accepted: Instant,
        responded: Instant,
    ) -> Response {
        let (mut tx, rx) = mpsc::channel::<axum::body::Bytes>(32);

        let recorder = self.recorder.clone();
        let client_dialect = ctx.dialect;
        let provider_dialect = provider.dialect;
        let io_log = model.io_log;
        let input_text = pre.input_text.clone();
        let mut record = base_record(pre, ctx, binding, provider, attempt);

        tokio::spawn(async move {
            let upstream = response.bytes_stream();

            let outcome = if client_dialect == provider_dialect {
                streaming::copy_sse(upstream, provider_dialect, &mut tx).await
            } else {
                streaming::transcode_sse(upstream, provider_dialect, client_dialect, &mut tx).await
            };

            drop(tx);

            finish_record(&mut record, &outcome, accepted, responded);
            recorder.record_with_io(record, io_log, &input_text, &outcome.output_text).await;
        });

        let body = Body::from_stream(rx.map(Ok::<_, Infallible>));

        Response::builder()
            .status(http::StatusCode::OK)
            .header(CONTENT_TYPE, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .header("x-accel-buffering", "no")
            .body(body)
            .unwrap_or_else(|_| Response::new(Body::empty()))
    }

    /// Non-streaming path: read the whole upstream body, transcode when the
    /// dialects differ, log, reply.
    #[allow(clippy::too_many_arguments)]
    async fn buffered_response(
        &self,
        response: reqwest::Response,
        pre: &PreParsed,
        ctx: &RequestContext,
        model: &Model,
        binding: &Binding,
        provider: &Provider,
        attempt: u32,
        accepted: Instant,
        responded: Instant,
    ) -> Result<Response, GatewayError> {
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/json")
            .to_string();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Connection(format!("failed to read upstream body: {e}")))?;

        let (client_body, usage, output_text) = if ctx.dialect == provider.dialect {
            // Verbatim passthrough; usage is picked out best-effort.
            let (usage, text) = match provider.dialect.response_to_unified(&bytes) {
                Ok(unified) => (unified.usage, response_text(&unified.content)),
                Err(_) => (Default::default(), String::new()),
            };

            (bytes.to_vec(), usage, text)
        } else {
            let mut unified = provider.dialect.response_to_unified(&bytes)?;
            unified.model = pre.model.clone();

            let usage = unified.usage;
            let text = response_text(&unified.content);

            (ctx.dialect.response_from_unified(unified)?, usage, text)
        };

        let done = Instant::now();

        let mut record = base_record(pre, ctx, binding, provider, attempt);
        record.status = AttemptStatus::Success;
        record.proxy_time_ms = elapsed_ms(accepted, done);
        record.first_chunk_time_ms = elapsed_ms(responded, done);
        record.prompt_tokens = usage.prompt_tokens;
        record.completion_tokens = usage.completion_tokens;
        record.total_tokens = usage.total_tokens;
        record.cached_tokens = usage.cached_tokens;

        self.recorder
            .record_with_io(record, model.io_log, &pre.input_text, &output_text)
            .await;

        Response::builder()
            .status(http::StatusCode::OK)
            .header(CONTENT_TYPE, content_type)
            .body(Body::from(client_body))
            .map_err(|e| GatewayError::Internal(format!("failed to build response: {e}")))
    }
}

/// Inject the provider-side model name, transcoding first when the dialects
/// differ. The client body itself is never mutated.
fn build_attempt_body(
    pre: &PreParsed,
    client: Dialect,
    provider: Dialect,
    provider_model: &str,
) -> Result<Vec<u8>, GatewayError> {
    let mut value: Value = if client == provider {
        serde_json::from_slice(&pre.body)
            .map_err(|e| GatewayError::BadRequest(format!("body is not valid JSON: {e}")))?
    } else {
        let unified = client.request_to_unified(&pre.body)?;
        provider.request_from_unified(unified)?
    };

    if let Value::Object(obj) = &mut value {
        obj.insert("model".to_string(), Value::String(provider_model.to_string()));
    }

    serde_json::to_vec(&value).map_err(|e| GatewayError::Internal(format!("failed to serialize body: {e}")))
}

fn is_event_stream(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/event-stream"))
}

fn base_record(
    pre: &PreParsed,
    ctx: &RequestContext,
    binding: &Binding,
    provider: &Provider,
    attempt: u32,
) -> ChatLogRecord {
    ChatLogRecord {
        created_at: jiff::Timestamp::now(),
        model_name: pre.model.clone(),
        provider_model: binding.provider_model.clone(),
        provider_name: provider.name.clone(),
        status: AttemptStatus::Error,
        dialect: ctx.dialect,
        user_agent: ctx.user_agent.clone(),
        remote_ip: ctx.remote_ip.clone(),
        retry: attempt,
        error: None,
        proxy_time_ms: 0,
        first_chunk_time_ms: 0,
        chunk_time_ms: 0,
        tps: 0.0,
        prompt_tokens: 0,
        completion_tokens: 0,
        total_tokens: 0,
        cached_tokens: 0,
    }
}

fn failure_record(
    pre: &PreParsed,
    ctx: &RequestContext,
    binding: &Binding,
    provider: &Provider,
    attempt: u32,
    accepted: Instant,
    error: &GatewayError,
) -> ChatLogRecord {
    let mut record = base_record(pre, ctx, binding, provider, attempt);
    record.error = Some(error.to_string());
    record.proxy_time_ms = elapsed_ms(accepted, Instant::now());
    record
}

/// Fill a streaming attempt's record from the pump outcome.
fn finish_record(record: &mut ChatLogRecord, outcome: &StreamOutcome, accepted: Instant, responded: Instant) {
    let ended = outcome.last_byte.unwrap_or_else(Instant::now);

    record.proxy_time_ms = elapsed_ms(accepted, ended);

    if let Some(first) = outcome.first_byte {
        record.first_chunk_time_ms = elapsed_ms(responded, first);
        record.chunk_time_ms = elapsed_ms(first, ended);
    }

    record.prompt_tokens = outcome.usage.prompt_tokens;
    record.completion_tokens = outcome.usage.completion_tokens;
    record.total_tokens = outcome.usage.total_tokens;
    record.cached_tokens = outcome.usage.cached_tokens;

    if record.chunk_time_ms > 0 && record.completion_tokens > 0 {
        record.tps = record.completion_tokens as f64 / (record.chunk_time_ms as f64 / 1000.0);
    }

    if outcome.cancelled {
        record.status = AttemptStatus::Error;
        record.error = Some("cancelled: client disconnected mid-stream".to_string());
    } else if let Some(error) = &outcome.upstream_error {
        record.status = AttemptStatus::Error;
        record.error = Some(error.clone());
    } else {
        record.status = AttemptStatus::Success;
        record.error = None;
    }
}

fn elapsed_ms(from: Instant, to: Instant) -> u64 {
    to.saturating_duration_since(from).as_millis() as u64
}

fn response_text(content: &[crate::messages::unified::UnifiedContent]) -> String {
    content
        .iter()
        .filter_map(|block| match block {
            crate::messages::unified::UnifiedContent::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_injection_preserves_unknown_fields() {
        let pre = PreParsed::parse(
            Dialect::OpenAiChat,
            axum::body::Bytes::from_static(
                br#"{"model":"public","messages":[{"role":"user","content":"hi"}],"seed":42}"#,
            ),
        )
        .unwrap();

        let body = build_attempt_body(&pre, Dialect::OpenAiChat, Dialect::OpenAiChat, "upstream-m").unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(value["model"], "upstream-m");
        assert_eq!(value["seed"], 42);
        assert_eq!(value["messages"][0]["content"], "hi");
    }

    #[test]
    fn cross_dialect_body_gets_model_overwritten_after_transcode() {
        let pre = PreParsed::parse(
            Dialect::OpenAiChat,
            axum::body::Bytes::from_static(
                br#"{"model":"public","messages":[{"role":"system","content":"S"},{"role":"user","content":"hi"}]}"#,
            ),
        )
        .unwrap();

        let body = build_attempt_body(&pre, Dialect::OpenAiChat, Dialect::Anthropic, "claude-x").unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(value["model"], "claude-x");
        assert_eq!(value["system"], "S");
        assert_eq!(value["max_tokens"], 8192);
        assert_eq!(value["messages"].as_array().unwrap().len(), 1);
    }
}
