//! Streaming transcoder.
//!
//! The pump reads line-delimited SSE events from the upstream body, feeds
//! each through the provider-dialect reader to get unified events, hands
//! those to the client-dialect writer, and sends every produced frame down
//! the channel immediately. The only state between events is the per-dialect
//! parser itself; no part of the response is held back.

mod anthropic;
mod openai;
mod responses;

use std::borrow::Cow;
use std::time::Instant;

use axum::body::Bytes;
use eventsource_stream::Eventsource;
use futures::channel::mpsc;
use futures::{SinkExt, Stream, StreamExt};

use crate::catalog::Dialect;
use crate::messages::unified::{UnifiedEvent, UnifiedUsage};

/// One SSE frame, ready for the wire.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Frame {
    event: Option<Cow<'static, str>>,
    data: String,
}

impl Frame {
    fn data(data: String) -> Self {
        Self { event: None, data }
    }

    fn with_event(event: &'static str, data: String) -> Self {
        Self {
            event: Some(Cow::Borrowed(event)),
            data,
        }
    }

    fn with_event_owned(event: String, data: String) -> Self {
        Self {
            event: Some(Cow::Owned(event)),
            data,
        }
    }

    pub(crate) fn to_bytes(&self) -> Bytes {
        let mut out = String::with_capacity(self.data.len() + 32);

        if let Some(event) = &self.event {
            out.push_str("event: ");
            out.push_str(event);
            out.push('\n');
        }

        out.push_str("data: ");
        out.push_str(&self.data);
        out.push_str("\n\n");

        Bytes::from(out)
    }

    #[cfg(test)]
    pub(crate) fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.data).unwrap_or(serde_json::Value::Null)
    }
}

/// Provider-dialect SSE parser producing unified events.
///
/// Dialect codecs are a closed set, so this is a tagged variant rather than
/// a trait object.
pub(crate) enum EventReader {
    OpenAiChat(openai::ChatReader),
    Responses(responses::ResponsesReader),
    Anthropic(anthropic::MessagesReader),
}

impl EventReader {
    pub(crate) fn new(dialect: Dialect) -> Self {
        match dialect {
            Dialect::OpenAiChat => EventReader::OpenAiChat(openai::ChatReader::default()),
            Dialect::OpenAiResponses => EventReader::Responses(responses::ResponsesReader::default()),
            Dialect::Anthropic => EventReader::Anthropic(anthropic::MessagesReader::default()),
        }
    }

    /// Map one upstream event payload to zero or more unified events.
    pub(crate) fn push(&mut self, data: &str) -> Vec<UnifiedEvent> {
        match self {
            EventReader::OpenAiChat(reader) => reader.push(data),
            EventReader::Responses(reader) => reader.push(data),
            EventReader::Anthropic(reader) => reader.push(data),
        }
    }
}

/// Client-dialect frame emitter.
pub(crate) enum EventWriter {
    OpenAiChat(openai::ChatWriter),
    Responses(responses::ResponsesWriter),
    Anthropic(anthropic::MessagesWriter),
}

impl EventWriter {
    pub(crate) fn new(dialect: Dialect) -> Self {
        match dialect {
            Dialect::OpenAiChat => EventWriter::OpenAiChat(openai::ChatWriter::new()),
            Dialect::OpenAiResponses => EventWriter::Responses(responses::ResponsesWriter::new()),
            Dialect::Anthropic => EventWriter::Anthropic(anthropic::MessagesWriter::new()),
        }
    }

    pub(crate) fn write(&mut self, event: UnifiedEvent) -> Vec<Frame> {
        match self {
            EventWriter::OpenAiChat(writer) => writer.write(event),
            EventWriter::Responses(writer) => writer.write(event),
            EventWriter::Anthropic(writer) => writer.write(event),
        }
    }

    /// The dialect's stream terminator, emitted at upstream EOF.
    pub(crate) fn finish(&mut self) -> Vec<Frame> {
        match self {
            EventWriter::OpenAiChat(writer) => writer.finish(),
            EventWriter::Responses(writer) => writer.finish(),
            EventWriter::Anthropic(writer) => writer.finish(),
        }
    }
}

/// What the pump learned while the body streamed, for the attempt log.
#[derive(Default)]
pub(crate) struct StreamOutcome {
    pub usage: UnifiedUsage,
    pub output_text: String,
    pub first_byte: Option<Instant>,
    pub last_byte: Option<Instant>,
    /// Upstream failed mid-stream; the client saw a truncated body.
    pub upstream_error: Option<String>,
    /// The client went away; the upstream body was dropped.
    pub cancelled: bool,
}

impl StreamOutcome {
    fn observe(&mut self, event: &UnifiedEvent) {
        match event {
            UnifiedEvent::Start { usage, .. } | UnifiedEvent::Usage { usage } => {
                self.usage.merge(*usage);
            }
            UnifiedEvent::TextDelta { text } => self.output_text.push_str(text),
            _ => {}
        }
    }

    fn mark_sent(&mut self) {
        let now = Instant::now();
        self.first_byte.get_or_insert(now);
        self.last_byte = Some(now);
    }
}

/// Transcode an upstream SSE body into client-dialect frames.
///
/// Frames go out as soon as their source event is parsed. On clean upstream
/// EOF the client terminator is emitted; on upstream error the channel is
/// dropped mid-stream and the client sees a truncated body.
pub(crate) async fn transcode_sse<S, E>(
    upstream: S,
    provider_dialect: Dialect,
    client_dialect: Dialect,
    tx: &mut mpsc::Sender<Bytes>,
) -> StreamOutcome
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let mut reader = EventReader::new(provider_dialect);
    let mut writer = EventWriter::new(client_dialect);
    let mut outcome = StreamOutcome::default();

    let mut events = Box::pin(upstream.eventsource());

    while let Some(item) = events.next().await {
        let event = match item {
            Ok(event) => event,
            Err(e) => {
                outcome.upstream_error = Some(format!("upstream stream failed: {e}"));
                return outcome;
            }
        };

        for unified in reader.push(&event.data) {
            outcome.observe(&unified);

            for frame in writer.write(unified) {
                if tx.send(frame.to_bytes()).await.is_err() {
                    outcome.cancelled = true;
                    return outcome;
                }

                outcome.mark_sent();
            }
        }
    }

    for frame in writer.finish() {
        if tx.send(frame.to_bytes()).await.is_err() {
            outcome.cancelled = true;
            return outcome;
        }

        outcome.mark_sent();
    }

    outcome
}

/// Forward an upstream SSE body byte for byte, scanning events on the side
/// for token usage and captured output.
pub(crate) async fn copy_sse<S, E>(upstream: S, dialect: Dialect, tx: &mut mpsc::Sender<Bytes>) -> StreamOutcome
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let mut scan = UsageScan::new(dialect);
    let mut outcome = StreamOutcome::default();

    let mut upstream = Box::pin(upstream);

    while let Some(item) = upstream.next().await {
        let chunk = match item {
            Ok(chunk) => chunk,
            Err(e) => {
                outcome.upstream_error = Some(format!("upstream stream failed: {e}"));
                break;
            }
        };

        scan.feed(&chunk, &mut outcome);

        if tx.send(chunk).await.is_err() {
            outcome.cancelled = true;
            return outcome;
        }

        outcome.mark_sent();
    }

    outcome
}

/// Line-level scanner over a passthrough SSE body.
///
/// The body is forwarded untouched; this only inspects complete `data:`
/// lines to pick up usage counts and response text for the attempt log.
pub(crate) struct UsageScan {
    reader: EventReader,
    pending: Vec<u8>,
}

impl UsageScan {
    pub(crate) fn new(dialect: Dialect) -> Self {
        Self {
            reader: EventReader::new(dialect),
            pending: Vec::new(),
        }
    }

    pub(crate) fn feed(&mut self, chunk: &[u8], outcome: &mut StreamOutcome) {
        self.pending.extend_from_slice(chunk);

        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let Ok(line) = std::str::from_utf8(&line) else {
                continue;
            };

            let line = line.trim();

            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };

            for event in self.reader.push(data.trim_start()) {
                outcome.observe(&event);
            }
        }
    }
}
