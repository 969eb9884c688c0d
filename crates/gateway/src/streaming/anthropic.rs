//! Anthropic Messages streaming codec.
//!
//! The Anthropic stream is a typed state machine (message_start, block
//! start/delta/stop, message_delta, message_stop); the writer reconstructs
//! that structure from the flat unified event sequence.

use std::collections::HashMap;

use serde_json::json;

use crate::messages::anthropic;
use crate::messages::unified::{UnifiedEvent, UnifiedUsage};

use super::Frame;

/// Parses upstream Anthropic SSE events into unified events.
#[derive(Default)]
pub(crate) struct MessagesReader {
    /// Anthropic block index to tool-call ordinal.
    tool_ordinals: HashMap<u32, u32>,
    next_tool: u32,
}

impl MessagesReader {
    pub(crate) fn push(&mut self, data: &str) -> Vec<UnifiedEvent> {
        let event: anthropic::StreamEvent = match serde_json::from_str(data) {
            Ok(event) => event,
            Err(e) => {
                log::warn!("skipping malformed Anthropic stream event: {e}");
                return Vec::new();
            }
        };

        match event {
            anthropic::StreamEvent::MessageStart { message } => vec![UnifiedEvent::Start {
                id: message.id,
                model: message.model,
                usage: message.usage.into(),
            }],
            anthropic::StreamEvent::ContentBlockStart { index, content_block } => match content_block {
                anthropic::ContentBlock::ToolUse { id, name, .. } => {
                    let ordinal = self.next_tool;
                    self.next_tool += 1;
                    self.tool_ordinals.insert(index, ordinal);

                    vec![UnifiedEvent::ToolCallStart {
                        index: ordinal,
                        id,
                        name,
                    }]
                }
                _ => Vec::new(),
            },
            anthropic::StreamEvent::ContentBlockDelta { index, delta } => match delta {
                anthropic::BlockDelta::TextDelta { text } => vec![UnifiedEvent::TextDelta { text }],
                anthropic::BlockDelta::InputJsonDelta { partial_json } => {
                    let Some(ordinal) = self.tool_ordinals.get(&index).copied() else {
                        log::warn!("input_json_delta for unknown content block {index}");
                        return Vec::new();
                    };

                    vec![UnifiedEvent::ToolCallDelta {
                        index: ordinal,
                        arguments: partial_json,
                    }]
                }
            },
            anthropic::StreamEvent::MessageDelta { delta, usage } => {
                let mut events = Vec::new();

                if let Some(reason) = delta.stop_reason {
                    events.push(UnifiedEvent::Finish {
                        stop_reason: reason.into(),
                    });
                }

                if let Some(usage) = usage {
                    events.push(UnifiedEvent::Usage { usage: usage.into() });
                }

                events
            }
            anthropic::StreamEvent::MessageStop => vec![UnifiedEvent::Done],
            anthropic::StreamEvent::Error { error } => {
                log::warn!("Anthropic stream error event: {} - {}", error.r#type, error.message);
                Vec::new()
            }
            anthropic::StreamEvent::ContentBlockStop { .. } | anthropic::StreamEvent::Ping => Vec::new(),
        }
    }
}

enum OpenBlock {
    Text,
    Tool,
}

/// Emits Anthropic SSE frames from unified events.
///
/// Tracks the currently open content block so deltas land in correctly
/// bracketed start/stop pairs.
pub(crate) struct MessagesWriter {
    id: String,
    model: String,
    started: bool,
    open_block: Option<OpenBlock>,
    next_block: u32,
    /// Unified tool-call ordinal to Anthropic block index.
    tool_blocks: HashMap<u32, u32>,
    start_usage: UnifiedUsage,
    stopped: bool,
}

impl MessagesWriter {
    pub(crate) fn new() -> Self {
        Self {
            id: format!("msg_{}", uuid::Uuid::new_v4().simple()),
            model: String::new(),
            started: false,
            open_block: None,
            next_block: 0,
            tool_blocks: HashMap::new(),
            start_usage: UnifiedUsage::default(),
            stopped: false,
        }
    }

    pub(crate) fn write(&mut self, event: UnifiedEvent) -> Vec<Frame> {
        match event {
            UnifiedEvent::Start { id, model, usage } => {
                self.id = id;
                self.model = model;
                self.start_usage = usage;
                self.start_frames()
            }
            UnifiedEvent::TextDelta { text } => {
                let mut frames = self.start_frames();

                if !matches!(self.open_block, Some(OpenBlock::Text)) {
                    frames.extend(self.close_block());
                    frames.push(self.frame(anthropic::StreamEvent::ContentBlockStart {
                        index: self.next_block,
                        content_block: anthropic::ContentBlock::Text { text: String::new() },
                    }));
                    self.open_block = Some(OpenBlock::Text);
                }

                frames.push(self.frame(anthropic::StreamEvent::ContentBlockDelta {
                    index: self.next_block,
                    delta: anthropic::BlockDelta::TextDelta { text },
                }));

                frames
            }
            UnifiedEvent::ToolCallStart { index, id, name } => {
                let mut frames = self.start_frames();
                frames.extend(self.close_block());

                self.tool_blocks.insert(index, self.next_block);
                self.open_block = Some(OpenBlock::Tool);

                frames.push(self.frame(anthropic::StreamEvent::ContentBlockStart {
                    index: self.next_block,
                    content_block: anthropic::ContentBlock::ToolUse {
                        id,
                        name,
                        input: json!({}),
                    },
                }));

                frames
            }
            UnifiedEvent::ToolCallDelta { index, arguments } => {
                let block = self.tool_blocks.get(&index).copied().unwrap_or(self.next_block);

                vec![self.frame(anthropic::StreamEvent::ContentBlockDelta {
                    index: block,
                    delta: anthropic::BlockDelta::InputJsonDelta {
                        partial_json: arguments,
                    },
                })]
            }
            UnifiedEvent::Finish { stop_reason } => {
                let mut frames = self.start_frames();
                frames.extend(self.close_block());

                frames.push(self.frame(anthropic::StreamEvent::MessageDelta {
                    delta: anthropic::MessageDelta {
                        stop_reason: Some(stop_reason.into()),
                        stop_sequence: None,
                    },
                    usage: None,
                }));

                frames
            }
            UnifiedEvent::Usage { usage } => {
                vec![self.frame(anthropic::StreamEvent::MessageDelta {
                    delta: anthropic::MessageDelta::default(),
                    usage: Some(usage.into()),
                })]
            }
            UnifiedEvent::Done => self.finish(),
        }
    }

    /// Terminator frames; idempotent.
    pub(crate) fn finish(&mut self) -> Vec<Frame> {
        if self.stopped {
            return Vec::new();
        }

        let mut frames = self.start_frames();
        frames.extend(self.close_block());
        frames.push(self.frame(anthropic::StreamEvent::MessageStop));
        self.stopped = true;

        frames
    }

    fn start_frames(&mut self) -> Vec<Frame> {
        if self.started {
            return Vec::new();
        }

        self.started = true;

        let message = anthropic::StartMessage {
            id: self.id.clone(),
            r#type: "message".to_string(),
            role: anthropic::Role::Assistant,
            model: self.model.clone(),
            content: Vec::new(),
            stop_reason: None,
            stop_sequence: None,
            usage: self.start_usage.into(),
        };

        vec![self.frame(anthropic::StreamEvent::MessageStart { message })]
    }

    fn close_block(&mut self) -> Option<Frame> {
        self.open_block.take().map(|_| {
            let frame = self.frame(anthropic::StreamEvent::ContentBlockStop { index: self.next_block });
            self.next_block += 1;
            frame
        })
    }

    fn frame(&self, event: anthropic::StreamEvent) -> Frame {
        Frame::with_event(
            event.event_name(),
            serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string()),
        )
    }
}
