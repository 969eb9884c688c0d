//! OpenAI Chat streaming codec: SSE chunks to unified events and back.

use crate::messages::openai;
use crate::messages::unified::{UnifiedEvent, UnifiedUsage};

use super::Frame;

/// Parses upstream `chat.completion.chunk` events into unified events.
#[derive(Default)]
pub(crate) struct ChatReader {
    started: bool,
}

impl ChatReader {
    pub(crate) fn push(&mut self, data: &str) -> Vec<UnifiedEvent> {
        if data.trim() == "[DONE]" {
            return vec![UnifiedEvent::Done];
        }

        let chunk: openai::ChatChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                log::warn!("skipping malformed OpenAI stream chunk: {e}");
                return Vec::new();
            }
        };

        let mut events = Vec::new();

        if !self.started {
            self.started = true;
            events.push(UnifiedEvent::Start {
                id: chunk.id.clone(),
                model: chunk.model.clone(),
                usage: UnifiedUsage::default(),
            });
        }

        for choice in &chunk.choices {
            if let Some(text) = &choice.delta.content
                && !text.is_empty()
            {
                events.push(UnifiedEvent::TextDelta { text: text.clone() });
            }

            for call in choice.delta.tool_calls.as_deref().unwrap_or_default() {
                let name = call.function.as_ref().and_then(|f| f.name.clone());
                let arguments = call.function.as_ref().and_then(|f| f.arguments.clone());

                if let Some(id) = &call.id {
                    events.push(UnifiedEvent::ToolCallStart {
                        index: call.index,
                        id: id.clone(),
                        name: name.unwrap_or_default(),
                    });

                    if let Some(arguments) = arguments.filter(|a| !a.is_empty()) {
                        events.push(UnifiedEvent::ToolCallDelta {
                            index: call.index,
                            arguments,
                        });
                    }
                } else if let Some(arguments) = arguments.filter(|a| !a.is_empty()) {
                    events.push(UnifiedEvent::ToolCallDelta {
                        index: call.index,
                        arguments,
                    });
                }
            }

            if let Some(reason) = &choice.finish_reason {
                events.push(UnifiedEvent::Finish {
                    stop_reason: reason.clone().into(),
                });
            }
        }

        if let Some(usage) = chunk.usage {
            events.push(UnifiedEvent::Usage { usage: usage.into() });
        }

        events
    }
}

/// Emits `chat.completion.chunk` SSE frames from unified events.
pub(crate) struct ChatWriter {
    id: String,
    model: String,
    created: u64,
    sent_role: bool,
    sent_done: bool,
}

impl ChatWriter {
    pub(crate) fn new() -> Self {
        Self {
            id: format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
            model: String::new(),
            created: crate::messages::unified::to_openai::unix_timestamp(),
            sent_role: false,
            sent_done: false,
        }
    }

    pub(crate) fn write(&mut self, event: UnifiedEvent) -> Vec<Frame> {
        match event {
            UnifiedEvent::Start { id, model, .. } => {
                self.id = id;
                self.model = model;

                vec![self.chunk_frame(
                    vec![openai::ChunkChoice {
                        index: 0,
                        delta: openai::ChunkDelta {
                            role: Some(openai::ChatRole::Assistant),
                            ..Default::default()
                        },
                        finish_reason: None,
                    }],
                    None,
                )]
            }
            UnifiedEvent::TextDelta { text } => {
                let mut frames = self.role_preamble();

                frames.push(self.chunk_frame(
                    vec![openai::ChunkChoice {
                        index: 0,
                        delta: openai::ChunkDelta {
                            content: Some(text),
                            ..Default::default()
                        },
                        finish_reason: None,
                    }],
                    None,
                ));

                frames
            }
            UnifiedEvent::ToolCallStart { index, id, name } => {
                let mut frames = self.role_preamble();

                frames.push(self.tool_chunk(openai::ChunkToolCall {
                    index,
                    id: Some(id),
                    r#type: Some("function".to_string()),
                    function: Some(openai::ChunkFunction {
                        name: Some(name),
                        arguments: Some(String::new()),
                    }),
                }));

                frames
            }
            UnifiedEvent::ToolCallDelta { index, arguments } => {
                vec![self.tool_chunk(openai::ChunkToolCall {
                    index,
                    id: None,
                    r#type: None,
                    function: Some(openai::ChunkFunction {
                        name: None,
                        arguments: Some(arguments),
                    }),
                })]
            }
            UnifiedEvent::Finish { stop_reason } => {
                vec![self.chunk_frame(
                    vec![openai::ChunkChoice {
                        index: 0,
                        delta: openai::ChunkDelta::default(),
                        finish_reason: Some(stop_reason.into()),
                    }],
                    None,
                )]
            }
            UnifiedEvent::Usage { usage } => vec![self.chunk_frame(Vec::new(), Some(usage.into()))],
            UnifiedEvent::Done => self.finish(),
        }
    }

    /// Terminator frames; idempotent.
    pub(crate) fn finish(&mut self) -> Vec<Frame> {
        if self.sent_done {
            return Vec::new();
        }

        self.sent_done = true;
        vec![Frame::data("[DONE]".to_string())]
    }

    /// OpenAI clients expect the assistant role before any delta.
    fn role_preamble(&mut self) -> Vec<Frame> {
        if self.sent_role {
            return Vec::new();
        }

        vec![self.chunk_frame(
            vec![openai::ChunkChoice {
                index: 0,
                delta: openai::ChunkDelta {
                    role: Some(openai::ChatRole::Assistant),
                    ..Default::default()
                },
                finish_reason: None,
            }],
            None,
        )]
    }

    fn tool_chunk(&mut self, call: openai::ChunkToolCall) -> Frame {
        self.chunk_frame(
            vec![openai::ChunkChoice {
                index: 0,
                delta: openai::ChunkDelta {
                    tool_calls: Some(vec![call]),
                    ..Default::default()
                },
                finish_reason: None,
            }],
            None,
        )
    }

    fn chunk_frame(&mut self, choices: Vec<openai::ChunkChoice>, usage: Option<openai::Usage>) -> Frame {
        if choices.iter().any(|c| c.delta.role.is_some()) {
            self.sent_role = true;
        }

        let chunk = openai::ChatChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices,
            usage,
        };

        Frame::data(serde_json::to_string(&chunk).unwrap_or_else(|_| "{}".to_string()))
    }
}
