//! OpenAI Responses streaming codec.
//!
//! The Responses stream wraps deltas in item lifecycle events and closes
//! with a `response.completed` summary. The writer accumulates a copy of the
//! output for that summary; every delta is still forwarded as it arrives.

use std::collections::HashMap;

use crate::messages::responses;
use crate::messages::unified::{UnifiedEvent, UnifiedStopReason, UnifiedUsage};

use super::Frame;

/// Parses upstream Responses SSE events into unified events.
#[derive(Default)]
pub(crate) struct ResponsesReader {
    /// Output index to tool-call ordinal.
    tool_ordinals: HashMap<u32, u32>,
    next_tool: u32,
}

impl ResponsesReader {
    pub(crate) fn push(&mut self, data: &str) -> Vec<UnifiedEvent> {
        if data.trim() == "[DONE]" {
            return vec![UnifiedEvent::Done];
        }

        let event: responses::StreamEvent = match serde_json::from_str(data) {
            Ok(event) => event,
            Err(e) => {
                log::warn!("skipping malformed Responses stream event: {e}");
                return Vec::new();
            }
        };

        match event {
            responses::StreamEvent::Created { response } => vec![UnifiedEvent::Start {
                id: response.id,
                model: response.model,
                usage: UnifiedUsage::default(),
            }],
            responses::StreamEvent::OutputItemAdded { output_index, item } => match item {
                responses::OutputItem::FunctionCall {
                    call_id, name, arguments, ..
                } => {
                    let ordinal = self.next_tool;
                    self.next_tool += 1;
                    self.tool_ordinals.insert(output_index, ordinal);

                    let mut events = vec![UnifiedEvent::ToolCallStart {
                        index: ordinal,
                        id: call_id,
                        name,
                    }];

                    if !arguments.is_empty() {
                        events.push(UnifiedEvent::ToolCallDelta {
                            index: ordinal,
                            arguments,
                        });
                    }

                    events
                }
                responses::OutputItem::Message { .. } => Vec::new(),
            },
            responses::StreamEvent::OutputTextDelta { delta, .. } => {
                vec![UnifiedEvent::TextDelta { text: delta }]
            }
            responses::StreamEvent::FunctionCallArgumentsDelta { output_index, delta } => {
                let Some(ordinal) = self.tool_ordinals.get(&output_index).copied() else {
                    log::warn!("arguments delta for unknown output item {output_index}");
                    return Vec::new();
                };

                vec![UnifiedEvent::ToolCallDelta {
                    index: ordinal,
                    arguments: delta,
                }]
            }
            responses::StreamEvent::Completed { response } => finish_events(response, UnifiedStopReason::EndTurn),
            responses::StreamEvent::Incomplete { response } => finish_events(response, UnifiedStopReason::MaxTokens),
            responses::StreamEvent::OutputItemDone { .. } | responses::StreamEvent::Other(_) => Vec::new(),
        }
    }
}

fn finish_events(response: responses::ResponsesResponse, default_reason: UnifiedStopReason) -> Vec<UnifiedEvent> {
    let has_tool_call = response
        .output
        .iter()
        .any(|item| matches!(item, responses::OutputItem::FunctionCall { .. }));

    let stop_reason = if has_tool_call {
        UnifiedStopReason::ToolUse
    } else {
        default_reason
    };

    let mut events = vec![UnifiedEvent::Finish { stop_reason }];

    if let Some(usage) = response.usage {
        events.push(UnifiedEvent::Usage { usage: usage.into() });
    }

    events.push(UnifiedEvent::Done);
    events
}

struct ToolItem {
    call_id: String,
    name: String,
    arguments: String,
    output_index: u32,
}

/// Emits Responses SSE frames from unified events.
pub(crate) struct ResponsesWriter {
    id: String,
    model: String,
    created_at: u64,
    started: bool,
    message_index: Option<u32>,
    next_output: u32,
    text: String,
    /// Accumulated tool calls keyed by unified ordinal, for the summary.
    tools: HashMap<u32, ToolItem>,
    usage: Option<UnifiedUsage>,
    stop_reason: UnifiedStopReason,
    completed: bool,
}

impl ResponsesWriter {
    pub(crate) fn new() -> Self {
        Self {
            id: format!("resp_{}", uuid::Uuid::new_v4().simple()),
            model: String::new(),
            created_at: crate::messages::unified::to_openai::unix_timestamp(),
            started: false,
            message_index: None,
            next_output: 0,
            text: String::new(),
            tools: HashMap::new(),
            usage: None,
            stop_reason: UnifiedStopReason::EndTurn,
            completed: false,
        }
    }

    pub(crate) fn write(&mut self, event: UnifiedEvent) -> Vec<Frame> {
        match event {
            UnifiedEvent::Start { id, model, usage } => {
                self.id = id;
                self.model = model;

                if !usage.is_empty() {
                    let mut merged = self.usage.unwrap_or_default();
                    merged.merge(usage);
                    self.usage = Some(merged);
                }

                self.start_frames()
            }
            UnifiedEvent::TextDelta { text } => {
                let mut frames = self.start_frames();

                let index = match self.message_index {
                    Some(index) => index,
                    None => {
                        let index = self.next_output;
                        self.next_output += 1;
                        self.message_index = Some(index);

                        frames.push(frame(responses::StreamEvent::OutputItemAdded {
                            output_index: index,
                            item: responses::OutputItem::Message {
                                id: None,
                                role: "assistant".to_string(),
                                status: Some("in_progress".to_string()),
                                content: Vec::new(),
                            },
                        }));

                        index
                    }
                };

                self.text.push_str(&text);

                frames.push(frame(responses::StreamEvent::OutputTextDelta {
                    output_index: index,
                    content_index: 0,
                    delta: text,
                }));

                frames
            }
            UnifiedEvent::ToolCallStart { index, id, name } => {
                let mut frames = self.start_frames();

                let output_index = self.next_output;
                self.next_output += 1;

                frames.push(frame(responses::StreamEvent::OutputItemAdded {
                    output_index,
                    item: responses::OutputItem::FunctionCall {
                        id: None,
                        call_id: id.clone(),
                        name: name.clone(),
                        arguments: String::new(),
                        status: Some("in_progress".to_string()),
                    },
                }));

                self.tools.insert(
                    index,
                    ToolItem {
                        call_id: id,
                        name,
                        arguments: String::new(),
                        output_index,
                    },
                );

                frames
            }
            UnifiedEvent::ToolCallDelta { index, arguments } => {
                let Some(tool) = self.tools.get_mut(&index) else {
                    return Vec::new();
                };

                tool.arguments.push_str(&arguments);
                let output_index = tool.output_index;

                vec![frame(responses::StreamEvent::FunctionCallArgumentsDelta {
                    output_index,
                    delta: arguments,
                })]
            }
            UnifiedEvent::Finish { stop_reason } => {
                self.stop_reason = stop_reason;
                Vec::new()
            }
            UnifiedEvent::Usage { usage } => {
                let mut merged = self.usage.unwrap_or_default();
                merged.merge(usage);
                self.usage = Some(merged);
                Vec::new()
            }
            UnifiedEvent::Done => self.finish(),
        }
    }

    /// Terminator frames; idempotent.
    pub(crate) fn finish(&mut self) -> Vec<Frame> {
        if self.completed {
            return Vec::new();
        }

        self.completed = true;

        let mut frames = self.start_frames();
        let summary = self.summary();

        let event = if summary.status == "incomplete" {
            responses::StreamEvent::Incomplete { response: summary }
        } else {
            responses::StreamEvent::Completed { response: summary }
        };

        frames.push(frame(event));
        frames
    }

    fn start_frames(&mut self) -> Vec<Frame> {
        if self.started {
            return Vec::new();
        }

        self.started = true;

        let mut response = self.summary();
        response.status = "in_progress".to_string();
        response.output = Vec::new();
        response.incomplete_details = None;
        response.usage = None;

        vec![frame(responses::StreamEvent::Created { response })]
    }

    fn summary(&self) -> responses::ResponsesResponse {
        let mut output = Vec::new();

        if !self.text.is_empty() {
            output.push(responses::OutputItem::Message {
                id: None,
                role: "assistant".to_string(),
                status: Some("completed".to_string()),
                content: vec![responses::OutputContent::OutputText {
                    text: self.text.clone(),
                    annotations: Vec::new(),
                }],
            });
        }

        let mut tools: Vec<&ToolItem> = self.tools.values().collect();
        tools.sort_by_key(|t| t.output_index);

        for tool in tools {
            output.push(responses::OutputItem::FunctionCall {
                id: None,
                call_id: tool.call_id.clone(),
                name: tool.name.clone(),
                arguments: tool.arguments.clone(),
                status: Some("completed".to_string()),
            });
        }

        let status = match self.stop_reason {
            UnifiedStopReason::MaxTokens => "incomplete",
            _ => "completed",
        };

        responses::ResponsesResponse {
            id: self.id.clone(),
            object: "response".to_string(),
            created_at: self.created_at,
            status: status.to_string(),
            model: self.model.clone(),
            output,
            incomplete_details: (status == "incomplete").then(|| responses::IncompleteDetails {
                reason: "max_output_tokens".to_string(),
            }),
            usage: self.usage.map(Into::into),
        }
    }
}

fn frame(event: responses::StreamEvent) -> Frame {
    let name = event.event_name().to_string();

    Frame::with_event_owned(
        name,
        serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string()),
    )
}
