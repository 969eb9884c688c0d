//! Conversions from OpenAI Responses types to the unified representation.

use crate::messages::unified::from_openai::parse_arguments;
use crate::messages::{responses, unified};

impl From<responses::ResponsesRequest> for unified::UnifiedRequest {
    fn from(req: responses::ResponsesRequest) -> Self {
        let mut system = Vec::new();

        if let Some(instructions) = req.instructions {
            system.push(instructions);
        }

        let mut messages = Vec::new();

        match req.input {
            responses::Input::Text(text) => {
                if !text.is_empty() {
                    messages.push(unified::UnifiedMessage {
                        role: unified::UnifiedRole::User,
                        content: vec![unified::UnifiedContent::Text { text }],
                    });
                }
            }
            responses::Input::Items(items) => {
                for item in items {
                    convert_item(item, &mut system, &mut messages);
                }
            }
        }

        Self {
            model: req.model,
            system: unified::join_system(system),
            messages,
            tools: req
                .tools
                .map(|tools| tools.into_iter().map(unified::UnifiedTool::from).collect())
                .unwrap_or_default(),
            tool_choice: req.tool_choice.map(unified::UnifiedToolChoice::from),
            max_tokens: req.max_output_tokens.unwrap_or(0),
            temperature: req.temperature,
            top_p: req.top_p,
            stream: req.stream.unwrap_or(false),
        }
    }
}

fn convert_item(
    item: responses::InputItem,
    system: &mut Vec<String>,
    messages: &mut Vec<unified::UnifiedMessage>,
) {
    match item {
        responses::InputItem::FunctionCall {
            call_id, name, arguments, ..
        } => {
            messages.push(unified::UnifiedMessage {
                role: unified::UnifiedRole::Assistant,
                content: vec![unified::UnifiedContent::ToolUse {
                    id: call_id,
                    name,
                    input: parse_arguments(&arguments),
                }],
            });
        }
        responses::InputItem::FunctionCallOutput { call_id, output, .. } => {
            messages.push(unified::UnifiedMessage {
                role: unified::UnifiedRole::Tool,
                content: vec![unified::UnifiedContent::ToolResult {
                    tool_use_id: call_id,
                    content: output,
                    is_error: false,
                }],
            });
        }
        responses::InputItem::Message { role, content, .. } => {
            if role == "system" || role == "developer" {
                system.push(content_text(&content));
                return;
            }

            let unified_role = if role == "assistant" {
                unified::UnifiedRole::Assistant
            } else {
                unified::UnifiedRole::User
            };

            let blocks = match content {
                responses::InputContent::Text(text) => vec![unified::UnifiedContent::Text { text }],
                responses::InputContent::Parts(parts) => parts.into_iter().filter_map(convert_part).collect(),
            };

            if !blocks.is_empty() {
                messages.push(unified::UnifiedMessage {
                    role: unified_role,
                    content: blocks,
                });
            }
        }
    }
}

fn content_text(content: &responses::InputContent) -> String {
    match content {
        responses::InputContent::Text(text) => text.clone(),
        responses::InputContent::Parts(parts) => parts
            .iter()
            .filter_map(|part| match part {
                responses::InputPart::InputText { text } | responses::InputPart::OutputText { text } => {
                    Some(text.as_str())
                }
                responses::InputPart::InputImage { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn convert_part(part: responses::InputPart) -> Option<unified::UnifiedContent> {
    match part {
        responses::InputPart::InputText { text } | responses::InputPart::OutputText { text } => {
            Some(unified::UnifiedContent::Text { text })
        }
        responses::InputPart::InputImage { image_url } => Some(unified::UnifiedContent::Image {
            source: unified::UnifiedImageSource::Url { url: image_url? },
        }),
    }
}

impl From<responses::Tool> for unified::UnifiedTool {
    fn from(tool: responses::Tool) -> Self {
        Self {
            name: tool.name,
            description: tool.description.unwrap_or_default(),
            parameters: tool.parameters,
        }
    }
}

impl From<responses::ToolChoice> for unified::UnifiedToolChoice {
    fn from(choice: responses::ToolChoice) -> Self {
        match choice {
            responses::ToolChoice::Mode(mode) => match mode.as_str() {
                "none" => unified::UnifiedToolChoice::None,
                "required" => unified::UnifiedToolChoice::Required,
                _ => unified::UnifiedToolChoice::Auto,
            },
            responses::ToolChoice::Specific { name, .. } => unified::UnifiedToolChoice::Tool { name },
        }
    }
}

impl From<responses::Usage> for unified::UnifiedUsage {
    fn from(usage: responses::Usage) -> Self {
        Self {
            prompt_tokens: usage.input_tokens,
            completion_tokens: usage.output_tokens,
            total_tokens: usage.total_tokens,
            cached_tokens: usage.cached_tokens(),
        }
    }
}

impl From<responses::ResponsesResponse> for unified::UnifiedResponse {
    fn from(resp: responses::ResponsesResponse) -> Self {
        let mut content = Vec::new();
        let mut stop_reason = unified::UnifiedStopReason::EndTurn;

        if resp.status == "incomplete" {
            let reason = resp.incomplete_details.as_ref().map(|d| d.reason.as_str());
            stop_reason = match reason {
                Some("content_filter") => unified::UnifiedStopReason::ContentFilter,
                _ => unified::UnifiedStopReason::MaxTokens,
            };
        }

        for item in resp.output {
            match item {
                responses::OutputItem::Message { content: parts, .. } => {
                    for part in parts {
                        if let responses::OutputContent::OutputText { text, .. } = part {
                            content.push(unified::UnifiedContent::Text { text });
                        }
                    }
                }
                responses::OutputItem::FunctionCall {
                    call_id, name, arguments, ..
                } => {
                    stop_reason = unified::UnifiedStopReason::ToolUse;
                    content.push(unified::UnifiedContent::ToolUse {
                        id: call_id,
                        name,
                        input: parse_arguments(&arguments),
                    });
                }
            }
        }

        Self {
            id: resp.id,
            model: resp.model,
            content,
            stop_reason,
            usage: resp.usage.map(Into::into).unwrap_or_default(),
        }
    }
}
