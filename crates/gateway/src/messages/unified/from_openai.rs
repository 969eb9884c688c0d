//! Conversions from OpenAI Chat types to the unified representation.

use serde_json::Value;

use crate::messages::{openai, unified};

impl From<openai::ChatRequest> for unified::UnifiedRequest {
    fn from(req: openai::ChatRequest) -> Self {
        let mut system = Vec::new();
        let mut messages = Vec::with_capacity(req.messages.len());

        for msg in req.messages {
            match msg.role {
                openai::ChatRole::System | openai::ChatRole::Developer => {
                    if let Some(content) = msg.content {
                        system.push(content.text());
                    }
                }
                openai::ChatRole::Tool => {
                    messages.push(unified::UnifiedMessage {
                        role: unified::UnifiedRole::Tool,
                        content: vec![unified::UnifiedContent::ToolResult {
                            tool_use_id: msg.tool_call_id.unwrap_or_default(),
                            content: msg.content.map(|c| c.text()).unwrap_or_default(),
                            is_error: false,
                        }],
                    });
                }
                openai::ChatRole::User | openai::ChatRole::Assistant => {
                    messages.push(convert_message(msg));
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
            max_tokens: req.max_tokens.unwrap_or(0),
            temperature: req.temperature,
            top_p: req.top_p,
            stream: req.stream.unwrap_or(false),
        }
    }
}

fn convert_message(msg: openai::ChatMessage) -> unified::UnifiedMessage {
    let role = match msg.role {
        openai::ChatRole::Assistant => unified::UnifiedRole::Assistant,
        _ => unified::UnifiedRole::User,
    };

    let mut content = match msg.content {
        Some(openai::MessageContent::Text(text)) => vec![unified::UnifiedContent::Text { text }],
        Some(openai::MessageContent::Parts(parts)) => parts.into_iter().map(convert_part).collect(),
        None => Vec::new(),
    };

    for call in msg.tool_calls.unwrap_or_default() {
        content.push(unified::UnifiedContent::ToolUse {
            id: call.id,
            name: call.function.name,
            input: parse_arguments(&call.function.arguments),
        });
    }

    unified::UnifiedMessage { role, content }
}

fn convert_part(part: openai::ContentPart) -> unified::UnifiedContent {
    match part {
        openai::ContentPart::Text { text } => unified::UnifiedContent::Text { text },
        openai::ContentPart::ImageUrl { image_url } => unified::UnifiedContent::Image {
            source: unified::UnifiedImageSource::Url { url: image_url.url },
        },
    }
}

/// OpenAI carries tool arguments as a JSON string; tolerate fragments that
/// do not parse by wrapping them.
pub(crate) fn parse_arguments(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Object(serde_json::Map::new());
    }

    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

impl From<openai::Tool> for unified::UnifiedTool {
    fn from(tool: openai::Tool) -> Self {
        Self {
            name: tool.function.name,
            description: tool.function.description.unwrap_or_default(),
            parameters: tool.function.parameters,
        }
    }
}

impl From<openai::ToolChoice> for unified::UnifiedToolChoice {
    fn from(choice: openai::ToolChoice) -> Self {
        match choice {
            openai::ToolChoice::Mode(mode) => match mode.as_str() {
                "none" => unified::UnifiedToolChoice::None,
                "required" => unified::UnifiedToolChoice::Required,
                _ => unified::UnifiedToolChoice::Auto,
            },
            openai::ToolChoice::Specific { function, .. } => {
                unified::UnifiedToolChoice::Tool { name: function.name }
            }
        }
    }
}

impl From<openai::FinishReason> for unified::UnifiedStopReason {
    fn from(reason: openai::FinishReason) -> Self {
        match reason {
            openai::FinishReason::Stop => unified::UnifiedStopReason::EndTurn,
            openai::FinishReason::Length => unified::UnifiedStopReason::MaxTokens,
            openai::FinishReason::ToolCalls => unified::UnifiedStopReason::ToolUse,
            openai::FinishReason::ContentFilter => unified::UnifiedStopReason::ContentFilter,
            openai::FinishReason::Other(_) => unified::UnifiedStopReason::EndTurn,
        }
    }
}

impl From<openai::Usage> for unified::UnifiedUsage {
    fn from(usage: openai::Usage) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            cached_tokens: usage.cached_tokens(),
        }
    }
}

impl From<openai::ChatResponse> for unified::UnifiedResponse {
    fn from(resp: openai::ChatResponse) -> Self {
        let mut content = Vec::new();
        let mut stop_reason = unified::UnifiedStopReason::EndTurn;

        if let Some(choice) = resp.choices.into_iter().next() {
            if let Some(reason) = choice.finish_reason {
                stop_reason = reason.into();
            }

            let message = convert_message(choice.message);
            content = message.content;
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
