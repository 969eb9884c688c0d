//! Conversions from the unified representation to OpenAI Chat types.

use crate::messages::{openai, unified};

impl From<unified::UnifiedRequest> for openai::ChatRequest {
    fn from(req: unified::UnifiedRequest) -> Self {
        let mut messages = Vec::with_capacity(req.messages.len() + 1);

        if !req.system.is_empty() {
            messages.push(openai::ChatMessage {
                role: openai::ChatRole::System,
                content: Some(openai::MessageContent::Text(req.system)),
                tool_calls: None,
                tool_call_id: None,
            });
        }

        for msg in req.messages {
            convert_message(msg, &mut messages);
        }

        let tools = if req.tools.is_empty() {
            None
        } else {
            Some(req.tools.into_iter().map(openai::Tool::from).collect())
        };

        Self {
            model: req.model,
            messages,
            max_tokens: (req.max_tokens > 0).then_some(req.max_tokens),
            temperature: req.temperature,
            top_p: req.top_p,
            stream: req.stream.then_some(true),
            tools,
            tool_choice: req.tool_choice.map(openai::ToolChoice::from),
            response_format: None,
        }
    }
}

/// Tool results become dedicated `tool` role messages; everything else folds
/// into a single message for the role.
fn convert_message(msg: unified::UnifiedMessage, out: &mut Vec<openai::ChatMessage>) {
    let role = match msg.role {
        unified::UnifiedRole::Assistant => openai::ChatRole::Assistant,
        unified::UnifiedRole::User | unified::UnifiedRole::Tool => openai::ChatRole::User,
    };

    let mut parts = Vec::new();
    let mut tool_calls = Vec::new();

    for block in msg.content {
        match block {
            unified::UnifiedContent::Text { text } => {
                parts.push(openai::ContentPart::Text { text });
            }
            unified::UnifiedContent::Image { source } => {
                let url = match source {
                    unified::UnifiedImageSource::Url { url } => url,
                    unified::UnifiedImageSource::Base64 { media_type, data } => {
                        format!("data:{media_type};base64,{data}")
                    }
                };

                parts.push(openai::ContentPart::ImageUrl {
                    image_url: openai::ImageUrl { url },
                });
            }
            unified::UnifiedContent::ToolUse { id, name, input } => {
                tool_calls.push(openai::ToolCall {
                    id,
                    r#type: "function".to_string(),
                    function: openai::FunctionCall {
                        name,
                        arguments: serde_json::to_string(&input).unwrap_or_else(|_| "{}".to_string()),
                    },
                });
            }
            unified::UnifiedContent::ToolResult {
                tool_use_id, content, ..
            } => {
                out.push(openai::ChatMessage {
                    role: openai::ChatRole::Tool,
                    content: Some(openai::MessageContent::Text(content)),
                    tool_calls: None,
                    tool_call_id: Some(tool_use_id),
                });
            }
        }
    }

    if parts.is_empty() && tool_calls.is_empty() {
        return;
    }

    // Collapse a single text part back to the plain string form.
    let content = match parts.as_slice() {
        [] => None,
        [openai::ContentPart::Text { text }] => Some(openai::MessageContent::Text(text.clone())),
        _ => Some(openai::MessageContent::Parts(parts)),
    };

    out.push(openai::ChatMessage {
        role,
        content,
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        tool_call_id: None,
    });
}

impl From<unified::UnifiedTool> for openai::Tool {
    fn from(tool: unified::UnifiedTool) -> Self {
        Self {
            r#type: "function".to_string(),
            function: openai::FunctionDef {
                name: tool.name,
                description: (!tool.description.is_empty()).then_some(tool.description),
                parameters: tool.parameters,
            },
        }
    }
}

impl From<unified::UnifiedToolChoice> for openai::ToolChoice {
    fn from(choice: unified::UnifiedToolChoice) -> Self {
        match choice {
            unified::UnifiedToolChoice::Auto => openai::ToolChoice::Mode("auto".to_string()),
            unified::UnifiedToolChoice::None => openai::ToolChoice::Mode("none".to_string()),
            unified::UnifiedToolChoice::Required => openai::ToolChoice::Mode("required".to_string()),
            unified::UnifiedToolChoice::Tool { name } => openai::ToolChoice::Specific {
                r#type: "function".to_string(),
                function: openai::FunctionChoice { name },
            },
        }
    }
}

impl From<unified::UnifiedStopReason> for openai::FinishReason {
    fn from(reason: unified::UnifiedStopReason) -> Self {
        match reason {
            unified::UnifiedStopReason::EndTurn | unified::UnifiedStopReason::StopSequence => {
                openai::FinishReason::Stop
            }
            unified::UnifiedStopReason::MaxTokens => openai::FinishReason::Length,
            unified::UnifiedStopReason::ToolUse => openai::FinishReason::ToolCalls,
            unified::UnifiedStopReason::ContentFilter => openai::FinishReason::ContentFilter,
        }
    }
}

impl From<unified::UnifiedUsage> for openai::Usage {
    fn from(usage: unified::UnifiedUsage) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            prompt_tokens_details: (usage.cached_tokens > 0).then_some(openai::PromptTokensDetails {
                cached_tokens: usage.cached_tokens,
            }),
        }
    }
}

impl From<unified::UnifiedResponse> for openai::ChatResponse {
    fn from(resp: unified::UnifiedResponse) -> Self {
        let mut text = Vec::new();
        let mut tool_calls = Vec::new();

        for block in resp.content {
            match block {
                unified::UnifiedContent::Text { text: t } => text.push(t),
                unified::UnifiedContent::ToolUse { id, name, input } => {
                    tool_calls.push(openai::ToolCall {
                        id,
                        r#type: "function".to_string(),
                        function: openai::FunctionCall {
                            name,
                            arguments: serde_json::to_string(&input).unwrap_or_else(|_| "{}".to_string()),
                        },
                    });
                }
                _ => {}
            }
        }

        let message = openai::ChatMessage {
            role: openai::ChatRole::Assistant,
            content: (!text.is_empty()).then(|| openai::MessageContent::Text(text.join(""))),
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            tool_call_id: None,
        };

        Self {
            id: resp.id,
            object: "chat.completion".to_string(),
            created: unix_timestamp(),
            model: resp.model,
            choices: vec![openai::ChatChoice {
                index: 0,
                message,
                finish_reason: Some(resp.stop_reason.into()),
            }],
            usage: Some(resp.usage.into()),
        }
    }
}

pub(crate) fn unix_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
