//! Conversions from the unified representation to OpenAI Responses types.

use crate::messages::unified::to_openai::unix_timestamp;
use crate::messages::{responses, unified};

impl From<unified::UnifiedRequest> for responses::ResponsesRequest {
    fn from(req: unified::UnifiedRequest) -> Self {
        let mut items = Vec::with_capacity(req.messages.len());

        for msg in req.messages {
            convert_message(msg, &mut items);
        }

        let tools = if req.tools.is_empty() {
            None
        } else {
            Some(req.tools.into_iter().map(responses::Tool::from).collect())
        };

        Self {
            model: req.model,
            input: responses::Input::Items(items),
            instructions: (!req.system.is_empty()).then_some(req.system),
            max_output_tokens: (req.max_tokens > 0).then_some(req.max_tokens),
            temperature: req.temperature,
            top_p: req.top_p,
            stream: req.stream.then_some(true),
            tools,
            tool_choice: req.tool_choice.map(responses::ToolChoice::from),
            text: None,
        }
    }
}

fn convert_message(msg: unified::UnifiedMessage, items: &mut Vec<responses::InputItem>) {
    let role = match msg.role {
        unified::UnifiedRole::Assistant => "assistant",
        unified::UnifiedRole::User | unified::UnifiedRole::Tool => "user",
    };

    let mut parts = Vec::new();

    for block in msg.content {
        match block {
            unified::UnifiedContent::Text { text } => {
                if role == "assistant" {
                    parts.push(responses::InputPart::OutputText { text });
                } else {
                    parts.push(responses::InputPart::InputText { text });
                }
            }
            unified::UnifiedContent::Image { source } => {
                let url = match source {
                    unified::UnifiedImageSource::Url { url } => url,
                    unified::UnifiedImageSource::Base64 { media_type, data } => {
                        format!("data:{media_type};base64,{data}")
                    }
                };

                parts.push(responses::InputPart::InputImage { image_url: Some(url) });
            }
            unified::UnifiedContent::ToolUse { id, name, input } => {
                items.push(responses::InputItem::FunctionCall {
                    r#type: "function_call".to_string(),
                    call_id: id,
                    name,
                    arguments: serde_json::to_string(&input).unwrap_or_else(|_| "{}".to_string()),
                });
            }
            unified::UnifiedContent::ToolResult {
                tool_use_id, content, ..
            } => {
                items.push(responses::InputItem::FunctionCallOutput {
                    r#type: "function_call_output".to_string(),
                    call_id: tool_use_id,
                    output: content,
                });
            }
        }
    }

    if parts.is_empty() {
        return;
    }

    // A lone text part folds back into the plain string form.
    let content = match parts.as_slice() {
        [responses::InputPart::InputText { text }] => responses::InputContent::Text(text.clone()),
        _ => responses::InputContent::Parts(parts),
    };

    items.push(responses::InputItem::Message {
        r#type: None,
        role: role.to_string(),
        content,
    });
}

impl From<unified::UnifiedTool> for responses::Tool {
    fn from(tool: unified::UnifiedTool) -> Self {
        Self {
            r#type: "function".to_string(),
            name: tool.name,
            description: (!tool.description.is_empty()).then_some(tool.description),
            parameters: tool.parameters,
        }
    }
}

impl From<unified::UnifiedToolChoice> for responses::ToolChoice {
    fn from(choice: unified::UnifiedToolChoice) -> Self {
        match choice {
            unified::UnifiedToolChoice::Auto => responses::ToolChoice::Mode("auto".to_string()),
            unified::UnifiedToolChoice::None => responses::ToolChoice::Mode("none".to_string()),
            unified::UnifiedToolChoice::Required => responses::ToolChoice::Mode("required".to_string()),
            unified::UnifiedToolChoice::Tool { name } => responses::ToolChoice::Specific {
                r#type: "function".to_string(),
                name,
            },
        }
    }
}

impl From<unified::UnifiedUsage> for responses::Usage {
    fn from(usage: unified::UnifiedUsage) -> Self {
        Self {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            input_tokens_details: (usage.cached_tokens > 0).then_some(responses::InputTokensDetails {
                cached_tokens: usage.cached_tokens,
            }),
        }
    }
}

impl From<unified::UnifiedResponse> for responses::ResponsesResponse {
    fn from(resp: unified::UnifiedResponse) -> Self {
        let mut output = Vec::new();
        let mut text_parts = Vec::new();

        for block in resp.content {
            match block {
                unified::UnifiedContent::Text { text } => {
                    text_parts.push(responses::OutputContent::OutputText {
                        text,
                        annotations: Vec::new(),
                    });
                }
                unified::UnifiedContent::ToolUse { id, name, input } => {
                    output.push(responses::OutputItem::FunctionCall {
                        id: None,
                        call_id: id,
                        name,
                        arguments: serde_json::to_string(&input).unwrap_or_else(|_| "{}".to_string()),
                        status: Some("completed".to_string()),
                    });
                }
                _ => {}
            }
        }

        if !text_parts.is_empty() {
            output.insert(
                0,
                responses::OutputItem::Message {
                    id: None,
                    role: "assistant".to_string(),
                    status: Some("completed".to_string()),
                    content: text_parts,
                },
            );
        }

        let status = match resp.stop_reason {
            unified::UnifiedStopReason::MaxTokens => "incomplete",
            _ => "completed",
        };

        Self {
            id: resp.id,
            object: "response".to_string(),
            created_at: unix_timestamp(),
            status: status.to_string(),
            model: resp.model,
            output,
            incomplete_details: (status == "incomplete").then(|| responses::IncompleteDetails {
                reason: "max_output_tokens".to_string(),
            }),
            usage: Some(resp.usage.into()),
        }
    }
}
