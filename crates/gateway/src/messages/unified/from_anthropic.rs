//! Conversions from Anthropic Messages types to the unified representation.

use crate::messages::{anthropic, unified};

impl From<anthropic::MessagesRequest> for unified::UnifiedRequest {
    fn from(req: anthropic::MessagesRequest) -> Self {
        let mut messages = Vec::with_capacity(req.messages.len());

        for msg in req.messages {
            convert_message(msg, &mut messages);
        }

        Self {
            model: req.model,
            system: req.system.map(|s| s.text()).unwrap_or_default(),
            messages,
            tools: req
                .tools
                .map(|tools| tools.into_iter().map(unified::UnifiedTool::from).collect())
                .unwrap_or_default(),
            tool_choice: req.tool_choice.map(unified::UnifiedToolChoice::from),
            max_tokens: req.max_tokens,
            temperature: req.temperature,
            top_p: req.top_p,
            stream: req.stream.unwrap_or(false),
        }
    }
}

/// Tool results embedded in user messages split out into dedicated
/// tool-role messages so the OpenAI emitters can address them.
fn convert_message(msg: anthropic::Message, out: &mut Vec<unified::UnifiedMessage>) {
    let role = match msg.role {
        anthropic::Role::User => unified::UnifiedRole::User,
        anthropic::Role::Assistant => unified::UnifiedRole::Assistant,
    };

    let blocks = match msg.content {
        anthropic::MessageContent::Text(text) => {
            out.push(unified::UnifiedMessage {
                role,
                content: vec![unified::UnifiedContent::Text { text }],
            });
            return;
        }
        anthropic::MessageContent::Blocks(blocks) => blocks,
    };

    let mut content = Vec::new();

    for block in blocks {
        match block {
            anthropic::ContentBlock::ToolResult {
                tool_use_id,
                content: result,
                is_error,
            } => {
                out.push(unified::UnifiedMessage {
                    role: unified::UnifiedRole::Tool,
                    content: vec![unified::UnifiedContent::ToolResult {
                        tool_use_id,
                        content: result.map(|c| c.text()).unwrap_or_default(),
                        is_error: is_error.unwrap_or(false),
                    }],
                });
            }
            other => content.push(convert_block(other)),
        }
    }

    if !content.is_empty() {
        out.push(unified::UnifiedMessage { role, content });
    }
}

fn convert_block(block: anthropic::ContentBlock) -> unified::UnifiedContent {
    match block {
        anthropic::ContentBlock::Text { text } => unified::UnifiedContent::Text { text },
        anthropic::ContentBlock::Image { source } => unified::UnifiedContent::Image {
            source: source.into(),
        },
        anthropic::ContentBlock::ToolUse { id, name, input } => {
            unified::UnifiedContent::ToolUse { id, name, input }
        }
        // Handled by the caller; kept total for completeness.
        anthropic::ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => unified::UnifiedContent::ToolResult {
            tool_use_id,
            content: content.map(|c| c.text()).unwrap_or_default(),
            is_error: is_error.unwrap_or(false),
        },
    }
}

impl From<anthropic::ImageSource> for unified::UnifiedImageSource {
    fn from(source: anthropic::ImageSource) -> Self {
        match source {
            anthropic::ImageSource::Base64 { media_type, data } => {
                unified::UnifiedImageSource::Base64 { media_type, data }
            }
            anthropic::ImageSource::Url { url } => unified::UnifiedImageSource::Url { url },
        }
    }
}

impl From<anthropic::Tool> for unified::UnifiedTool {
    fn from(tool: anthropic::Tool) -> Self {
        Self {
            name: tool.name,
            description: tool.description.unwrap_or_default(),
            parameters: tool.input_schema,
        }
    }
}

impl From<anthropic::ToolChoice> for unified::UnifiedToolChoice {
    fn from(choice: anthropic::ToolChoice) -> Self {
        match choice {
            anthropic::ToolChoice::Auto => unified::UnifiedToolChoice::Auto,
            anthropic::ToolChoice::Any => unified::UnifiedToolChoice::Required,
            anthropic::ToolChoice::Tool { name } => unified::UnifiedToolChoice::Tool { name },
            anthropic::ToolChoice::None => unified::UnifiedToolChoice::None,
        }
    }
}

impl From<anthropic::StopReason> for unified::UnifiedStopReason {
    fn from(reason: anthropic::StopReason) -> Self {
        match reason {
            anthropic::StopReason::EndTurn => unified::UnifiedStopReason::EndTurn,
            anthropic::StopReason::MaxTokens => unified::UnifiedStopReason::MaxTokens,
            anthropic::StopReason::StopSequence => unified::UnifiedStopReason::StopSequence,
            anthropic::StopReason::ToolUse => unified::UnifiedStopReason::ToolUse,
            anthropic::StopReason::Refusal => unified::UnifiedStopReason::ContentFilter,
            anthropic::StopReason::Other(other) => {
                log::warn!("unknown Anthropic stop reason: {other}");
                unified::UnifiedStopReason::EndTurn
            }
        }
    }
}

impl From<anthropic::Usage> for unified::UnifiedUsage {
    fn from(usage: anthropic::Usage) -> Self {
        Self {
            prompt_tokens: usage.input_tokens,
            completion_tokens: usage.output_tokens,
            total_tokens: usage.input_tokens + usage.output_tokens,
            cached_tokens: usage.cache_read_input_tokens.unwrap_or(0),
        }
    }
}

impl From<anthropic::MessagesResponse> for unified::UnifiedResponse {
    fn from(resp: anthropic::MessagesResponse) -> Self {
        Self {
            id: resp.id,
            model: resp.model,
            content: resp.content.into_iter().map(convert_block).collect(),
            stop_reason: resp
                .stop_reason
                .map(Into::into)
                .unwrap_or(unified::UnifiedStopReason::EndTurn),
            usage: resp.usage.into(),
        }
    }
}
