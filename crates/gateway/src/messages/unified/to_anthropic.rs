//! Conversions from the unified representation to Anthropic Messages types.

use crate::messages::{anthropic, unified};

/// Emitted when neither the client nor the unified request carries a limit.
/// Anthropic rejects requests without `max_tokens`.
pub(crate) const DEFAULT_MAX_TOKENS: u64 = 8192;

impl From<unified::UnifiedRequest> for anthropic::MessagesRequest {
    fn from(req: unified::UnifiedRequest) -> Self {
        let messages = req.messages.into_iter().map(anthropic::Message::from).collect();

        let tools = if req.tools.is_empty() {
            None
        } else {
            Some(req.tools.into_iter().map(anthropic::Tool::from).collect())
        };

        Self {
            model: req.model,
            max_tokens: if req.max_tokens > 0 {
                req.max_tokens
            } else {
                DEFAULT_MAX_TOKENS
            },
            system: (!req.system.is_empty()).then(|| anthropic::SystemPrompt::Text(req.system)),
            messages,
            temperature: req.temperature,
            top_p: req.top_p,
            stream: req.stream.then_some(true),
            tools,
            tool_choice: req.tool_choice.map(anthropic::ToolChoice::from),
        }
    }
}

impl From<unified::UnifiedMessage> for anthropic::Message {
    fn from(msg: unified::UnifiedMessage) -> Self {
        // Tool results flow back inside user messages.
        let role = match msg.role {
            unified::UnifiedRole::Assistant => anthropic::Role::Assistant,
            unified::UnifiedRole::User | unified::UnifiedRole::Tool => anthropic::Role::User,
        };

        let blocks: Vec<anthropic::ContentBlock> =
            msg.content.into_iter().map(anthropic::ContentBlock::from).collect();

        // Collapse a lone text block to the compact string form.
        let content = match blocks.as_slice() {
            [anthropic::ContentBlock::Text { text }] => anthropic::MessageContent::Text(text.clone()),
            _ => anthropic::MessageContent::Blocks(blocks),
        };

        Self { role, content }
    }
}

impl From<unified::UnifiedContent> for anthropic::ContentBlock {
    fn from(content: unified::UnifiedContent) -> Self {
        match content {
            unified::UnifiedContent::Text { text } => anthropic::ContentBlock::Text { text },
            unified::UnifiedContent::Image { source } => anthropic::ContentBlock::Image {
                source: source.into(),
            },
            unified::UnifiedContent::ToolUse { id, name, input } => {
                anthropic::ContentBlock::ToolUse { id, name, input }
            }
            unified::UnifiedContent::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => anthropic::ContentBlock::ToolResult {
                tool_use_id,
                content: (!content.is_empty()).then_some(anthropic::ToolResultContent::Text(content)),
                is_error: is_error.then_some(true),
            },
        }
    }
}

impl From<unified::UnifiedImageSource> for anthropic::ImageSource {
    fn from(source: unified::UnifiedImageSource) -> Self {
        match source {
            unified::UnifiedImageSource::Base64 { media_type, data } => {
                anthropic::ImageSource::Base64 { media_type, data }
            }
            unified::UnifiedImageSource::Url { url } => anthropic::ImageSource::Url { url },
        }
    }
}

impl From<unified::UnifiedTool> for anthropic::Tool {
    fn from(tool: unified::UnifiedTool) -> Self {
        Self {
            name: tool.name,
            description: (!tool.description.is_empty()).then_some(tool.description),
            input_schema: tool.parameters,
        }
    }
}

impl From<unified::UnifiedToolChoice> for anthropic::ToolChoice {
    fn from(choice: unified::UnifiedToolChoice) -> Self {
        match choice {
            unified::UnifiedToolChoice::Auto => anthropic::ToolChoice::Auto,
            unified::UnifiedToolChoice::None => anthropic::ToolChoice::None,
            unified::UnifiedToolChoice::Required => anthropic::ToolChoice::Any,
            unified::UnifiedToolChoice::Tool { name } => anthropic::ToolChoice::Tool { name },
        }
    }
}

impl From<unified::UnifiedStopReason> for anthropic::StopReason {
    fn from(reason: unified::UnifiedStopReason) -> Self {
        match reason {
            unified::UnifiedStopReason::EndTurn => anthropic::StopReason::EndTurn,
            unified::UnifiedStopReason::MaxTokens => anthropic::StopReason::MaxTokens,
            unified::UnifiedStopReason::StopSequence => anthropic::StopReason::StopSequence,
            unified::UnifiedStopReason::ToolUse => anthropic::StopReason::ToolUse,
            unified::UnifiedStopReason::ContentFilter => anthropic::StopReason::Refusal,
        }
    }
}

impl From<unified::UnifiedUsage> for anthropic::Usage {
    fn from(usage: unified::UnifiedUsage) -> Self {
        Self {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            cache_read_input_tokens: (usage.cached_tokens > 0).then_some(usage.cached_tokens),
        }
    }
}

impl From<unified::UnifiedResponse> for anthropic::MessagesResponse {
    fn from(resp: unified::UnifiedResponse) -> Self {
        let content = resp
            .content
            .into_iter()
            .filter(|block| {
                matches!(
                    block,
                    unified::UnifiedContent::Text { .. } | unified::UnifiedContent::ToolUse { .. }
                )
            })
            .map(anthropic::ContentBlock::from)
            .collect();

        Self {
            id: resp.id,
            r#type: "message".to_string(),
            role: anthropic::Role::Assistant,
            model: resp.model,
            content,
            stop_reason: Some(resp.stop_reason.into()),
            stop_sequence: None,
            usage: resp.usage.into(),
        }
    }
}
