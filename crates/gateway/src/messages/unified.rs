//! Dialect-neutral intermediate representation.
//!
//! Every cross-dialect conversion goes through these types:
//!
//! ```text
//! client body → UnifiedRequest → provider body
//! provider response → UnifiedResponse → client response
//! provider SSE event → UnifiedEvent* → client SSE frames
//! ```
//!
//! The IR never carries the `model` field decision: codecs preserve whatever
//! the client sent and the dispatcher overwrites it with the binding's
//! provider-side name afterwards.

use serde_json::Value;

pub(crate) mod from_anthropic;
pub(crate) mod from_openai;
pub(crate) mod from_responses;
pub(crate) mod to_anthropic;
pub(crate) mod to_openai;
pub(crate) mod to_responses;

/// A chat request, reduced to what all three dialects can express.
#[derive(Debug, Clone, PartialEq)]
pub struct UnifiedRequest {
    pub model: String,

    /// Concatenated system instructions. Empty when the request has none.
    ///
    /// Dialects place this differently: OpenAI Chat as a leading `system`
    /// message, Responses in `instructions`, Anthropic in the dedicated
    /// `system` field.
    pub system: String,

    pub messages: Vec<UnifiedMessage>,

    pub tools: Vec<UnifiedTool>,
    pub tool_choice: Option<UnifiedToolChoice>,

    /// 0 when the client did not set a limit. Anthropic requires a value;
    /// its codec substitutes a default on emission.
    pub max_tokens: u64,

    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub stream: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnifiedMessage {
    pub role: UnifiedRole,
    pub content: Vec<UnifiedContent>,
}

/// System never appears here: it is extracted into [`UnifiedRequest::system`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnifiedRole {
    User,
    Assistant,
    /// A tool execution result flowing back to the model.
    Tool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnifiedContent {
    Text {
        text: String,
    },
    Image {
        source: UnifiedImageSource,
    },
    /// The assistant requesting a tool invocation.
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    /// Output of a tool invocation, correlated by `tool_use_id`.
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnifiedImageSource {
    Url { url: String },
    Base64 { media_type: String, data: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnifiedTool {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool arguments.
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnifiedToolChoice {
    Auto,
    None,
    Required,
    Tool { name: String },
}

/// A complete (non-streaming) completion.
#[derive(Debug, Clone, PartialEq)]
pub struct UnifiedResponse {
    pub id: String,
    pub model: String,
    /// Text and tool-use blocks, in generation order.
    pub content: Vec<UnifiedContent>,
    pub stop_reason: UnifiedStopReason,
    pub usage: UnifiedUsage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnifiedStopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    ToolUse,
    ContentFilter,
}

/// Token counts as reported by the upstream. Missing counts stay zero; the
/// gateway never synthesizes them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnifiedUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cached_tokens: u64,
}

impl UnifiedUsage {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Overlay counts from a later event; zero fields keep earlier values.
    pub fn merge(&mut self, other: UnifiedUsage) {
        if other.prompt_tokens > 0 {
            self.prompt_tokens = other.prompt_tokens;
        }
        if other.completion_tokens > 0 {
            self.completion_tokens = other.completion_tokens;
        }
        if other.cached_tokens > 0 {
            self.cached_tokens = other.cached_tokens;
        }
        self.total_tokens = (self.prompt_tokens + self.completion_tokens).max(other.total_tokens);
    }
}

/// One incremental streaming update, the unit the stream transcoder moves
/// between dialects. A single provider event may map to zero or several of
/// these; none of them ever waits for a later provider event.
#[derive(Debug, Clone, PartialEq)]
pub enum UnifiedEvent {
    /// Message metadata from the first provider event.
    Start {
        id: String,
        model: String,
        usage: UnifiedUsage,
    },
    TextDelta {
        text: String,
    },
    /// A tool call opening. `index` is the 0-based tool-call ordinal.
    ToolCallStart {
        index: u32,
        id: String,
        name: String,
    },
    /// A fragment of the tool call's JSON arguments.
    ToolCallDelta {
        index: u32,
        arguments: String,
    },
    Finish {
        stop_reason: UnifiedStopReason,
    },
    Usage {
        usage: UnifiedUsage,
    },
    /// Upstream signalled the end of the stream.
    Done,
}

/// Join system fragments the way all codecs do.
pub(crate) fn join_system(parts: Vec<String>) -> String {
    parts
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_merge_keeps_known_counts() {
        let mut usage = UnifiedUsage {
            prompt_tokens: 12,
            ..Default::default()
        };

        usage.merge(UnifiedUsage {
            completion_tokens: 34,
            ..Default::default()
        });

        assert_eq!(usage.prompt_tokens, 12);
        assert_eq!(usage.completion_tokens, 34);
        assert_eq!(usage.total_tokens, 46);
    }

    #[test]
    fn system_join_skips_empty_fragments() {
        let joined = join_system(vec!["a".into(), String::new(), "b".into()]);
        assert_eq!(joined, "a\n\nb");
    }
}
