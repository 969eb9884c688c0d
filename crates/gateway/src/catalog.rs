//! Routing catalog: the providers, models and bindings the dispatcher reads
//! on every request, plus the process-wide dispatch settings.
//!
//! These records are owned by the external admin surface; the gateway only
//! ever reads them (and decays binding weights) through the repository.

use std::collections::BTreeMap;
use std::fmt;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// One of the three supported chat-completion wire formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dialect {
    /// OpenAI Chat Completions (`/v1/chat/completions`).
    #[serde(rename = "openai-chat")]
    OpenAiChat,
    /// OpenAI Responses (`/v1/responses`).
    #[serde(rename = "openai-responses")]
    OpenAiResponses,
    /// Anthropic Messages (`/v1/messages`).
    #[serde(rename = "anthropic")]
    Anthropic,
}

impl Dialect {
    /// The request path appended to a provider's base URL.
    pub fn upstream_path(self) -> &'static str {
        match self {
            Dialect::OpenAiChat => "/chat/completions",
            Dialect::OpenAiResponses => "/responses",
            Dialect::Anthropic => "/messages",
        }
    }

    /// The public API endpoint used when a provider has no base URL override.
    pub fn default_base_url(self) -> &'static str {
        match self {
            Dialect::OpenAiChat | Dialect::OpenAiResponses => "https://api.openai.com/v1",
            Dialect::Anthropic => "https://api.anthropic.com/v1",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Dialect::OpenAiChat => "openai-chat",
            Dialect::OpenAiResponses => "openai-responses",
            Dialect::Anthropic => "anthropic",
        }
    }

    /// Parse the stored dialect tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "openai-chat" => Some(Dialect::OpenAiChat),
            "openai-responses" => Some(Dialect::OpenAiResponses),
            "anthropic" => Some(Dialect::Anthropic),
            _ => None,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An upstream provider endpoint. Referenced by bindings.
#[derive(Debug, Clone)]
pub struct Provider {
    pub id: i64,
    pub name: String,
    pub dialect: Dialect,
    pub config: ProviderConfig,
    /// Providers with a proxy get a dedicated HTTP client instead of the
    /// shared pool.
    pub proxy: Option<String>,
}

/// The opaque per-provider configuration blob, as stored by the admin
/// surface.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    pub api_key: SecretString,
    /// Extra headers such as `anthropic-version`.
    #[serde(default)]
    pub version_headers: BTreeMap<String, String>,
    /// Optional custom model list surfaced to admin tooling.
    #[serde(default)]
    pub model_list: Vec<String>,
}

/// A logical model exposed to clients under a public name.
#[derive(Debug, Clone)]
pub struct Model {
    pub id: i64,
    pub name: String,
    /// Attempt cap across candidate bindings.
    pub max_retry: u32,
    /// Per-attempt response-header timeout.
    pub header_timeout_ms: u64,
    /// Capture request/response payloads alongside successful chat logs.
    pub io_log: bool,
}

/// Features a binding can serve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub tool_call: bool,
    pub structured_output: bool,
    pub image: bool,
}

impl Capabilities {
    /// Whether this binding can serve a request needing `required`.
    ///
    /// A binding may offer more than the request needs.
    pub fn covers(self, required: Capabilities) -> bool {
        (!required.tool_call || self.tool_call)
            && (!required.structured_output || self.structured_output)
            && (!required.image || self.image)
    }
}

/// A model-to-provider association. The unit of load balancing.
#[derive(Debug, Clone)]
pub struct Binding {
    pub id: i64,
    pub model_id: i64,
    pub provider_id: i64,
    /// The upstream identifier injected into outgoing request bodies.
    pub provider_model: String,
    pub capabilities: Capabilities,
    pub with_header: bool,
    pub custom_headers: BTreeMap<String, String>,
    /// Non-negative. Zero means never selected.
    pub weight: i64,
    /// Unset counts as enabled.
    pub enabled: Option<bool>,
}

impl Binding {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

/// Process-wide dispatch settings, re-read on every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Require exact capability equality instead of a covering check.
    pub strict_capability_match: bool,
    /// Decay a binding's weight after every failed attempt.
    pub auto_weight_decay: bool,
    /// Weight restored by an operator reset.
    pub auto_weight_decay_default: i64,
    /// Weight subtracted per failed attempt. Decay floors at 1.
    pub auto_weight_decay_step: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            strict_capability_match: false,
            auto_weight_decay: true,
            auto_weight_decay_default: 10,
            auto_weight_decay_step: 1,
        }
    }
}

/// Outcome of a single dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Success,
    Error,
}

/// One chat log row per attempt, success or failure.
#[derive(Debug, Clone)]
pub struct ChatLogRecord {
    pub created_at: jiff::Timestamp,
    pub model_name: String,
    pub provider_model: String,
    pub provider_name: String,
    pub status: AttemptStatus,
    pub dialect: Dialect,
    pub user_agent: String,
    pub remote_ip: String,
    /// 0-based attempt number this record was created on.
    pub retry: u32,
    pub error: Option<String>,
    pub proxy_time_ms: u64,
    pub first_chunk_time_ms: u64,
    pub chunk_time_ms: u64,
    /// Completion tokens per second over the body transfer, 0 when unknown.
    pub tps: f64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cached_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covering_check_allows_superset() {
        let binding = Capabilities {
            tool_call: true,
            structured_output: true,
            image: false,
        };

        let required = Capabilities {
            tool_call: true,
            ..Default::default()
        };

        assert!(binding.covers(required));
        assert!(!binding.covers(Capabilities {
            image: true,
            ..Default::default()
        }));
    }

    #[test]
    fn dialect_tags_round_trip() {
        for dialect in [Dialect::OpenAiChat, Dialect::OpenAiResponses, Dialect::Anthropic] {
            let tag = serde_json::to_string(&dialect).unwrap();
            let back: Dialect = serde_json::from_str(&tag).unwrap();
            assert_eq!(dialect, back);
        }
    }
}
