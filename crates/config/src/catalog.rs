//! Seed catalog: providers, models and bindings loaded at startup.
//!
//! The gateway reads its routing tables through a repository interface. When
//! relay runs without an external store, the repository is populated from
//! these structures.

use std::collections::BTreeMap;

use secrecy::SecretString;
use serde::Deserialize;

/// An upstream provider endpoint.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderSeed {
    /// Stable identifier, referenced by bindings.
    pub id: i64,

    /// Display name used in logs.
    pub name: String,

    /// Wire dialect: `openai-chat`, `openai-responses` or `anthropic`.
    pub dialect: String,

    /// Base URL override. Defaults to the provider's public API endpoint.
    #[serde(default)]
    pub base_url: Option<String>,

    /// API credential for the upstream.
    pub api_key: SecretString,

    /// Extra version headers, e.g. `anthropic-version`.
    #[serde(default)]
    pub version_headers: BTreeMap<String, String>,

    /// Optional HTTP proxy URL for this provider.
    #[serde(default)]
    pub proxy: Option<String>,
}

/// A logical model exposed to clients.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelSeed {
    /// Stable identifier, referenced by bindings.
    pub id: i64,

    /// Public name clients put in the `model` field.
    pub name: String,

    /// Maximum attempts across candidate bindings.
    #[serde(default = "default_max_retry")]
    pub max_retry: u32,

    /// Per-attempt response-header timeout in milliseconds.
    #[serde(default = "default_header_timeout_ms")]
    pub header_timeout_ms: u64,

    /// Capture request/response payloads alongside the chat log.
    #[serde(default)]
    pub io_log: bool,
}

fn default_max_retry() -> u32 {
    3
}

fn default_header_timeout_ms() -> u64 {
    30_000
}

/// Capability flags a binding can serve.
#[derive(Debug, Default, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CapabilitySeed {
    /// Tool/function calling.
    pub tool_call: bool,
    /// Structured output (`response_format` style).
    pub structured_output: bool,
    /// Image inputs.
    pub image: bool,
}

/// A model-to-provider binding.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BindingSeed {
    /// Stable identifier.
    pub id: i64,

    /// The logical model this binding serves.
    pub model_id: i64,

    /// The provider this binding dispatches to.
    pub provider_id: i64,

    /// Upstream model identifier sent to the provider.
    pub provider_model: String,

    /// Capabilities this binding can serve.
    #[serde(default)]
    pub capabilities: CapabilitySeed,

    /// Merge `custom_headers` into upstream requests.
    #[serde(default)]
    pub with_header: bool,

    /// Headers merged when `with_header` is set.
    #[serde(default)]
    pub custom_headers: BTreeMap<String, String>,

    /// Load-balancing weight. Zero means never selected.
    #[serde(default = "default_weight")]
    pub weight: i64,

    /// Unset counts as enabled.
    #[serde(default)]
    pub enabled: Option<bool>,
}

fn default_weight() -> i64 {
    10
}

/// Dispatch behavior settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SettingsSeed {
    /// Require exact capability equality instead of a covering check.
    pub strict_capability_match: bool,

    /// Decay a binding's weight after each failed attempt.
    pub auto_weight_decay: bool,

    /// Weight restored by an operator reset.
    pub auto_weight_decay_default: i64,

    /// Weight subtracted per failed attempt.
    pub auto_weight_decay_step: i64,
}

impl Default for SettingsSeed {
    fn default() -> Self {
        Self {
            strict_capability_match: false,
            auto_weight_decay: true,
            auto_weight_decay_default: 10,
            auto_weight_decay_step: 1,
        }
    }
}
