//! Relay configuration structures to map the relay.toml configuration.

#![deny(missing_docs)]

mod catalog;
mod loader;
mod server;

pub use catalog::{BindingSeed, CapabilitySeed, ModelSeed, ProviderSeed, SettingsSeed};
pub use loader::load;
pub use server::ServerConfig;

use serde::Deserialize;

/// Root configuration for the relay gateway.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,

    /// Dispatch behavior settings (capability matching, weight decay).
    pub settings: SettingsSeed,

    /// Upstream providers the gateway can dispatch to.
    pub providers: Vec<ProviderSeed>,

    /// Logical models exposed to clients.
    pub models: Vec<ModelSeed>,

    /// Model-to-provider bindings, the unit of load balancing.
    pub bindings: Vec<BindingSeed>,
}
