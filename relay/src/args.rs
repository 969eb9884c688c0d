use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "relay", about = "Multi-dialect LLM API gateway", version)]
pub struct Args {
    /// Path to the relay.toml configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Client API token.
    #[arg(long, env = "TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Listen address override, e.g. 0.0.0.0:7070.
    #[arg(long)]
    pub listen: Option<SocketAddr>,

    /// Log level: error, warn, info, debug or trace.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}
