use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use args::Args;
use gateway::catalog::{Binding, Capabilities, Dialect, Model, Provider, ProviderConfig, Settings};
use gateway::storage::MemoryRepository;

mod args;
mod logger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    logger::init(&args);

    let config = match &args.config {
        Some(path) => config::load(path)?,
        None => config::Config::default(),
    };

    let token = args
        .token
        .clone()
        .or_else(|| config.server.token.clone())
        .context("no API token configured; set TOKEN or server.token in relay.toml")?;

    let listen = args.listen.unwrap_or(config.server.listen_address);

    let repo = Arc::new(seed_repository(&config)?);
    let app = gateway::router(repo, token);

    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;

    log::info!("relay listening on {listen}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    log::info!("relay shut down");

    Ok(())
}

/// Build the in-memory repository from the seed catalog.
///
/// Deployments with an external store replace this with their own
/// `Repository` implementation; the gateway core is agnostic.
fn seed_repository(config: &config::Config) -> anyhow::Result<MemoryRepository> {
    let repo = MemoryRepository::new(Settings {
        strict_capability_match: config.settings.strict_capability_match,
        auto_weight_decay: config.settings.auto_weight_decay,
        auto_weight_decay_default: config.settings.auto_weight_decay_default,
        auto_weight_decay_step: config.settings.auto_weight_decay_step,
    });

    for seed in &config.providers {
        let dialect = Dialect::from_tag(&seed.dialect)
            .with_context(|| format!("provider {} has unknown dialect '{}'", seed.name, seed.dialect))?;

        repo.insert_provider(Provider {
            id: seed.id,
            name: seed.name.clone(),
            dialect,
            config: ProviderConfig {
                base_url: seed.base_url.clone(),
                api_key: seed.api_key.clone(),
                version_headers: seed.version_headers.clone(),
                model_list: Vec::new(),
            },
            proxy: seed.proxy.clone(),
        });
    }

    for seed in &config.models {
        repo.insert_model(Model {
            id: seed.id,
            name: seed.name.clone(),
            max_retry: seed.max_retry,
            header_timeout_ms: seed.header_timeout_ms,
            io_log: seed.io_log,
        });
    }

    for seed in &config.bindings {
        repo.insert_binding(Binding {
            id: seed.id,
            model_id: seed.model_id,
            provider_id: seed.provider_id,
            provider_model: seed.provider_model.clone(),
            capabilities: Capabilities {
                tool_call: seed.capabilities.tool_call,
                structured_output: seed.capabilities.structured_output,
                image: seed.capabilities.image,
            },
            with_header: seed.with_header,
            custom_headers: seed.custom_headers.clone(),
            weight: seed.weight,
            enabled: seed.enabled,
        });
    }

    log::info!(
        "seeded {} providers, {} models, {} bindings",
        config.providers.len(),
        config.models.len(),
        config.bindings.len()
    );

    Ok(repo)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => log::error!("failed to install SIGTERM handler: {e}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    log::info!("shutdown signal received");
}
