//! Shared upstream HTTP clients.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use reqwest::Client;

use crate::catalog::Provider;
use crate::error::GatewayError;

fn client_builder(connect_timeout: Duration) -> reqwest::ClientBuilder {
    let mut headers = http::HeaderMap::new();
    headers.insert(http::header::CONNECTION, http::HeaderValue::from_static("keep-alive"));

    Client::builder()
        .connect_timeout(connect_timeout)
        // A short idle timeout lets the pool pick up upstream DNS changes;
        // same default as the larger gateways.
        .pool_idle_timeout(Some(Duration::from_secs(5)))
        .tcp_nodelay(true)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .default_headers(headers)
}

/// Process-wide client pool, keyed by the model's response-header timeout.
///
/// Reads take the shared lock; only the first request with a new timeout
/// takes the exclusive lock to insert. Providers with a proxy URL bypass the
/// pool and get a dedicated transport, matching the proxy's lifetime to the
/// provider's.
pub struct ClientPool {
    clients: RwLock<HashMap<u64, Client>>,
}

impl Default for ClientPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientPool {
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn for_provider(&self, provider: &Provider, header_timeout: Duration) -> Result<Client, GatewayError> {
        match &provider.proxy {
            Some(proxy) => {
                let proxy = reqwest::Proxy::all(proxy)
                    .map_err(|e| GatewayError::Internal(format!("invalid proxy URL for provider {}: {e}", provider.name)))?;

                client_builder(header_timeout)
                    .proxy(proxy)
                    .build()
                    .map_err(|e| GatewayError::Internal(format!("failed to build proxied HTTP client: {e}")))
            }
            None => self.shared(header_timeout),
        }
    }

    fn shared(&self, header_timeout: Duration) -> Result<Client, GatewayError> {
        let key = header_timeout.as_millis() as u64;

        {
            let clients = self.clients.read().unwrap_or_else(|e| e.into_inner());

            if let Some(client) = clients.get(&key) {
                return Ok(client.clone());
            }
        }

        let client = client_builder(header_timeout)
            .build()
            .map_err(|e| GatewayError::Internal(format!("failed to build HTTP client: {e}")))?;

        let mut clients = self.clients.write().unwrap_or_else(|e| e.into_inner());
        Ok(clients.entry(key).or_insert(client).clone())
    }
}
