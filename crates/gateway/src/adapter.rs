//! Provider adapters: turn a prepared body into an upstream HTTP request.
//!
//! The adapter identity is the provider's dialect tag. Binding header
//! overlays are applied before the adapter's own headers, so the adapter
//! always wins on authentication.

use std::collections::BTreeMap;

use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use secrecy::ExposeSecret;

use crate::catalog::{Dialect, Provider};
use crate::error::GatewayError;

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub(crate) struct ProviderAdapter<'a> {
    provider: &'a Provider,
    client: Client,
}

impl<'a> ProviderAdapter<'a> {
    pub(crate) fn new(provider: &'a Provider, client: Client) -> Self {
        Self { provider, client }
    }

    /// Build the upstream POST carrying `body`, with the binding's header
    /// overlay merged in first.
    pub(crate) fn build_request(
        &self,
        body: Vec<u8>,
        overlay: Option<&BTreeMap<String, String>>,
    ) -> Result<reqwest::RequestBuilder, GatewayError> {
        let base = self
            .provider
            .config
            .base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.dialect.default_base_url());

        let url = format!("{}{}", base.trim_end_matches('/'), self.provider.dialect.upstream_path());

        let mut headers = HeaderMap::new();

        if let Some(overlay) = overlay {
            insert_all(&mut headers, overlay);
        }

        insert_all(&mut headers, &self.provider.config.version_headers);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let key = self.provider.config.api_key.expose_secret();

        match self.provider.dialect {
            Dialect::OpenAiChat | Dialect::OpenAiResponses => {
                let value = HeaderValue::from_str(&format!("Bearer {key}"))
                    .map_err(|_| GatewayError::Internal("provider credential is not a valid header".to_string()))?;
                headers.insert(AUTHORIZATION, value);
            }
            Dialect::Anthropic => {
                let value = HeaderValue::from_str(key)
                    .map_err(|_| GatewayError::Internal("provider credential is not a valid header".to_string()))?;
                headers.insert("x-api-key", value);

                if !headers.contains_key("anthropic-version") {
                    headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
                }
            }
        }

        Ok(self.client.post(url).headers(headers).body(body))
    }
}

fn insert_all(headers: &mut HeaderMap, entries: &BTreeMap<String, String>) {
    for (name, value) in entries {
        let Ok(name) = name.parse::<HeaderName>() else {
            log::warn!("skipping invalid header name '{name}'");
            continue;
        };

        let Ok(value) = HeaderValue::from_str(value) else {
            log::warn!("skipping invalid value for header '{name}'");
            continue;
        };

        headers.insert(name, value);
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use crate::catalog::ProviderConfig;

    use super::*;

    fn provider(dialect: Dialect) -> Provider {
        Provider {
            id: 1,
            name: "test".to_string(),
            dialect,
            config: ProviderConfig {
                base_url: Some("https://upstream.example/v1/".to_string()),
                api_key: SecretString::from("sk-secret"),
                version_headers: BTreeMap::new(),
                model_list: Vec::new(),
            },
            proxy: None,
        }
    }

    fn build(dialect: Dialect, overlay: Option<&BTreeMap<String, String>>) -> reqwest::Request {
        let provider = provider(dialect);
        let adapter = ProviderAdapter::new(&provider, Client::new());

        adapter
            .build_request(b"{}".to_vec(), overlay)
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn openai_request_gets_bearer_auth() {
        let request = build(Dialect::OpenAiChat, None);

        assert_eq!(request.url().as_str(), "https://upstream.example/v1/chat/completions");
        assert_eq!(request.headers()[AUTHORIZATION.as_str()], "Bearer sk-secret");
    }

    #[test]
    fn anthropic_request_gets_api_key_and_version() {
        let request = build(Dialect::Anthropic, None);

        assert_eq!(request.url().as_str(), "https://upstream.example/v1/messages");
        assert_eq!(request.headers()["x-api-key"], "sk-secret");
        assert_eq!(request.headers()["anthropic-version"], ANTHROPIC_VERSION);
    }

    #[test]
    fn overlay_never_overrides_auth() {
        let overlay = BTreeMap::from([
            ("authorization".to_string(), "Bearer stolen".to_string()),
            ("x-tenant".to_string(), "acme".to_string()),
        ]);

        let request = build(Dialect::OpenAiChat, Some(&overlay));

        assert_eq!(request.headers()[AUTHORIZATION.as_str()], "Bearer sk-secret");
        assert_eq!(request.headers()["x-tenant"], "acme");
    }
}
