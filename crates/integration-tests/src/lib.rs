//! End-to-end test harness: a real gateway server in front of mock
//! upstreams, talked to over HTTP.

pub mod llms;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use gateway::catalog::{Binding, Capabilities, ChatLogRecord, Dialect, Model, Provider, ProviderConfig, Settings};
use gateway::storage::MemoryRepository;
use secrecy::SecretString;

/// Token every test gateway is configured with.
pub const TOKEN: &str = "test-token";

pub struct TestGateway {
    pub url: String,
    pub repo: Arc<MemoryRepository>,
    client: reqwest::Client,
}

impl TestGateway {
    pub async fn spawn(repo: Arc<MemoryRepository>) -> Self {
        let app = gateway::router(repo.clone(), TOKEN);
        let url = llms::start_server(app).await;

        Self {
            url,
            repo,
            client: reqwest::Client::new(),
        }
    }

    /// POST with OpenAI-style bearer auth.
    pub fn post_openai(&self, path: &str, body: serde_json::Value) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{path}", self.url))
            .bearer_auth(TOKEN)
            .json(&body)
    }

    /// POST with Anthropic-style key auth.
    pub fn post_anthropic(&self, body: serde_json::Value) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}/v1/messages", self.url))
            .header("x-api-key", TOKEN)
            .json(&body)
    }

    pub fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.get(format!("{}{path}", self.url)).bearer_auth(TOKEN)
    }

    /// Wait until `count` attempt logs exist, or give up after two seconds.
    pub async fn wait_for_logs(&self, count: usize) -> Vec<(i64, ChatLogRecord)> {
        for _ in 0..100 {
            let logs = self.repo.chat_logs();
            if logs.len() >= count {
                return logs;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        self.repo.chat_logs()
    }
}

pub fn provider(id: i64, name: &str, dialect: Dialect, base_url: &str) -> Provider {
    Provider {
        id,
        name: name.to_string(),
        dialect,
        config: ProviderConfig {
            base_url: Some(base_url.to_string()),
            api_key: SecretString::from("sk-upstream"),
            version_headers: BTreeMap::new(),
            model_list: Vec::new(),
        },
        proxy: None,
    }
}

pub fn model(id: i64, name: &str) -> Model {
    Model {
        id,
        name: name.to_string(),
        max_retry: 3,
        header_timeout_ms: 5_000,
        io_log: false,
    }
}

pub fn binding(id: i64, model_id: i64, provider_id: i64, provider_model: &str) -> Binding {
    Binding {
        id,
        model_id,
        provider_id,
        provider_model: provider_model.to_string(),
        capabilities: Capabilities::default(),
        with_header: false,
        custom_headers: BTreeMap::new(),
        weight: 10,
        enabled: None,
    }
}

pub fn repo(settings: Settings) -> Arc<MemoryRepository> {
    Arc::new(MemoryRepository::new(settings))
}
