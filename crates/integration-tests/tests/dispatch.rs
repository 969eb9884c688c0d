//! Non-streaming end-to-end behavior: passthrough, transcoding, retries,
//! capability filtering, auth and the listing endpoints.

use gateway::catalog::{AttemptStatus, Capabilities, Dialect, Model, Settings};
use integration_tests::llms::anthropic::AnthropicMock;
use integration_tests::llms::openai::OpenAiMock;
use integration_tests::{TestGateway, binding, model, provider, repo};
use serde_json::{Value, json};

fn chat_body(model: &str) -> Value {
    json!({
        "model": model,
        "messages": [{"role": "user", "content": "hi"}],
        "stream": false
    })
}

#[tokio::test]
async fn same_dialect_passthrough_replaces_model_and_forwards_verbatim() {
    let upstream = OpenAiMock::new().with_text("pong").spawn().await;

    let repo = repo(Settings::default());
    repo.insert_provider(provider(1, "openai-main", Dialect::OpenAiChat, &upstream.base_url));
    repo.insert_model(model(1, "m"));
    repo.insert_binding(binding(1, 1, 1, "upstream-m"));

    let gateway = TestGateway::spawn(repo).await;

    let response = gateway
        .post_openai("/v1/chat/completions", chat_body("m"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();

    // The upstream body comes back untouched, including its model field.
    assert_eq!(body["model"], "upstream-m");
    assert_eq!(body["choices"][0]["message"]["content"], "pong");

    // The upstream saw the client body with only the model replaced.
    let seen = upstream.captured.last().unwrap();
    assert_eq!(seen["model"], "upstream-m");
    assert_eq!(seen["messages"][0]["content"], "hi");
    assert_eq!(seen["stream"], false);

    let logs = gateway.wait_for_logs(1).await;
    assert_eq!(logs.len(), 1);

    let record = &logs[0].1;
    assert_eq!(record.status, AttemptStatus::Success);
    assert_eq!(record.retry, 0);
    assert_eq!(record.model_name, "m");
    assert_eq!(record.provider_model, "upstream-m");
    assert_eq!(record.prompt_tokens, 9);
    assert_eq!(record.completion_tokens, 12);
}

#[tokio::test]
async fn openai_request_transcodes_to_anthropic_binding() {
    let upstream = AnthropicMock::new().spawn().await;

    let repo = repo(Settings::default());
    repo.insert_provider(provider(1, "anthropic-main", Dialect::Anthropic, &upstream.base_url));
    repo.insert_model(model(1, "m"));
    repo.insert_binding(binding(1, 1, 1, "claude-x"));

    let gateway = TestGateway::spawn(repo).await;

    let response = gateway
        .post_openai(
            "/v1/chat/completions",
            json!({
                "model": "m",
                "messages": [
                    {"role": "system", "content": "S"},
                    {"role": "user", "content": "hi"}
                ]
            }),
        )
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);

    // Upstream got an Anthropic-shaped body.
    let seen = upstream.captured.last().unwrap();
    assert_eq!(seen["model"], "claude-x");
    assert_eq!(seen["system"], "S");
    assert_eq!(seen["max_tokens"], 8192);
    assert_eq!(seen["messages"], json!([{"role": "user", "content": "hi"}]));

    // The client got an OpenAI-shaped response under the public model name.
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["model"], "m");
    assert_eq!(body["choices"][0]["message"]["content"], "Hello from Claude mock!");
    assert_eq!(body["usage"]["prompt_tokens"], 8);
}

#[tokio::test]
async fn responses_request_transcodes_to_anthropic_binding() {
    let upstream = AnthropicMock::new().spawn().await;

    let repo = repo(Settings::default());
    repo.insert_provider(provider(1, "anthropic-main", Dialect::Anthropic, &upstream.base_url));
    repo.insert_model(model(1, "m"));
    repo.insert_binding(binding(1, 1, 1, "claude-x"));

    let gateway = TestGateway::spawn(repo).await;

    let response = gateway
        .post_openai(
            "/v1/responses",
            json!({
                "model": "m",
                "instructions": "Be kind.",
                "input": "hello there"
            }),
        )
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);

    let seen = upstream.captured.last().unwrap();
    assert_eq!(seen["system"], "Be kind.");
    assert_eq!(seen["messages"][0]["content"], "hello there");

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["object"], "response");
    assert_eq!(body["output"][0]["content"][0]["text"], "Hello from Claude mock!");
}

#[tokio::test]
async fn upstream_500_retries_next_candidate_and_decays_weight() {
    let failing = OpenAiMock::new().with_error(500, r#"{"error":{"message":"boom"}}"#).spawn().await;
    let healthy = OpenAiMock::new().with_text("recovered").spawn().await;

    let settings = Settings {
        auto_weight_decay: true,
        auto_weight_decay_step: 3,
        ..Default::default()
    };

    let repo = repo(settings);
    repo.insert_provider(provider(1, "failing", Dialect::OpenAiChat, &failing.base_url));
    repo.insert_provider(provider(2, "healthy", Dialect::OpenAiChat, &healthy.base_url));
    repo.insert_model(model(1, "m"));

    // The weight gap makes the failing binding the first candidate.
    let mut first = binding(1, 1, 1, "upstream-m");
    first.weight = 1_000_000;
    repo.insert_binding(first);

    let mut second = binding(2, 1, 2, "upstream-m");
    second.weight = 1;
    repo.insert_binding(second);

    let gateway = TestGateway::spawn(repo).await;

    let response = gateway
        .post_openai("/v1/chat/completions", chat_body("m"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["choices"][0]["message"]["content"], "recovered");

    let logs = gateway.wait_for_logs(2).await;
    assert_eq!(logs.len(), 2);

    assert_eq!(logs[0].1.status, AttemptStatus::Error);
    assert_eq!(logs[0].1.retry, 0);
    assert_eq!(logs[0].1.provider_name, "failing");
    assert!(logs[0].1.error.as_deref().unwrap().contains("500"));

    assert_eq!(logs[1].1.status, AttemptStatus::Success);
    assert_eq!(logs[1].1.retry, 1);
    assert_eq!(logs[1].1.provider_name, "healthy");

    assert_eq!(gateway.repo.binding_weight(1), Some(999_997));
    assert_eq!(gateway.repo.binding_weight(2), Some(1));
}

#[tokio::test]
async fn exhausted_candidates_propagate_last_upstream_error() {
    let failing = OpenAiMock::new()
        .with_error(429, r#"{"error":{"message":"slow down","type":"rate_limit_error"}}"#)
        .spawn()
        .await;

    let repo = repo(Settings::default());
    repo.insert_provider(provider(1, "failing", Dialect::OpenAiChat, &failing.base_url));
    repo.insert_model(model(1, "m"));
    repo.insert_binding(binding(1, 1, 1, "upstream-m"));

    let gateway = TestGateway::spawn(repo).await;

    let response = gateway
        .post_openai("/v1/chat/completions", chat_body("m"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 429);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["message"], "slow down");
}

#[tokio::test]
async fn capability_filter_routes_tool_requests_to_capable_bindings() {
    let plain = OpenAiMock::new().with_text("plain").spawn().await;
    let tools = OpenAiMock::new().with_text("tooled").spawn().await;

    let repo = repo(Settings::default());
    repo.insert_provider(provider(1, "plain", Dialect::OpenAiChat, &plain.base_url));
    repo.insert_provider(provider(2, "tools", Dialect::OpenAiChat, &tools.base_url));
    repo.insert_model(model(1, "m"));

    let mut no_tools = binding(1, 1, 1, "upstream-m");
    no_tools.weight = 1_000_000;
    repo.insert_binding(no_tools);

    let mut with_tools = binding(2, 1, 2, "upstream-m");
    with_tools.capabilities = Capabilities {
        tool_call: true,
        ..Default::default()
    };
    repo.insert_binding(with_tools);

    let gateway = TestGateway::spawn(repo).await;

    let response = gateway
        .post_openai(
            "/v1/chat/completions",
            json!({
                "model": "m",
                "messages": [{"role": "user", "content": "hi"}],
                "tools": [{"type": "function", "function": {"name": "f", "parameters": {}}}]
            }),
        )
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();

    // Despite the huge weight on the tool-less binding, only the capable one
    // was considered.
    assert_eq!(body["choices"][0]["message"]["content"], "tooled");
    assert!(plain.captured.is_empty());
}

#[tokio::test]
async fn no_capable_binding_returns_503() {
    let plain = OpenAiMock::new().spawn().await;

    let repo = repo(Settings::default());
    repo.insert_provider(provider(1, "plain", Dialect::OpenAiChat, &plain.base_url));
    repo.insert_model(model(1, "m"));
    repo.insert_binding(binding(1, 1, 1, "upstream-m"));

    let gateway = TestGateway::spawn(repo).await;

    let response = gateway
        .post_openai(
            "/v1/chat/completions",
            json!({
                "model": "m",
                "messages": [{"role": "user", "content": "hi"}],
                "tools": [{"type": "function", "function": {"name": "f", "parameters": {}}}]
            }),
        )
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 503);
    assert!(plain.captured.is_empty());
}

#[tokio::test]
async fn response_header_timeout_returns_504() {
    let slow = OpenAiMock::new()
        .with_delay(std::time::Duration::from_secs(3))
        .spawn()
        .await;

    let repo = repo(Settings::default());
    repo.insert_provider(provider(1, "slow", Dialect::OpenAiChat, &slow.base_url));
    repo.insert_model(Model {
        id: 1,
        name: "m".to_string(),
        max_retry: 3,
        header_timeout_ms: 200,
        io_log: false,
    });
    repo.insert_binding(binding(1, 1, 1, "upstream-m"));

    let gateway = TestGateway::spawn(repo).await;

    let response = gateway
        .post_openai("/v1/chat/completions", chat_body("m"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 504);

    let logs = gateway.wait_for_logs(1).await;
    assert!(logs[0].1.error.as_deref().unwrap().contains("timeout"));
}

#[tokio::test]
async fn unknown_model_returns_404() {
    let repo = repo(Settings::default());
    let gateway = TestGateway::spawn(repo).await;

    let response = gateway
        .post_openai("/v1/chat/completions", chat_body("nope"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["type"], "not_found_error");
}

#[tokio::test]
async fn missing_or_wrong_token_is_rejected() {
    let repo = repo(Settings::default());
    let gateway = TestGateway::spawn(repo).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/v1/chat/completions", gateway.url))
        .json(&chat_body("m"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    let response = client
        .post(format!("{}/v1/chat/completions", gateway.url))
        .bearer_auth("wrong")
        .json(&chat_body("m"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    // The Anthropic endpoint wants x-api-key, not a bearer token.
    let response = client
        .post(format!("{}/v1/messages", gateway.url))
        .bearer_auth(integration_tests::TOKEN)
        .json(&json!({"model": "m", "max_tokens": 10, "messages": []}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["type"], "error");
}

#[tokio::test]
async fn model_listing_aggregates_registered_models() {
    let repo = repo(Settings::default());
    repo.insert_model(model(1, "alpha"));
    repo.insert_model(model(2, "beta"));

    let gateway = TestGateway::spawn(repo).await;

    let response = gateway.get("/v1/models").send().await.unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["object"], "list");

    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap())
        .collect();

    assert_eq!(ids, vec!["alpha", "beta"]);
}

#[tokio::test]
async fn health_endpoint_needs_no_auth() {
    let repo = repo(Settings::default());
    let gateway = TestGateway::spawn(repo).await;

    let response = reqwest::Client::new()
        .get(format!("{}/healthz", gateway.url))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn io_log_captures_input_and_output_for_successes() {
    let upstream = OpenAiMock::new().with_text("pong").spawn().await;

    let repo = repo(Settings::default());
    repo.insert_provider(provider(1, "openai-main", Dialect::OpenAiChat, &upstream.base_url));
    repo.insert_model(Model {
        id: 1,
        name: "m".to_string(),
        max_retry: 3,
        header_timeout_ms: 5_000,
        io_log: true,
    });
    repo.insert_binding(binding(1, 1, 1, "upstream-m"));

    let gateway = TestGateway::spawn(repo).await;

    let response = gateway
        .post_openai("/v1/chat/completions", chat_body("m"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let logs = gateway.wait_for_logs(1).await;
    let (input, output) = gateway.repo.chat_io(logs[0].0).unwrap();

    assert_eq!(input, "hi");
    assert_eq!(output, "pong");
}

#[tokio::test]
async fn bad_request_body_is_rejected_before_dispatch() {
    let repo = repo(Settings::default());
    let gateway = TestGateway::spawn(repo).await;

    let response = gateway
        .post_openai("/v1/chat/completions", json!({"messages": []}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["type"], "invalid_request_error");
}
