//! Streaming end-to-end behavior: transcoded streams, passthrough streams,
//! and mid-stream upstream failure.

use eventsource_stream::Eventsource;
use futures::StreamExt;
use gateway::catalog::{AttemptStatus, Dialect, Settings};
use integration_tests::llms::anthropic::AnthropicMock;
use integration_tests::llms::openai::OpenAiMock;
use integration_tests::{TestGateway, binding, model, provider, repo};
use serde_json::{Value, json};

fn stream_chat_body() -> Value {
    json!({
        "model": "m",
        "messages": [{"role": "user", "content": "hi"}],
        "stream": true
    })
}

/// Collect SSE events until the stream ends (cleanly or not).
async fn collect_events(response: reqwest::Response) -> Vec<eventsource_stream::Event> {
    let mut events = Vec::new();
    let mut stream = response.bytes_stream().eventsource();

    while let Some(item) = stream.next().await {
        match item {
            Ok(event) => events.push(event),
            Err(_) => break,
        }
    }

    events
}

#[tokio::test]
async fn anthropic_stream_transcodes_to_openai_chunks() {
    let upstream = AnthropicMock::new().with_text_stream(&["你", "好"]).spawn().await;

    let repo = repo(Settings::default());
    repo.insert_provider(provider(1, "anthropic-main", Dialect::Anthropic, &upstream.base_url));
    repo.insert_model(model(1, "m"));
    repo.insert_binding(binding(1, 1, 1, "claude-x"));

    let gateway = TestGateway::spawn(repo).await;

    let response = gateway
        .post_openai("/v1/chat/completions", stream_chat_body())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert!(
        response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .contains("text/event-stream")
    );

    let events = collect_events(response).await;

    // The upstream sent "你" and "好" as separate deltas; they must arrive
    // as separate chunks in order.
    let contents: Vec<String> = events
        .iter()
        .filter_map(|e| serde_json::from_str::<Value>(&e.data).ok())
        .filter_map(|v| v["choices"][0]["delta"]["content"].as_str().map(String::from))
        .collect();

    assert_eq!(contents, vec!["你", "好"]);

    let finish: Vec<&str> = events
        .iter()
        .filter_map(|e| serde_json::from_str::<Value>(&e.data).ok())
        .filter_map(|v| v["choices"][0]["finish_reason"].as_str().map(|_| "stop"))
        .collect();
    assert_eq!(finish, vec!["stop"]);

    assert_eq!(events.last().unwrap().data, "[DONE]");

    // Usage from message_delta lands in the attempt log.
    let logs = gateway.wait_for_logs(1).await;
    let record = &logs[0].1;
    assert_eq!(record.status, AttemptStatus::Success);
    assert_eq!(record.prompt_tokens, 4);
    assert_eq!(record.completion_tokens, 2);
}

#[tokio::test]
async fn openai_stream_transcodes_to_anthropic_events() {
    let chunks = vec![
        json!({"id":"chatcmpl-1","object":"chat.completion.chunk","created":1,"model":"gpt","choices":[{"index":0,"delta":{"role":"assistant"},"finish_reason":null}]}).to_string(),
        json!({"id":"chatcmpl-1","object":"chat.completion.chunk","created":1,"model":"gpt","choices":[{"index":0,"delta":{"content":"hey"},"finish_reason":null}]}).to_string(),
        json!({"id":"chatcmpl-1","object":"chat.completion.chunk","created":1,"model":"gpt","choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}).to_string(),
        json!({"id":"chatcmpl-1","object":"chat.completion.chunk","created":1,"model":"gpt","choices":[],"usage":{"prompt_tokens":3,"completion_tokens":1,"total_tokens":4}}).to_string(),
    ];

    let upstream = OpenAiMock::new().with_stream(chunks).spawn().await;

    let repo = repo(Settings::default());
    repo.insert_provider(provider(1, "openai-main", Dialect::OpenAiChat, &upstream.base_url));
    repo.insert_model(model(1, "m"));
    repo.insert_binding(binding(1, 1, 1, "gpt-x"));

    let gateway = TestGateway::spawn(repo).await;

    let response = gateway
        .post_anthropic(json!({
            "model": "m",
            "max_tokens": 128,
            "messages": [{"role": "user", "content": "hi"}],
            "stream": true
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let events = collect_events(response).await;

    let names: Vec<&str> = events.iter().map(|e| e.event.as_str()).collect();

    assert_eq!(
        names,
        vec![
            "message_start",
            "content_block_start",
            "content_block_delta",
            "content_block_stop",
            "message_delta",
            "message_delta",
            "message_stop",
        ]
    );

    let delta: Value = serde_json::from_str(&events[2].data).unwrap();
    assert_eq!(delta["delta"]["text"], "hey");

    let finish: Value = serde_json::from_str(&events[4].data).unwrap();
    assert_eq!(finish["delta"]["stop_reason"], "end_turn");

    let usage: Value = serde_json::from_str(&events[5].data).unwrap();
    assert_eq!(usage["usage"]["output_tokens"], 1);
}

#[tokio::test]
async fn anthropic_stream_transcodes_to_responses_events() {
    let upstream = AnthropicMock::new().with_text_stream(&["你", "好"]).spawn().await;

    let repo = repo(Settings::default());
    repo.insert_provider(provider(1, "anthropic-main", Dialect::Anthropic, &upstream.base_url));
    repo.insert_model(model(1, "m"));
    repo.insert_binding(binding(1, 1, 1, "claude-x"));

    let gateway = TestGateway::spawn(repo).await;

    let response = gateway
        .post_openai(
            "/v1/responses",
            json!({"model": "m", "input": "hi", "stream": true}),
        )
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let events = collect_events(response).await;

    assert_eq!(events.first().unwrap().event, "response.created");

    let deltas: Vec<String> = events
        .iter()
        .filter(|e| e.event == "response.output_text.delta")
        .filter_map(|e| serde_json::from_str::<Value>(&e.data).ok())
        .filter_map(|v| v["delta"].as_str().map(String::from))
        .collect();
    assert_eq!(deltas, vec!["你", "好"]);

    let last = events.last().unwrap();
    assert_eq!(last.event, "response.completed");

    let completed: Value = serde_json::from_str(&last.data).unwrap();
    assert_eq!(completed["response"]["output"][0]["content"][0]["text"], "你好");
    assert_eq!(completed["response"]["usage"]["output_tokens"], 2);
}

#[tokio::test]
async fn same_dialect_stream_passes_through_verbatim() {
    let chunks = vec![
        json!({"id":"chatcmpl-1","object":"chat.completion.chunk","created":1,"model":"gpt","choices":[{"index":0,"delta":{"role":"assistant","content":"a"},"finish_reason":null}]}).to_string(),
        json!({"id":"chatcmpl-1","object":"chat.completion.chunk","created":1,"model":"gpt","choices":[{"index":0,"delta":{"content":"b"},"finish_reason":"stop"}],"usage":{"prompt_tokens":2,"completion_tokens":5,"total_tokens":7}}).to_string(),
    ];

    let expected: String = chunks.iter().map(|c| format!("data: {c}\n\n")).collect::<String>() + "data: [DONE]\n\n";

    let upstream = OpenAiMock::new().with_stream(chunks).spawn().await;

    let repo = repo(Settings::default());
    repo.insert_provider(provider(1, "openai-main", Dialect::OpenAiChat, &upstream.base_url));
    repo.insert_model(model(1, "m"));
    repo.insert_binding(binding(1, 1, 1, "gpt-x"));

    let gateway = TestGateway::spawn(repo).await;

    let response = gateway
        .post_openai("/v1/chat/completions", stream_chat_body())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body = response.bytes().await.unwrap();
    assert_eq!(String::from_utf8_lossy(&body), expected);

    // Usage was still scanned out of the passthrough stream.
    let logs = gateway.wait_for_logs(1).await;
    let record = &logs[0].1;
    assert_eq!(record.status, AttemptStatus::Success);
    assert_eq!(record.completion_tokens, 5);
    assert_eq!(record.total_tokens, 7);
}

#[tokio::test]
async fn mid_stream_upstream_failure_truncates_without_retry() {
    // message_start, content_block_start, two deltas, then connection reset.
    let upstream = AnthropicMock::new()
        .with_text_stream(&["a", "b"])
        .aborting_after(4)
        .spawn()
        .await;

    let fallback = OpenAiMock::new().spawn().await;

    let repo = repo(Settings::default());
    repo.insert_provider(provider(1, "anthropic-main", Dialect::Anthropic, &upstream.base_url));
    repo.insert_provider(provider(2, "fallback", Dialect::OpenAiChat, &fallback.base_url));
    repo.insert_model(model(1, "m"));

    let mut first = binding(1, 1, 1, "claude-x");
    first.weight = 1_000_000;
    repo.insert_binding(first);

    let mut second = binding(2, 1, 2, "gpt-x");
    second.weight = 1;
    repo.insert_binding(second);

    let gateway = TestGateway::spawn(repo).await;

    let response = gateway
        .post_openai("/v1/chat/completions", stream_chat_body())
        .send()
        .await
        .unwrap();

    // The response was committed before the failure.
    assert_eq!(response.status(), 200);
    let events = collect_events(response).await;

    let contents: Vec<String> = events
        .iter()
        .filter_map(|e| serde_json::from_str::<Value>(&e.data).ok())
        .filter_map(|v| v["choices"][0]["delta"]["content"].as_str().map(String::from))
        .collect();

    // Both delivered chunks arrived, then the stream just ended: no [DONE].
    assert_eq!(contents, vec!["a", "b"]);
    assert!(events.iter().all(|e| e.data != "[DONE]"));

    let logs = gateway.wait_for_logs(1).await;
    assert_eq!(logs.len(), 1);

    let record = &logs[0].1;
    assert_eq!(record.status, AttemptStatus::Error);
    assert!(record.error.as_deref().unwrap().contains("upstream"));
    assert!(record.first_chunk_time_ms <= record.proxy_time_ms);

    // Post-commit failures never try the next candidate.
    assert!(fallback.captured.is_empty());
}
