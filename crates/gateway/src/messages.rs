//! Wire formats for the three supported dialects plus the unified
//! representation the transcoder pivots through.
//!
//! Transcoding only happens when the client and provider dialects differ;
//! same-dialect traffic is forwarded verbatim.

pub(crate) mod anthropic;
pub(crate) mod openai;
pub(crate) mod responses;
pub(crate) mod unified;

use serde_json::Value;

use crate::catalog::Dialect;
use crate::error::GatewayError;

use unified::{UnifiedRequest, UnifiedResponse};

impl Dialect {
    /// Parse a request body in this dialect into the unified representation.
    pub fn request_to_unified(self, body: &[u8]) -> Result<UnifiedRequest, GatewayError> {
        let bad = |e: serde_json::Error| GatewayError::BadRequest(format!("invalid {self} request: {e}"));

        match self {
            Dialect::OpenAiChat => {
                let req: openai::ChatRequest = serde_json::from_slice(body).map_err(bad)?;
                Ok(req.into())
            }
            Dialect::OpenAiResponses => {
                let req: responses::ResponsesRequest = serde_json::from_slice(body).map_err(bad)?;
                Ok(req.into())
            }
            Dialect::Anthropic => {
                let req: anthropic::MessagesRequest = serde_json::from_slice(body).map_err(bad)?;
                Ok(req.into())
            }
        }
    }

    /// Emit a unified request in this dialect.
    ///
    /// Returned as a JSON value: the dispatcher still overwrites the `model`
    /// field with the binding's provider-side name.
    pub fn request_from_unified(self, req: UnifiedRequest) -> Result<Value, GatewayError> {
        let value = match self {
            Dialect::OpenAiChat => serde_json::to_value(openai::ChatRequest::from(req)),
            Dialect::OpenAiResponses => serde_json::to_value(responses::ResponsesRequest::from(req)),
            Dialect::Anthropic => serde_json::to_value(anthropic::MessagesRequest::from(req)),
        };

        value.map_err(|e| GatewayError::Internal(format!("failed to serialize {self} request: {e}")))
    }

    /// Parse a complete upstream response body in this dialect.
    pub fn response_to_unified(self, body: &[u8]) -> Result<UnifiedResponse, GatewayError> {
        let invalid =
            |e: serde_json::Error| GatewayError::Connection(format!("invalid {self} response from upstream: {e}"));

        match self {
            Dialect::OpenAiChat => {
                let resp: openai::ChatResponse = serde_json::from_slice(body).map_err(invalid)?;
                Ok(resp.into())
            }
            Dialect::OpenAiResponses => {
                let resp: responses::ResponsesResponse = serde_json::from_slice(body).map_err(invalid)?;
                Ok(resp.into())
            }
            Dialect::Anthropic => {
                let resp: anthropic::MessagesResponse = serde_json::from_slice(body).map_err(invalid)?;
                Ok(resp.into())
            }
        }
    }

    /// Emit a unified response in this dialect.
    pub fn response_from_unified(self, resp: UnifiedResponse) -> Result<Vec<u8>, GatewayError> {
        let bytes = match self {
            Dialect::OpenAiChat => serde_json::to_vec(&openai::ChatResponse::from(resp)),
            Dialect::OpenAiResponses => serde_json::to_vec(&responses::ResponsesResponse::from(resp)),
            Dialect::Anthropic => serde_json::to_vec(&anthropic::MessagesResponse::from(resp)),
        };

        bytes.map_err(|e| GatewayError::Internal(format!("failed to serialize {self} response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    fn round_trip(dialect: Dialect, body: &str) -> (UnifiedRequest, UnifiedRequest) {
        let first = dialect.request_to_unified(body.as_bytes()).unwrap();
        let emitted = dialect.request_from_unified(first.clone()).unwrap();
        let second = dialect.request_to_unified(&serde_json::to_vec(&emitted).unwrap()).unwrap();
        (first, second)
    }

    #[test]
    fn openai_chat_request_round_trips() {
        let (first, second) = round_trip(
            Dialect::OpenAiChat,
            indoc! {r#"
                {
                  "model": "gpt-4o",
                  "messages": [
                    {"role": "system", "content": "Be terse."},
                    {"role": "user", "content": "hi"},
                    {"role": "assistant", "content": null, "tool_calls": [
                      {"id": "call_1", "type": "function",
                       "function": {"name": "lookup", "arguments": "{\"q\":\"x\"}"}}
                    ]},
                    {"role": "tool", "tool_call_id": "call_1", "content": "42"}
                  ],
                  "tools": [
                    {"type": "function", "function": {"name": "lookup", "description": "d",
                     "parameters": {"type": "object"}}}
                  ],
                  "max_tokens": 100,
                  "temperature": 0.5
                }
            "#},
        );

        assert_eq!(first, second);
        assert_eq!(first.system, "Be terse.");
        assert_eq!(first.messages.len(), 3);
        assert_eq!(first.tools.len(), 1);
    }

    #[test]
    fn anthropic_request_round_trips() {
        let (first, second) = round_trip(
            Dialect::Anthropic,
            indoc! {r#"
                {
                  "model": "claude-sonnet",
                  "max_tokens": 1024,
                  "system": "S",
                  "messages": [
                    {"role": "user", "content": "hi"},
                    {"role": "assistant", "content": [
                      {"type": "text", "text": "calling"},
                      {"type": "tool_use", "id": "toolu_1", "name": "lookup", "input": {"q": "x"}}
                    ]},
                    {"role": "user", "content": [
                      {"type": "tool_result", "tool_use_id": "toolu_1", "content": "42"}
                    ]}
                  ],
                  "tools": [{"name": "lookup", "input_schema": {"type": "object"}}]
                }
            "#},
        );

        assert_eq!(first, second);
        assert_eq!(first.system, "S");
        assert_eq!(first.max_tokens, 1024);
    }

    #[test]
    fn responses_request_round_trips() {
        let (first, second) = round_trip(
            Dialect::OpenAiResponses,
            indoc! {r#"
                {
                  "model": "gpt-4o",
                  "instructions": "Be helpful.",
                  "input": [
                    {"role": "user", "content": "hi"},
                    {"type": "function_call", "call_id": "c1", "name": "lookup",
                     "arguments": "{\"q\":\"x\"}"},
                    {"type": "function_call_output", "call_id": "c1", "output": "42"}
                  ],
                  "max_output_tokens": 64
                }
            "#},
        );

        assert_eq!(first, second);
        assert_eq!(first.system, "Be helpful.");
        assert_eq!(first.max_tokens, 64);
        assert_eq!(first.messages.len(), 3);
    }

    #[test]
    fn openai_system_message_lands_in_anthropic_system_field() {
        let unified = Dialect::OpenAiChat
            .request_to_unified(
                br#"{"model":"m","messages":[{"role":"system","content":"S"},{"role":"user","content":"hi"}]}"#,
            )
            .unwrap();

        let emitted = Dialect::Anthropic.request_from_unified(unified).unwrap();

        assert_eq!(emitted["system"], "S");
        assert_eq!(emitted["max_tokens"], 8192);
        assert_eq!(emitted["messages"].as_array().unwrap().len(), 1);
        assert_eq!(emitted["messages"][0]["role"], "user");
        assert_eq!(emitted["messages"][0]["content"], "hi");
    }

    #[test]
    fn multiple_system_messages_concatenate() {
        let unified = Dialect::OpenAiChat
            .request_to_unified(
                br#"{"model":"m","messages":[
                    {"role":"system","content":"A"},
                    {"role":"system","content":"B"},
                    {"role":"user","content":"hi"}]}"#,
            )
            .unwrap();

        assert_eq!(unified.system, "A\n\nB");
    }

    #[test]
    fn anthropic_system_becomes_leading_openai_message() {
        let unified = Dialect::Anthropic
            .request_to_unified(br#"{"model":"m","max_tokens":10,"system":"S","messages":[{"role":"user","content":"hi"}]}"#)
            .unwrap();

        let emitted = Dialect::OpenAiChat.request_from_unified(unified).unwrap();
        let messages = emitted["messages"].as_array().unwrap();

        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "S");
        assert_eq!(messages[1]["role"], "user");
    }

    #[test]
    fn anthropic_response_converts_to_openai_shape() {
        let body = indoc! {r#"
            {
              "id": "msg_01",
              "type": "message",
              "role": "assistant",
              "model": "claude-sonnet",
              "content": [{"type": "text", "text": "hello"}],
              "stop_reason": "end_turn",
              "usage": {"input_tokens": 10, "output_tokens": 5}
            }
        "#};

        let unified = Dialect::Anthropic.response_to_unified(body.as_bytes()).unwrap();
        let bytes = Dialect::OpenAiChat.response_from_unified(unified).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["object"], "chat.completion");
        assert_eq!(value["choices"][0]["message"]["content"], "hello");
        assert_eq!(value["choices"][0]["finish_reason"], "stop");
        assert_eq!(value["usage"]["prompt_tokens"], 10);
        assert_eq!(value["usage"]["completion_tokens"], 5);
        assert_eq!(value["usage"]["total_tokens"], 15);
    }

    #[test]
    fn openai_tool_response_converts_to_anthropic_blocks() {
        let body = indoc! {r#"
            {
              "id": "chatcmpl-1",
              "object": "chat.completion",
              "created": 1,
              "model": "gpt-4o",
              "choices": [{
                "index": 0,
                "message": {
                  "role": "assistant",
                  "tool_calls": [{"id": "call_1", "type": "function",
                    "function": {"name": "lookup", "arguments": "{\"q\":\"x\"}"}}]
                },
                "finish_reason": "tool_calls"
              }],
              "usage": {"prompt_tokens": 7, "completion_tokens": 3, "total_tokens": 10}
            }
        "#};

        let unified = Dialect::OpenAiChat.response_to_unified(body.as_bytes()).unwrap();
        let bytes = Dialect::Anthropic.response_from_unified(unified).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["stop_reason"], "tool_use");
        assert_eq!(value["content"][0]["type"], "tool_use");
        assert_eq!(value["content"][0]["name"], "lookup");
        assert_eq!(value["content"][0]["input"]["q"], "x");
        assert_eq!(value["usage"]["input_tokens"], 7);
    }
}
