//! First look at the raw client body.
//!
//! The pre-parser pulls out the fields routing needs (model, stream flag,
//! capability hints) without touching the body itself; the original bytes
//! are retained verbatim so a retry never re-reads the client.

use axum::body::Bytes;
use serde_json::Value;

use crate::catalog::{Capabilities, Dialect};
use crate::error::GatewayError;

/// The routing-relevant view of a client request body.
#[derive(Debug, Clone)]
pub struct PreParsed {
    /// Public model name. Required, non-empty.
    pub model: String,
    pub stream: bool,
    /// 0 when the request does not set a limit.
    pub max_tokens: u64,
    /// Capabilities the request needs a binding to have.
    pub required: Capabilities,
    /// Concatenated message text, kept for optional I/O logging.
    pub input_text: String,
    /// The client body, byte for byte.
    pub body: Bytes,
}

impl PreParsed {
    pub fn parse(dialect: Dialect, body: Bytes) -> Result<Self, GatewayError> {
        let root: Value = serde_json::from_slice(&body)
            .map_err(|e| GatewayError::BadRequest(format!("body is not valid JSON: {e}")))?;

        let Some(obj) = root.as_object() else {
            return Err(GatewayError::BadRequest("body must be a JSON object".to_string()));
        };

        let model = obj
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if model.is_empty() {
            return Err(GatewayError::BadRequest("missing required field: model".to_string()));
        }

        let stream = obj.get("stream").and_then(Value::as_bool).unwrap_or(false);

        let max_tokens = match dialect {
            Dialect::OpenAiResponses => obj.get("max_output_tokens"),
            Dialect::OpenAiChat => obj.get("max_tokens").or_else(|| obj.get("max_completion_tokens")),
            Dialect::Anthropic => obj.get("max_tokens"),
        }
        .and_then(Value::as_u64)
        .unwrap_or(0);

        let tool_call = ["tools", "tool_choice", "functions"]
            .iter()
            .any(|key| obj.get(*key).is_some_and(|v| !v.is_null()));

        let structured_output = obj.get("response_format").is_some_and(Value::is_object)
            || obj
                .get("text")
                .and_then(|t| t.get("format"))
                .is_some_and(Value::is_object);

        let items = match dialect {
            Dialect::OpenAiResponses => obj.get("input"),
            _ => obj.get("messages"),
        };

        let image = items
            .and_then(Value::as_array)
            .is_some_and(|msgs| msgs.iter().any(message_has_image));

        let input_text = items
            .and_then(Value::as_array)
            .map(|msgs| collect_text(msgs, obj))
            .unwrap_or_else(|| {
                // Responses accepts a bare string input.
                obj.get("input").and_then(Value::as_str).unwrap_or_default().to_string()
            });

        Ok(Self {
            model,
            stream,
            max_tokens,
            required: Capabilities {
                tool_call,
                structured_output,
                image,
            },
            input_text,
            body,
        })
    }
}

fn message_has_image(message: &Value) -> bool {
    let Some(parts) = message.get("content").and_then(Value::as_array) else {
        return false;
    };

    parts.iter().any(|part| {
        part.get("type")
            .and_then(Value::as_str)
            .is_some_and(|t| matches!(t, "image" | "image_url" | "input_image"))
    })
}

fn collect_text(messages: &[Value], root: &serde_json::Map<String, Value>) -> String {
    let mut out = String::new();

    if let Some(system) = root.get("system").and_then(Value::as_str) {
        out.push_str(system);
    }

    for message in messages {
        let text = match message.get("content") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Array(parts)) => parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n"),
            _ => continue,
        };

        if text.is_empty() {
            continue;
        }

        if !out.is_empty() {
            out.push('\n');
        }

        out.push_str(&text);
    }

    out
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    fn parse(dialect: Dialect, body: &str) -> Result<PreParsed, GatewayError> {
        PreParsed::parse(dialect, Bytes::copy_from_slice(body.as_bytes()))
    }

    #[test]
    fn extracts_routing_fields() {
        let pre = parse(
            Dialect::OpenAiChat,
            indoc! {r#"
                {
                  "model": "gpt-4o",
                  "stream": true,
                  "max_tokens": 512,
                  "messages": [{"role": "user", "content": "hi"}]
                }
            "#},
        )
        .unwrap();

        assert_eq!(pre.model, "gpt-4o");
        assert!(pre.stream);
        assert_eq!(pre.max_tokens, 512);
        assert!(!pre.required.tool_call);
        assert_eq!(pre.input_text, "hi");
    }

    #[test]
    fn detects_tool_and_image_capabilities() {
        let pre = parse(
            Dialect::OpenAiChat,
            indoc! {r#"
                {
                  "model": "gpt-4o",
                  "tools": [{"type": "function", "function": {"name": "f", "parameters": {}}}],
                  "messages": [
                    {"role": "user", "content": [
                      {"type": "text", "text": "describe"},
                      {"type": "image_url", "image_url": {"url": "https://example.com/x.png"}}
                    ]}
                  ]
                }
            "#},
        )
        .unwrap();

        assert!(pre.required.tool_call);
        assert!(pre.required.image);
        assert!(!pre.required.structured_output);
    }

    #[test]
    fn detects_structured_output() {
        let pre = parse(
            Dialect::OpenAiChat,
            r#"{"model":"m","response_format":{"type":"json_object"},"messages":[]}"#,
        )
        .unwrap();

        assert!(pre.required.structured_output);

        // A plain string response_format does not count.
        let pre = parse(
            Dialect::OpenAiChat,
            r#"{"model":"m","response_format":"json","messages":[]}"#,
        )
        .unwrap();

        assert!(!pre.required.structured_output);
    }

    #[test]
    fn responses_dialect_reads_input_and_output_token_cap() {
        let pre = parse(
            Dialect::OpenAiResponses,
            r#"{"model":"m","max_output_tokens":128,"input":"hello"}"#,
        )
        .unwrap();

        assert_eq!(pre.max_tokens, 128);
        assert_eq!(pre.input_text, "hello");
    }

    #[test]
    fn rejects_missing_model() {
        let error = parse(Dialect::OpenAiChat, r#"{"messages":[]}"#).unwrap_err();
        assert!(matches!(error, GatewayError::BadRequest(_)));

        let error = parse(Dialect::OpenAiChat, r#"{"model":"","messages":[]}"#).unwrap_err();
        assert!(matches!(error, GatewayError::BadRequest(_)));
    }

    #[test]
    fn rejects_non_object_body() {
        let error = parse(Dialect::Anthropic, r#"[1,2,3]"#).unwrap_err();
        assert!(matches!(error, GatewayError::BadRequest(_)));
    }

    #[test]
    fn body_is_retained_verbatim() {
        let body = r#"{"model":"m",   "messages":[],"unknown_field":{"kept":true}}"#;
        let pre = parse(Dialect::OpenAiChat, body).unwrap();
        assert_eq!(pre.body.as_ref(), body.as_bytes());
    }
}
