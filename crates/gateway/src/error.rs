use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::catalog::Dialect;
use crate::storage::StoreError;

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Gateway errors with appropriate HTTP status codes.
///
/// Upstream failures are retryable: the dispatcher moves to the next
/// candidate as long as nothing has been written to the client.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Pre-parser failure: invalid JSON, missing or empty `model`.
    #[error("invalid request: {0}")]
    BadRequest(String),

    /// Missing or wrong API token.
    #[error("authentication failed")]
    Unauthorized,

    /// No model is registered under the requested public name.
    #[error("model '{0}' not found")]
    ModelNotFound(String),

    /// No enabled, capability-matching binding for this request.
    #[error("no provider binding can serve this request")]
    NoCandidate,

    /// The upstream did not return response headers within the model's
    /// timeout.
    #[error("upstream response-header timeout after {0}ms")]
    UpstreamTimeout(u64),

    /// Non-2xx upstream status. The body is propagated when all candidates
    /// are exhausted.
    #[error("upstream returned status {status}")]
    Upstream { status: u16, body: String },

    /// Transport-level failure talking to the upstream.
    #[error("upstream connection error: {0}")]
    Connection(String),

    /// Client closed the connection; nothing more is written.
    #[error("request cancelled by client")]
    Cancelled,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("internal error")]
    Internal(String),
}

impl GatewayError {
    /// Whether the dispatcher may try the next candidate.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::UpstreamTimeout(_) | GatewayError::Upstream { .. } | GatewayError::Connection(_)
        )
    }

    /// Status returned to the client when this error is final.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::ModelNotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::NoCandidate => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            GatewayError::Connection(_) => StatusCode::BAD_GATEWAY,
            // The connection is gone; the status is never observed.
            GatewayError::Cancelled => StatusCode::BAD_REQUEST,
            GatewayError::Store(_) | GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            GatewayError::BadRequest(_) => "invalid_request_error",
            GatewayError::Unauthorized => "authentication_error",
            GatewayError::ModelNotFound(_) => "not_found_error",
            GatewayError::NoCandidate => "overloaded_error",
            GatewayError::UpstreamTimeout(_) | GatewayError::Upstream { .. } | GatewayError::Connection(_) => {
                "api_error"
            }
            GatewayError::Cancelled => "invalid_request_error",
            GatewayError::Store(_) | GatewayError::Internal(_) => "internal_error",
        }
    }

    /// Message safe to expose to API consumers.
    fn client_message(&self) -> String {
        match self {
            GatewayError::Store(_) | GatewayError::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }

    /// Render this error in the client's dialect.
    ///
    /// An exhausted `Upstream` error propagates the last upstream body
    /// verbatim so the client sees what the provider said.
    pub fn into_response_for(self, dialect: Dialect) -> Response {
        let status = self.status_code();

        if let GatewayError::Upstream { body, .. } = &self
            && !body.is_empty()
        {
            return (
                status,
                [(http::header::CONTENT_TYPE, "application/json")],
                body.clone(),
            )
                .into_response();
        }

        match dialect {
            Dialect::OpenAiChat | Dialect::OpenAiResponses => {
                let body = OpenAiErrorResponse {
                    error: OpenAiErrorDetails {
                        message: self.client_message(),
                        r#type: self.error_type(),
                        code: status.as_u16(),
                    },
                };

                (status, Json(body)).into_response()
            }
            Dialect::Anthropic => {
                let body = AnthropicErrorResponse {
                    r#type: "error",
                    error: AnthropicErrorDetails {
                        r#type: self.error_type(),
                        message: self.client_message(),
                    },
                };

                (status, Json(body)).into_response()
            }
        }
    }
}

/// Error body compatible with the OpenAI API.
#[derive(Debug, Serialize)]
struct OpenAiErrorResponse {
    error: OpenAiErrorDetails,
}

#[derive(Debug, Serialize)]
struct OpenAiErrorDetails {
    message: String,
    r#type: &'static str,
    code: u16,
}

/// Error body compatible with the Anthropic API.
#[derive(Debug, Serialize)]
struct AnthropicErrorResponse {
    r#type: &'static str,
    error: AnthropicErrorDetails,
}

#[derive(Debug, Serialize)]
struct AnthropicErrorDetails {
    r#type: &'static str,
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_status_is_propagated() {
        let error = GatewayError::Upstream {
            status: 429,
            body: String::new(),
        };

        assert!(error.is_retryable());
        assert_eq!(error.status_code(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn internal_errors_do_not_leak() {
        let error = GatewayError::Internal("connection string".to_string());
        assert_eq!(error.client_message(), "internal server error");
    }
}
