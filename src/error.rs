// Gateway error taxonomy and its HTTP rendering.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::backend::UpstreamError;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Too many requests, try again later")]
    RateLimitExceeded,

    #[error("Invalid action: {0}")]
    UnknownAction(String),

    #[error("Invalid parameters received: {0}")]
    InvalidPayload(String),

    #[error("{0} requires streaming, which this host does not support")]
    UnsupportedOperation(&'static str),

    // the upstream detail is logged, never rendered
    #[error("The language model backend failed to handle the request")]
    UpstreamFailure(#[source] UpstreamError),
}

impl GatewayError {
    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self::InvalidPayload(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::UnknownAction(_) | GatewayError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            GatewayError::UnsupportedOperation(_) => StatusCode::NOT_IMPLEMENTED,
            GatewayError::UpstreamFailure(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            GatewayError::RateLimitExceeded => "rate_limit_exceeded",
            GatewayError::UnknownAction(_) => "unknown_action",
            GatewayError::InvalidPayload(_) => "invalid_request_error",
            GatewayError::UnsupportedOperation(_) => "unsupported_operation",
            GatewayError::UpstreamFailure(_) => "upstream_error",
        }
    }

    // JSON body shared by the HTTP and per-invocation hosts.
    pub fn body(&self) -> serde_json::Value {
        json!({
            "error": {
                "message": self.to_string(),
                "type": self.kind(),
                "code": self.status().as_u16(),
            }
        })
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}
