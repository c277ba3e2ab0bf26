//! Error conversions from and into infrastructure types.
//!
//! These conversions involve HTTP types and belong in the adapters layer.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::time::Duration;

use crate::domain::correlation::{CorrelationId, CORRELATION_HEADER};
use crate::domain::error::{codes, AdmissionError, CollaboratorError, ErrorBody};

impl From<reqwest::Error> for CollaboratorError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CollaboratorError::Timeout(0)
        } else if e.is_decode() {
            CollaboratorError::Malformed(e.to_string())
        } else {
            CollaboratorError::Transport(e.to_string())
        }
    }
}

/// A rejected request, rendered as a JSON error body.
#[derive(Debug, Clone)]
pub struct Rejection {
    pub error: AdmissionError,
    pub correlation_id: CorrelationId,
}

impl Rejection {
    pub fn new(error: AdmissionError, correlation_id: CorrelationId) -> Self {
        Self {
            error,
            correlation_id,
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let body = self.error.to_body(self.correlation_id);
        (self.error.status(), Json(body)).into_response()
    }
}

/// Response for a request that outlived the gateway's request timeout.
pub fn timeout_response(correlation_id: CorrelationId, limit: Duration) -> Response {
    let body = ErrorBody {
        error_code: codes::REQUEST_TIMEOUT.to_string(),
        message: format!("Request exceeded {}ms timeout", limit.as_millis()),
        correlation_id,
    };
    (StatusCode::GATEWAY_TIMEOUT, Json(body)).into_response()
}

/// Echo the correlation id on a response, replacing any value set downstream.
pub fn with_correlation(mut response: Response, correlation_id: CorrelationId) -> Response {
    response
        .headers_mut()
        .insert(CORRELATION_HEADER, correlation_id.to_header_value());
    response
}

pub(crate) fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| {
            let v = v.trim();
            v.eq_ignore_ascii_case("application/json") || v.to_ascii_lowercase().ends_with("+json")
        })
        .unwrap_or(false)
}
