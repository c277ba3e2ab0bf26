//! Admission error taxonomy.
//!
//! Every terminal decision of the pipeline is one [`AdmissionError`]. Each maps to
//! a status code and a stable error code string; the message names the offending
//! input and nothing else (no cache contents, latencies or directory internals).

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use super::correlation::CorrelationId;

/// Stable error codes written into the `errorCode` field of rejection bodies.
pub mod codes {
    pub const NO_API_VERSION: &str = "NoApiVersion";
    pub const MULTIPLE_API_VERSIONS: &str = "MultipleApiVersions";
    pub const INVALID_API_VERSION: &str = "InvalidApiVersion";
    pub const INVALID_PARAMETER: &str = "InvalidParameter";
    pub const UNAUTHORIZED: &str = "Unauthorized";
    pub const FORBIDDEN: &str = "Forbidden";
    pub const ORIGIN_NOT_ALLOWED: &str = "OriginNotAllowed";
    pub const NO_CONTROLLER_MAPPED: &str = "NoControllerMapped";
    pub const REQUEST_TIMEOUT: &str = "RequestTimeout";
}

/// Message returned when neither token nor certificate produced a partner.
pub const CERT_REQUIRED: &str = "A valid client certificate or bearer token is required.";

/// Message returned when a partner is known but not permitted for the URI.
pub const ACCESS_DENIED: &str = "The caller is not authorized for the requested resource.";

/// Message returned for plaintext calls to protected paths.
pub const PROTOCOL_NOT_SUPPORTED: &str = "The requested resource requires HTTPS.";

/// A terminal admission failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    #[error("The request does not specify an api-version header or a version segment in the URL.")]
    MissingVersion,

    #[error("The request specifies more than one api-version header value.")]
    MultipleVersionHeaders,

    #[error("The api-version '{0}' is not supported.")]
    UnsupportedVersion(String),

    #[error("The parameter {name} value {value} is invalid in the request URL: {url}.")]
    ParameterValidationFailed {
        name: String,
        value: String,
        url: String,
    },

    #[error("The parameter {name} or value {value} is null or invalid in the request URL: {url}.")]
    UnknownParameter {
        name: String,
        value: String,
        url: String,
    },

    #[error("{}", CERT_REQUIRED)]
    AuthenticationFailed,

    #[error("{}", ACCESS_DENIED)]
    AuthorizationDenied,

    #[error("{}", PROTOCOL_NOT_SUPPORTED)]
    ProtocolNotSupported,

    #[error("The origin '{0}' is not allowed.")]
    OriginNotAllowed(String),

    /// Carries the raw `api-version` header value, not the resolved version.
    #[error("No controller mapped for version '{}'.", .requested.as_deref().unwrap_or("(none)"))]
    NoControllerMapped { requested: Option<String> },
}

impl AdmissionError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingVersion
            | Self::MultipleVersionHeaders
            | Self::UnsupportedVersion(_)
            | Self::ParameterValidationFailed { .. }
            | Self::UnknownParameter { .. } => StatusCode::BAD_REQUEST,
            Self::AuthenticationFailed | Self::AuthorizationDenied => StatusCode::UNAUTHORIZED,
            Self::ProtocolNotSupported | Self::OriginNotAllowed(_) => StatusCode::FORBIDDEN,
            Self::NoControllerMapped { .. } => StatusCode::NOT_FOUND,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingVersion => codes::NO_API_VERSION,
            Self::MultipleVersionHeaders => codes::MULTIPLE_API_VERSIONS,
            Self::UnsupportedVersion(_) => codes::INVALID_API_VERSION,
            Self::ParameterValidationFailed { .. } | Self::UnknownParameter { .. } => {
                codes::INVALID_PARAMETER
            }
            Self::AuthenticationFailed | Self::AuthorizationDenied => codes::UNAUTHORIZED,
            Self::ProtocolNotSupported => codes::FORBIDDEN,
            Self::OriginNotAllowed(_) => codes::ORIGIN_NOT_ALLOWED,
            Self::NoControllerMapped { .. } => codes::NO_CONTROLLER_MAPPED,
        }
    }

    /// Short label used in logs and metrics.
    pub fn class(&self) -> &'static str {
        match self.status() {
            StatusCode::BAD_REQUEST => "bad_request",
            StatusCode::UNAUTHORIZED => "unauthorized",
            StatusCode::FORBIDDEN => "forbidden",
            _ => "not_found",
        }
    }

    pub fn to_body(&self, correlation_id: CorrelationId) -> ErrorBody {
        ErrorBody {
            error_code: self.code().to_string(),
            message: self.to_string(),
            correlation_id,
        }
    }
}

/// JSON body of a rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error_code: String,
    pub message: String,
    pub correlation_id: CorrelationId,
}

/// Failure of an external collaborator call. Always recovered at the call site.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CollaboratorError {
    #[error("collaborator call timed out after {0} ms")]
    Timeout(u64),

    #[error("collaborator call cancelled")]
    Cancelled,

    #[error("collaborator transport error: {0}")]
    Transport(String),

    #[error("collaborator returned malformed response: {0}")]
    Malformed(String),
}

/// Gateway-level errors (startup and serving, never per request).
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server bind error: {0}")]
    Bind(String),

    #[error("server error: {0}")]
    Serve(String),

    #[error("shutdown in progress")]
    ShuttingDown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AdmissionError::MissingVersion.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AdmissionError::MultipleVersionHeaders.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AdmissionError::AuthenticationFailed.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AdmissionError::AuthorizationDenied.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AdmissionError::ProtocolNotSupported.status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AdmissionError::NoControllerMapped { requested: None }.status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_unsupported_version_names_token() {
        let err = AdmissionError::UnsupportedVersion("v9.9".into());
        assert!(err.to_string().contains("v9.9"));
        assert_eq!(err.code(), codes::INVALID_API_VERSION);
    }

    #[test]
    fn test_parameter_message_names_input() {
        let err = AdmissionError::ParameterValidationFailed {
            name: "country".into(),
            value: "USA".into(),
            url: "https://px.example/v7.0/x?country=USA".into(),
        };
        assert_eq!(
            err.to_string(),
            "The parameter country value USA is invalid in the request URL: https://px.example/v7.0/x?country=USA."
        );
    }

    #[test]
    fn test_no_controller_message_uses_placeholder() {
        let missing = AdmissionError::NoControllerMapped { requested: None };
        assert_eq!(missing.to_string(), "No controller mapped for version '(none)'.");

        let given = AdmissionError::NoControllerMapped {
            requested: Some("v6.0".into()),
        };
        assert_eq!(given.to_string(), "No controller mapped for version 'v6.0'.");
    }

    #[test]
    fn test_error_body_serialization() {
        let id = CorrelationId::new();
        let body = AdmissionError::ProtocolNotSupported.to_body(id);
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["errorCode"], "Forbidden");
        assert_eq!(json["correlationId"], id.to_string());
    }
}
