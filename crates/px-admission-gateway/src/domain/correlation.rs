//! Correlation ID carried by every admitted or rejected request.
//!
//! Callers may supply one in `x-ms-correlation-id`; otherwise a UUID v7 is minted
//! so log lines from every stage of the pipeline sort by arrival time.

use axum::http::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Request header used to propagate the correlation id in both directions.
pub const CORRELATION_HEADER: &str = "x-ms-correlation-id";

/// Request header carrying the caller's tracking id (logged, never generated).
pub const TRACKING_HEADER: &str = "x-ms-tracking-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Mint a new time-ordered id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s.trim()).map(Self)
    }

    /// Reuse the caller's id when it is a well-formed UUID, else mint one.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(CORRELATION_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Self::parse(s).ok())
            .unwrap_or_default()
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Header value for echoing the id back on the response.
    pub fn to_header_value(&self) -> HeaderValue {
        // A hyphenated UUID is always visible ASCII.
        HeaderValue::from_str(&self.0.to_string()).unwrap_or(HeaderValue::from_static(""))
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for CorrelationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}
