//! Post-handler check that description documents are complete.
//!
//! Every `propertyName` referenced under a document's `displayDescription`
//! must have data somewhere under its `data_description`. Gaps are logged and
//! counted; the response is returned unchanged.

use axum::body::Body;
use axum::http::{Method, StatusCode};
use axum::response::Response;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::metrics::AdmissionMetrics;
use crate::adapters::error_conversions::is_json;
use crate::domain::correlation::CorrelationId;

/// Endpoints whose responses are PIDL document arrays.
pub const DESCRIPTION_ENDPOINTS: &[&str] = &[
    "addressDescriptions",
    "paymentMethodDescriptions",
    "profileDescriptions",
    "challengeDescriptions",
    "taxIdDescriptions",
];

pub struct ResponseCompletenessCheck {
    metrics: Arc<AdmissionMetrics>,
}

impl ResponseCompletenessCheck {
    pub fn new(metrics: Arc<AdmissionMetrics>) -> Self {
        Self { metrics }
    }

    pub fn applies_to(method: &Method, endpoint: Option<&str>, response: &Response) -> bool {
        method == Method::GET
            && response.status() == StatusCode::OK
            && endpoint.is_some_and(|e| {
                DESCRIPTION_ENDPOINTS
                    .iter()
                    .any(|d| d.eq_ignore_ascii_case(e))
            })
            && is_json(response)
    }

    pub async fn inspect(
        &self,
        method: &Method,
        endpoint: Option<&str>,
        correlation_id: CorrelationId,
        response: Response,
    ) -> Response {
        if !Self::applies_to(method, endpoint, &response) {
            return response;
        }

        let (parts, body) = response.into_parts();
        let bytes = match axum::body::to_bytes(body, usize::MAX).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(%correlation_id, error = %e, "Failed to buffer description response");
                return Response::from_parts(parts, Body::empty());
            }
        };

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Array(documents)) => {
                let mut incomplete = false;
                for missing in documents.iter().map(missing_display_properties) {
                    if !missing.is_empty() {
                        incomplete = true;
                        warn!(
                            %correlation_id,
                            endpoint = endpoint.unwrap_or_default(),
                            missing = ?missing,
                            "No data in data_description for display properties"
                        );
                    }
                }
                if incomplete {
                    self.metrics.record_incomplete_response();
                }
            }
            _ => {
                debug!(%correlation_id, "Description response is not a JSON array");
            }
        }

        Response::from_parts(parts, Body::from(bytes))
    }
}

/// Display properties of one document with no matching key in its data
/// description. Documents lacking either section are complete.
pub fn missing_display_properties(document: &Value) -> Vec<String> {
    let (Some(data), Some(display)) = (
        document.get("data_description"),
        document.get("displayDescription"),
    ) else {
        return Vec::new();
    };

    let mut referenced = Vec::new();
    collect_property_names(display, &mut referenced);

    referenced
        .into_iter()
        .filter(|name| !name.trim().is_empty() && !has_key(data, name))
        .map(str::to_string)
        .collect()
}

fn collect_property_names<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if key == "propertyName" {
                    if let Some(name) = child.as_str() {
                        out.push(name);
                    }
                }
                collect_property_names(child, out);
            }
        }
        Value::Array(items) => items.iter().for_each(|i| collect_property_names(i, out)),
        _ => {}
    }
}

fn has_key(value: &Value, key: &str) -> bool {
    match value {
        Value::Object(map) => map.contains_key(key) || map.values().any(|v| has_key(v, key)),
        Value::Array(items) => items.iter().any(|v| has_key(v, key)),
        _ => false,
    }
}
