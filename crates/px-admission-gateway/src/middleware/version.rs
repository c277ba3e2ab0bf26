//! Version resolution stage.
//!
//! The `api-version` header wins when it carries exactly one value; otherwise
//! the first `v<major>.<minor>/` path segment is used. Versionless endpoints
//! (the health probe) skip the stage.

use async_trait::async_trait;
use axum::http::HeaderMap;
use std::sync::Arc;
use tracing::debug;

use super::{Admit, AdmissionRequest, Decision};
use crate::domain::error::AdmissionError;
use crate::domain::routes::{ControllerRouteResolver, RequestPath};
use crate::domain::version::{ApiVersion, VersionCatalog};

pub const API_VERSION_HEADER: &str = "api-version";

/// Where the resolved version came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSource {
    Header(String),
    Url(String),
}

pub struct VersionResolver {
    catalog: Arc<VersionCatalog>,
    routes: Arc<ControllerRouteResolver>,
}

impl VersionResolver {
    pub fn new(catalog: Arc<VersionCatalog>, routes: Arc<ControllerRouteResolver>) -> Self {
        Self { catalog, routes }
    }

    /// Pick the version candidate for a request.
    pub fn candidate(
        headers: &HeaderMap,
        path: &RequestPath,
    ) -> Result<VersionSource, AdmissionError> {
        let mut values = headers
            .get_all(API_VERSION_HEADER)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|v| !v.is_empty());

        match (values.next(), values.next()) {
            (Some(_), Some(_)) => Err(AdmissionError::MultipleVersionHeaders),
            (Some(single), None) => Ok(VersionSource::Header(single.to_string())),
            (None, _) => path
                .version_segment
                .clone()
                .map(VersionSource::Url)
                .ok_or(AdmissionError::MissingVersion),
        }
    }

    /// Resolve a candidate against the catalog.
    pub fn resolve(&self, source: &VersionSource) -> Result<ApiVersion, AdmissionError> {
        let token = match source {
            VersionSource::Header(t) | VersionSource::Url(t) => t,
        };
        self.catalog
            .lookup(token)
            .cloned()
            .ok_or_else(|| AdmissionError::UnsupportedVersion(token.clone()))
    }
}

#[async_trait]
impl Admit for VersionResolver {
    fn stage(&self) -> &'static str {
        "version"
    }

    async fn admit(&self, request: &mut AdmissionRequest) -> Decision {
        if let Some(endpoint) = &request.path.endpoint {
            if self.routes.is_versionless(endpoint) {
                return Decision::Continue;
            }
        }

        let source = match Self::candidate(&request.parts.headers, &request.path) {
            Ok(source) => source,
            Err(e) => return Decision::Reject(e),
        };
        if let VersionSource::Header(raw) = &source {
            request.context.requested_version = Some(raw.clone());
        }

        match self.resolve(&source) {
            Ok(version) => {
                debug!(
                    correlation_id = %request.context.correlation_id,
                    version = %version,
                    source = ?source,
                    "Resolved api version"
                );
                request.context.api_version = Some(version);
                Decision::Continue
            }
            Err(e) => Decision::Reject(e),
        }
    }
}
