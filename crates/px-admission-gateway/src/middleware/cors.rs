//! Cross-origin policy.
//!
//! [`CorsPolicy`] rejects requests whose `Origin` is not allowed. Response
//! headers and preflight answers come from the tower-http layer built by
//! [`create_cors_layer`] from the same section of the config.

use async_trait::async_trait;
use axum::http::{header, HeaderName, Method};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer as TowerCorsLayer};

use super::{Admit, AdmissionRequest, Decision};
use crate::domain::config::CorsConfig;
use crate::domain::error::AdmissionError;

/// Create CORS layer from gateway config
pub fn create_cors_layer(config: &CorsConfig) -> TowerCorsLayer {
    if !config.enabled {
        return TowerCorsLayer::very_permissive();
    }

    let mut cors = TowerCorsLayer::new();

    if config.allowed_origins.iter().any(|o| o == "*") {
        cors = cors.allow_origin(Any);
    } else {
        let origins: Vec<_> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors = cors.allow_origin(origins);
    }

    let methods: Vec<Method> = config
        .allowed_methods
        .iter()
        .filter_map(|m| m.parse().ok())
        .collect();
    cors = cors.allow_methods(methods);

    if config.allowed_headers.iter().any(|h| h == "*") {
        cors = cors.allow_headers(Any);
    } else {
        cors = cors.allow_headers(header_names(&config.allowed_headers));
    }

    if !config.expose_headers.is_empty() {
        cors = cors.expose_headers(header_names(&config.expose_headers));
    }

    cors = cors.max_age(Duration::from_secs(config.max_age));

    if config.allow_credentials {
        cors = cors.allow_credentials(true);
    }

    cors
}

fn header_names(names: &[String]) -> Vec<HeaderName> {
    names.iter().filter_map(|h| h.parse().ok()).collect()
}

/// Origin gate.
pub struct CorsPolicy {
    config: Arc<CorsConfig>,
}

impl CorsPolicy {
    pub fn new(config: CorsConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

#[async_trait]
impl Admit for CorsPolicy {
    fn stage(&self) -> &'static str {
        "cors"
    }

    async fn admit(&self, request: &mut AdmissionRequest) -> Decision {
        if !self.config.enabled {
            return Decision::Continue;
        }
        let Some(origin) = request.parts.headers.get(header::ORIGIN) else {
            return Decision::Continue;
        };
        let origin = String::from_utf8_lossy(origin.as_bytes()).into_owned();
        if self.config.allows_origin(&origin) {
            Decision::Continue
        } else {
            Decision::Reject(AdmissionError::OriginNotAllowed(origin))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::test_support::admission;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn restricted() -> CorsConfig {
        CorsConfig {
            allowed_origins: vec!["https://www.microsoft.com".to_string()],
            ..CorsConfig::default()
        }
    }

    fn with_origin(origin: &str) -> AdmissionRequest {
        admission(
            Request::get("/v7.0/paymentMethodDescriptions")
                .header(header::ORIGIN, origin)
                .body(Body::empty())
                .unwrap(),
            true,
        )
    }

    #[tokio::test]
    async fn test_allowed_origin_continues() {
        let policy = CorsPolicy::new(restricted());
        let mut req = with_origin("https://WWW.microsoft.com");
        assert_eq!(policy.admit(&mut req).await, Decision::Continue);
    }

    #[tokio::test]
    async fn test_foreign_origin_rejected() {
        let policy = CorsPolicy::new(restricted());
        let mut req = with_origin("https://evil.example");
        assert_eq!(
            policy.admit(&mut req).await,
            Decision::Reject(AdmissionError::OriginNotAllowed(
                "https://evil.example".into()
            ))
        );
    }

    #[tokio::test]
    async fn test_no_origin_or_disabled_continues() {
        let policy = CorsPolicy::new(restricted());
        let mut req = admission(Request::get("/probe").body(Body::empty()).unwrap(), true);
        assert_eq!(policy.admit(&mut req).await, Decision::Continue);

        let policy = CorsPolicy::new(CorsConfig {
            enabled: false,
            ..restricted()
        });
        let mut req = with_origin("https://evil.example");
        assert_eq!(policy.admit(&mut req).await, Decision::Continue);
    }

    #[tokio::test]
    async fn test_layer_answers_preflight() {
        let app = Router::new()
            .route("/x", get(|| async { "ok" }))
            .layer(create_cors_layer(&restricted()));

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/x")
                    .header(header::ORIGIN, "https://www.microsoft.com")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://www.microsoft.com"
        );
    }
}
