//! # Admission Flows
//!
//! Requests driven through the full router: CORS layer, trace layer and every
//! pipeline stage, with scripted token and certificate identity services.
//!
//! ## Flows Tested:
//!
//! 1. **Token authentication**: a valid bearer token reaches the handler with
//!    the partner on the context
//! 2. **Strict validation**: an invalid parameter is a 400 naming it
//! 3. **Plaintext**: a protected path over HTTP is a 403 with no auth calls
//! 4. **Unknown certificate**: a certificate matching no partner is a 401
//! 5. **Version gating**: a controller only registered under v7.0 is a 404
//!    under v6.0

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use axum::response::Response;
    use tower::ServiceExt;

    use px_admission_gateway::domain::context::{AuthAttempt, STRICT_PARAMETER_FEATURE};
    use px_admission_gateway::domain::correlation::{CorrelationId, CORRELATION_HEADER};
    use px_admission_gateway::domain::error::codes;
    use px_admission_gateway::domain::identity::{AuthMethod, ClientCertificate};
    use px_admission_gateway::middleware::transport::{TransportInfo, ARR_CLIENT_CERT_HEADER};

    use crate::integration::fixtures::*;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn certificate(common_name: &str) -> ClientCertificate {
        let mut params = rcgen::CertificateParams::default();
        params.distinguished_name = rcgen::DistinguishedName::new();
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, common_name);
        let key = rcgen::KeyPair::generate().unwrap();
        let cert = params.self_signed(&key).unwrap();
        ClientCertificate::from_der(cert.der().to_vec()).unwrap()
    }

    /// A GET arriving over TLS, optionally with a client certificate.
    fn tls_get(uri: &str, cert: Option<ClientCertificate>) -> axum::http::request::Builder {
        Request::get(uri).extension(TransportInfo::tls(cert))
    }

    fn scoped(account: &str, endpoint: &str, query: &str) -> String {
        format!("/v7.0/{account}/{endpoint}{query}")
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    // =============================================================================
    // CORE FLOWS
    // =============================================================================

    /// A token resolving to a known partner with a matching template.
    #[tokio::test]
    async fn test_token_authenticated_request_reaches_handler() {
        let harness = Harness::new(config());

        let response = harness
            .router()
            .oneshot(
                tls_get(
                    &scoped(COT_ACCOUNT, "paymentInstrumentsEx", "?country=us&piid=abc123"),
                    None,
                )
                .header("api-version", "v7.0")
                .header(header::AUTHORIZATION, format!("Bearer {GOOD_TOKEN}"))
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(CORRELATION_HEADER));
        assert_eq!(harness.handler.call_count(), 1);

        let context = harness.handler.last_context().unwrap();
        assert_eq!(context.partner_name(), Some("pxcot"));
        assert_eq!(context.caller_name, "pxcot");
        assert!(!context.input_validation_failed);
        assert_eq!(context.requested_version.as_deref(), Some("v7.0"));
        assert_eq!(
            context.identity.as_ref().unwrap().auth_method(),
            AuthMethod::Token
        );
        assert_eq!(context.auth_trace.token, AuthAttempt::Succeeded);
    }

    /// An invalid country under strict mode.
    #[tokio::test]
    async fn test_strict_mode_rejects_invalid_country() {
        let mut config = config();
        config.features.enabled.push(STRICT_PARAMETER_FEATURE.into());
        let harness = Harness::new(config);

        let response = harness
            .router()
            .oneshot(
                tls_get(
                    &scoped(COT_ACCOUNT, "paymentInstrumentsEx", "?country=USA&piid=abc123"),
                    None,
                )
                .header("api-version", "v7.0")
                .header(header::AUTHORIZATION, format!("Bearer {GOOD_TOKEN}"))
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["errorCode"], codes::INVALID_PARAMETER);
        let message = body["message"].as_str().unwrap();
        assert!(message.contains("country"));
        assert!(message.contains("USA"));
        assert_eq!(harness.handler.call_count(), 0);
        assert_eq!(harness.auth_calls(), 0);
    }

    /// Without strict mode the same request is admitted and marked.
    #[tokio::test]
    async fn test_soft_validation_marks_context() {
        let harness = Harness::new(config());

        let response = harness
            .router()
            .oneshot(
                tls_get(
                    &scoped(COT_ACCOUNT, "paymentInstrumentsEx", "?country=USA"),
                    None,
                )
                .header(header::AUTHORIZATION, format!("Bearer {GOOD_TOKEN}"))
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(harness.handler.last_context().unwrap().input_validation_failed);
        assert_eq!(harness.service.metrics().snapshot().validation_soft_failures, 1);
    }

    /// Plaintext to a protected path.
    #[tokio::test]
    async fn test_plaintext_protected_path_forbidden() {
        let harness = Harness::new(config());

        let response = harness
            .router()
            .oneshot(
                Request::get(scoped(COT_ACCOUNT, "paymentInstrumentsEx", ""))
                    .header(header::AUTHORIZATION, format!("Bearer {GOOD_TOKEN}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(harness.auth_calls(), 0);
        assert_eq!(harness.handler.call_count(), 0);
    }

    /// A certificate with an unregistered subject and no token.
    #[tokio::test]
    async fn test_unknown_certificate_subject_unauthorized() {
        let harness = Harness::new(config());

        let response = harness
            .router()
            .oneshot(
                tls_get(
                    &scoped(COT_ACCOUNT, "paymentInstrumentsEx", ""),
                    Some(certificate("stranger.example.com")),
                )
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["errorCode"], codes::UNAUTHORIZED);
        assert_eq!(harness.handler.call_count(), 0);
    }

    /// A controller only registered under v7.0, requested as v6.0.
    #[tokio::test]
    async fn test_controller_missing_for_version_not_found() {
        let harness = Harness::new(config());

        let response = harness
            .router()
            .oneshot(
                tls_get("/paymentInstrumentsEx", None)
                    .header("api-version", "v6.0")
                    .header(header::AUTHORIZATION, format!("Bearer {GOOD_TOKEN}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["errorCode"], codes::NO_CONTROLLER_MAPPED);
        assert_eq!(body["message"], "No controller mapped for version 'v6.0'.");
        assert_eq!(harness.handler.call_count(), 0);
        assert_eq!(harness.auth_calls(), 0);
    }

    // =============================================================================
    // ADDITIONAL FLOWS
    // =============================================================================

    #[tokio::test]
    async fn test_certificate_identity_cached_across_requests() {
        let harness = Harness::new(config());
        let cert = certificate(COT_SUBJECT);

        for _ in 0..2 {
            let response = harness
                .router()
                .oneshot(
                    tls_get(
                        &scoped(COT_ACCOUNT, "paymentInstrumentsEx", ""),
                        Some(cert.clone()),
                    )
                    .body(Body::empty())
                    .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        assert_eq!(
            harness
                .identities
                .calls
                .load(std::sync::atomic::Ordering::SeqCst),
            1
        );
        let snapshot = harness.service.metrics().snapshot();
        assert_eq!(snapshot.certificate_successes, 2);
        assert_eq!(snapshot.identity_cache_hits, 1);
        assert_eq!(snapshot.identity_cache_misses, 1);
    }

    /// TLS terminated at the front end, certificate forwarded in `X-ARR-ClientCert`.
    #[tokio::test]
    async fn test_forwarded_certificate_header_authenticates() {
        use base64::Engine;

        let harness = Harness::new(config());
        let encoded = base64::engine::general_purpose::STANDARD.encode(certificate(COT_SUBJECT).der());

        let response = harness
            .router()
            .oneshot(
                tls_get(&scoped(COT_ACCOUNT, "paymentInstrumentsEx", ""), None)
                    .header(ARR_CLIENT_CERT_HEADER, encoded)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let context = harness.handler.last_context().unwrap();
        assert_eq!(context.caller_name, "pxcot");
        assert_eq!(
            context.identity.as_ref().unwrap().auth_method(),
            AuthMethod::Certificate
        );
        assert_eq!(context.auth_trace.certificate, AuthAttempt::Succeeded);
    }

    #[tokio::test]
    async fn test_partner_denied_for_foreign_account() {
        let harness = Harness::new(config());

        let response = harness
            .router()
            .oneshot(
                tls_get(&scoped(OTHER_ACCOUNT, "paymentInstrumentsEx", ""), None)
                    .header(header::AUTHORIZATION, format!("Bearer {GOOD_TOKEN}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(harness.handler.call_count(), 0);
    }

    #[tokio::test]
    async fn test_partner_unauthenticated_path_admitted_anonymously() {
        let harness = Harness::new(config());

        let response = harness
            .router()
            .oneshot(
                tls_get("/pxservice/v7.0/paymentSessions", None)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["caller"], "AnonymousCaller");
        assert_eq!(harness.auth_calls(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_version_headers_rejected_first() {
        let harness = Harness::new(config());

        let response = harness
            .router()
            .oneshot(
                // Plaintext with an unregistered path: version is still checked first.
                Request::get("/nothing?bogus=1")
                    .header("api-version", "v7.0")
                    .header("api-version", "v6.0")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["errorCode"],
            codes::MULTIPLE_API_VERSIONS
        );
    }

    #[tokio::test]
    async fn test_caller_correlation_id_echoed_on_rejection() {
        let harness = Harness::new(config());
        let id = CorrelationId::new();

        let response = harness
            .router()
            .oneshot(
                Request::get("/v7.0/settings")
                    .header(CORRELATION_HEADER, id.to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            response.headers()[CORRELATION_HEADER],
            id.to_string().as_str()
        );
        assert_eq!(body_json(response).await["correlationId"], id.to_string());
    }

    #[tokio::test]
    async fn test_disallowed_origin_rejected() {
        let mut config = config();
        config.cors.allowed_origins = vec!["https://portal.example.com".into()];
        let harness = Harness::new(config);

        let response = harness
            .router()
            .oneshot(
                tls_get("/probe", None)
                    .header(header::ORIGIN, "https://evil.example.net")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            body_json(response).await["errorCode"],
            codes::ORIGIN_NOT_ALLOWED
        );
    }

    #[tokio::test]
    async fn test_incomplete_description_is_served_and_counted() {
        let document = serde_json::json!([{
            "data_description": { "address_line1": { "type": "string" } },
            "displayDescription": [{
                "members": [
                    { "propertyName": "address_line1" },
                    { "propertyName": "postal_code" }
                ]
            }]
        }]);
        let harness =
            Harness::with_handler(config(), RecordingHandler::returning(document.clone()));

        let response = harness
            .router()
            .oneshot(
                tls_get(&scoped(COT_ACCOUNT, "addressDescriptions", "?country=us"), None)
                    .method(Method::GET)
                    .header(header::AUTHORIZATION, format!("Bearer {GOOD_TOKEN}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, document);
        assert_eq!(harness.service.metrics().snapshot().incomplete_responses, 1);
    }

    #[tokio::test]
    async fn test_metrics_account_for_every_request() {
        let harness = Harness::new(config());
        let router = harness.router();

        let requests = [
            tls_get("/probe", None).body(Body::empty()).unwrap(),
            Request::get("/v7.0/settings").body(Body::empty()).unwrap(),
            tls_get("/v9.9/settings", None).body(Body::empty()).unwrap(),
        ];
        for request in requests {
            router.clone().oneshot(request).await.unwrap();
        }

        let snapshot = harness.service.metrics().snapshot();
        assert_eq!(snapshot.requests_total, 3);
        assert_eq!(snapshot.requests_admitted, 1);
        assert_eq!(snapshot.rejected_forbidden, 1);
        assert_eq!(snapshot.rejected_bad_request, 1);
    }
}
