//! Shared fixtures: a partner table, scripted collaborators and a handler that
//! records what it was called with.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use px_admission_gateway::domain::context::RequestContext;
use px_admission_gateway::domain::correlation::CorrelationId;
use px_admission_gateway::domain::error::CollaboratorError;
use px_admission_gateway::domain::identity::{
    ClientCertificate, FetchResult, IdentityClaim, IdentityFetch,
};
use px_admission_gateway::domain::partner::{CertificateRule, PartnerRecord, Role};
use px_admission_gateway::domain::version::InternalVersion;
use px_admission_gateway::ports::outbound::{
    CancelSignal, CertificateIdentityFetcher, TokenValidation, TokenValidator,
};
use px_admission_gateway::{
    AdmissionGatewayService, Collaborators, ControllerRouteResolver, EndpointHandler,
    GatewayConfig, PROBE_ENDPOINT, V7_CONTROLLERS,
};

pub const COT_APP_ID: &str = "7033F9B1-B4E6-4D49-9BDE-738D53C14AE9";
pub const COT_SUBJECT: &str = "px-cot.example.com";
pub const COT_ACCOUNT: &str = "18c69db8-dd2e-48a0-8887-1ccabd0bbcb2";
pub const OTHER_ACCOUNT: &str = "0f1e2d3c-4b5a-6978-8796-a5b4c3d2e1f0";
pub const GOOD_TOKEN: &str = "good-token";

pub fn cot_partner() -> PartnerRecord {
    PartnerRecord {
        name: "pxcot".into(),
        role: Role::Test,
        certificate_rule: Some(CertificateRule {
            subject: format!("CN={COT_SUBJECT}"),
            issuer: None,
            thumbprint: None,
        }),
        application_id: Some(COT_APP_ID.into()),
        allowed_authenticated_path_template: "/pxservice/v7.0/{0}".into(),
        allowed_accounts: vec![COT_ACCOUNT.into()],
        allowed_unauthenticated_paths: vec!["/v7.0/paymentSessions".into()],
    }
}

/// Default config with the test partner and v6.0 + v7.0 supported.
pub fn config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.versions.supported = vec!["v6.0".into(), "v7.0".into()];
    config.partners = vec![cot_partner()];
    config
}

/// Accepts [`GOOD_TOKEN`] as the test partner's application.
#[derive(Default)]
pub struct ScriptedTokenValidator {
    pub calls: AtomicUsize,
}

#[async_trait]
impl TokenValidator for ScriptedTokenValidator {
    async fn validate(
        &self,
        authorization: &str,
        _correlation_id: CorrelationId,
        _cancel: CancelSignal,
    ) -> Result<TokenValidation, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if authorization.ends_with(GOOD_TOKEN) {
            Ok(TokenValidation {
                success: true,
                application_id: Some(COT_APP_ID.to_lowercase()),
                message: String::new(),
            })
        } else {
            Ok(TokenValidation::failed("token rejected"))
        }
    }
}

/// Reports every certificate as authenticated under its own subject.
#[derive(Default)]
pub struct ScriptedIdentityFetcher {
    pub calls: AtomicUsize,
}

#[async_trait]
impl CertificateIdentityFetcher for ScriptedIdentityFetcher {
    async fn fetch(
        &self,
        certificate: &ClientCertificate,
        _force_fresh: bool,
        _cancel: CancelSignal,
    ) -> Result<IdentityFetch, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(IdentityFetch {
            result: FetchResult::Success,
            identities: vec![IdentityClaim {
                name: certificate.subject().to_string(),
                is_authenticated: true,
            }],
            message: String::new(),
        })
    }
}

/// Business handler that remembers the last context it saw. Responds with the
/// configured JSON body, or the caller name.
#[derive(Default)]
pub struct RecordingHandler {
    pub calls: AtomicUsize,
    pub last_context: Mutex<Option<Arc<RequestContext>>>,
    pub body: Option<serde_json::Value>,
}

impl RecordingHandler {
    pub fn returning(body: serde_json::Value) -> Self {
        Self {
            body: Some(body),
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_context(&self) -> Option<Arc<RequestContext>> {
        self.last_context.lock().clone()
    }
}

#[async_trait]
impl EndpointHandler for RecordingHandler {
    async fn handle(&self, context: Arc<RequestContext>, _request: Request<Body>) -> Response {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_context.lock() = Some(Arc::clone(&context));
        let body = self
            .body
            .clone()
            .unwrap_or_else(|| serde_json::json!({ "caller": context.caller_name }));
        Json(body).into_response()
    }
}

/// Everything a flow needs to drive and inspect the gateway.
pub struct Harness {
    pub service: AdmissionGatewayService,
    pub handler: Arc<RecordingHandler>,
    pub tokens: Arc<ScriptedTokenValidator>,
    pub identities: Arc<ScriptedIdentityFetcher>,
}

impl Harness {
    pub fn new(config: GatewayConfig) -> Self {
        Self::with_handler(config, RecordingHandler::default())
    }

    /// v7.0 controllers and the probe all go to `handler`.
    pub fn with_handler(config: GatewayConfig, handler: RecordingHandler) -> Self {
        let handler = Arc::new(handler);
        let tokens = Arc::new(ScriptedTokenValidator::default());
        let identities = Arc::new(ScriptedIdentityFetcher::default());

        let routes = Arc::new(
            ControllerRouteResolver::builder()
                .add_version(
                    InternalVersion::new(7, 0),
                    V7_CONTROLLERS,
                    Arc::clone(&handler) as Arc<dyn EndpointHandler>,
                )
                .add_versionless(PROBE_ENDPOINT, Arc::clone(&handler) as Arc<dyn EndpointHandler>)
                .build(),
        );
        let collaborators = Collaborators {
            token_validator: Some(Arc::clone(&tokens) as Arc<dyn TokenValidator>),
            identity_fetcher: Some(
                Arc::clone(&identities) as Arc<dyn CertificateIdentityFetcher>
            ),
            ..Collaborators::default()
        };

        let service = AdmissionGatewayService::new(config, routes, collaborators)
            .expect("test config is valid");
        Self {
            service,
            handler,
            tokens,
            identities,
        }
    }

    pub fn router(&self) -> Router {
        self.service.router()
    }

    pub fn auth_calls(&self) -> usize {
        self.tokens.calls.load(Ordering::SeqCst) + self.identities.calls.load(Ordering::SeqCst)
    }
}
