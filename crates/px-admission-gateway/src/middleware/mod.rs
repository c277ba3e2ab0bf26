//! Admission stages.
//!
//! Stage order: Correlation → Version → CORS policy → Feature flags → Input
//! validation → Route gate → Authentication (+ authorization).
//!
//! Every stage implements [`Admit`]. A [`Decision::Reject`] stops every later
//! stage and the business handler. The response completeness check runs after
//! the handler and never rejects.

pub mod auth;
pub mod authorization;
pub mod correlation;
pub mod cors;
pub mod features;
pub mod identity_cache;
pub mod metrics;
pub mod response_check;
pub mod route_gate;
pub mod tracing;
pub mod transport;
pub mod validation;
pub mod version;

pub use auth::AuthenticationGate;
pub use authorization::AuthorizationPolicy;
pub use correlation::CorrelationStage;
pub use cors::{create_cors_layer, CorsPolicy};
pub use features::FeatureFlagStage;
pub use identity_cache::{CachedLookup, IdentityCache};
pub use metrics::{AdmissionMetrics, RequestTimer};
pub use response_check::ResponseCompletenessCheck;
pub use route_gate::RouteGate;
pub use tracing::AdmissionTraceLayer;
pub use transport::TransportInfo;
pub use validation::InputValidationGate;
pub use version::VersionResolver;

use async_trait::async_trait;
use axum::http::request::Parts;

use crate::domain::context::RequestContext;
use crate::domain::correlation::CorrelationId;
use crate::domain::error::AdmissionError;
use crate::domain::routes::{HandlerDescriptor, RequestPath};
use crate::ports::outbound::CancelSignal;

/// Outcome of one admission stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Reject(AdmissionError),
}

/// A request as it moves through the admission stages. The body stays with the
/// pipeline; stages only see the head.
#[derive(Debug)]
pub struct AdmissionRequest {
    pub parts: Parts,
    pub context: RequestContext,
    pub path: RequestPath,
    /// Whether the caller reached us over TLS.
    pub secure: bool,
    pub cancel: CancelSignal,
    /// Set by the route gate.
    pub route: Option<HandlerDescriptor>,
}

impl AdmissionRequest {
    pub fn new(parts: Parts, secure: bool, cancel: CancelSignal) -> Self {
        let path = RequestPath::parse(parts.uri.path());
        // Provisional id; the correlation stage replaces it.
        let mut context = RequestContext::new(CorrelationId::new());
        context.endpoint = path.endpoint.clone();
        context.account_id = path.account_id.clone();
        Self {
            parts,
            context,
            path,
            secure,
            cancel,
            route: None,
        }
    }

    /// Path and query as received, used in rejection messages.
    pub fn request_url(&self) -> String {
        self.parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| self.parts.uri.path().to_string())
    }
}

/// One admission stage.
#[async_trait]
pub trait Admit: Send + Sync {
    /// Stage name for logs and metrics.
    fn stage(&self) -> &'static str;

    async fn admit(&self, request: &mut AdmissionRequest) -> Decision;
}
