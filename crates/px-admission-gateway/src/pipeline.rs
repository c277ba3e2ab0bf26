//! The admission pipeline.
//!
//! [`RequestPipeline::run`] takes a request through every [`Admit`] stage in
//! order, dispatches it to the resolved handler and checks the response. The
//! first rejection short-circuits everything after it. [`AdmissionService`]
//! exposes the pipeline to axum as a `tower::Service`.

use axum::body::Body;
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::Service;
use tracing::{debug, warn, Span};

use crate::adapters::cancel::CancelGuard;
use crate::adapters::error_conversions::{timeout_response, with_correlation, Rejection};
use crate::adapters::features::StaticFeatureFlags;
use crate::domain::config::GatewayConfig;
use crate::domain::error::AdmissionError;
use crate::domain::partner::PartnerDirectory;
use crate::domain::routes::ControllerRouteResolver;
use crate::domain::version::VersionCatalog;
use crate::middleware::{
    transport, Admit, AdmissionMetrics, AdmissionRequest, AuthenticationGate, CorrelationStage,
    CorsPolicy, Decision, FeatureFlagStage, IdentityCache, InputValidationGate, RequestTimer,
    ResponseCompletenessCheck, RouteGate, VersionResolver,
};
use crate::ports::outbound::{
    CertificateIdentityFetcher, FeatureFlagResolver, SystemTimeSource, TimeSource, TokenValidator,
};

pub struct RequestPipeline {
    stages: Vec<Box<dyn Admit>>,
    response_check: ResponseCompletenessCheck,
    identity_cache: Option<Arc<IdentityCache>>,
    metrics: Arc<AdmissionMetrics>,
    trust_forwarded_proto: bool,
    request_timeout: Duration,
}

impl RequestPipeline {
    pub fn builder(config: GatewayConfig, routes: Arc<ControllerRouteResolver>) -> PipelineBuilder {
        PipelineBuilder {
            config,
            routes,
            token_validator: None,
            identity_fetcher: None,
            feature_flags: None,
            clock: Arc::new(SystemTimeSource),
            metrics: Arc::new(AdmissionMetrics::new()),
        }
    }

    pub fn metrics(&self) -> Arc<AdmissionMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn identity_cache(&self) -> Option<Arc<IdentityCache>> {
        self.identity_cache.clone()
    }

    /// Stage names in execution order.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.stage()).collect()
    }

    /// Admit, dispatch and check one request. Never fails: every outcome is a
    /// response carrying the correlation id.
    pub async fn run(&self, request: Request<Body>) -> Response {
        let timer = RequestTimer::new(Arc::clone(&self.metrics));
        let (guard, cancel) = CancelGuard::channel();

        let (parts, body) = request.into_parts();
        let secure = transport::is_secure(&parts, self.trust_forwarded_proto);
        let mut admission = AdmissionRequest::new(parts, secure, cancel);

        let outcome =
            tokio::time::timeout(self.request_timeout, self.admit_and_dispatch(&mut admission, body))
                .await;
        let correlation_id = admission.context.correlation_id;

        let response = match outcome {
            Ok(response) => response,
            Err(_) => {
                guard.cancel();
                self.metrics.record_timeout();
                warn!(
                    %correlation_id,
                    timeout_ms = self.request_timeout.as_millis() as u64,
                    "Request timed out"
                );
                timeout_response(correlation_id, self.request_timeout)
            }
        };
        drop(guard);

        debug!(
            %correlation_id,
            status = response.status().as_u16(),
            latency_ms = timer.elapsed_ms(),
            "Request finished"
        );
        timer.finish();
        with_correlation(response, correlation_id)
    }

    async fn admit_and_dispatch(&self, admission: &mut AdmissionRequest, body: Body) -> Response {
        for stage in &self.stages {
            if let Decision::Reject(error) = stage.admit(admission).await {
                return self.reject(admission, stage.stage(), error);
            }
        }

        let Some(route) = admission.route.clone() else {
            let error = AdmissionError::NoControllerMapped {
                requested: admission.context.requested_version.clone(),
            };
            return self.reject(admission, "dispatch", error);
        };

        let correlation_id = admission.context.correlation_id;
        Span::current().record("caller", admission.context.caller_name.as_str());
        self.metrics.record_admitted();
        debug!(
            %correlation_id,
            handler = %route.name,
            caller = %admission.context.caller_name,
            input_validation_failed = admission.context.input_validation_failed,
            "Request admitted"
        );

        let method = admission.parts.method.clone();
        let context = Arc::new(admission.context.clone());
        let request = Request::from_parts(admission.parts.clone(), body);
        let response = route.handler.handle(Arc::clone(&context), request).await;

        self.response_check
            .inspect(&method, context.endpoint.as_deref(), correlation_id, response)
            .await
    }

    fn reject(
        &self,
        admission: &AdmissionRequest,
        stage: &'static str,
        error: AdmissionError,
    ) -> Response {
        let correlation_id = admission.context.correlation_id;
        warn!(
            %correlation_id,
            stage,
            code = error.code(),
            reason = %error,
            "Request rejected"
        );
        self.metrics.record_rejection(&error);
        Rejection::new(error, correlation_id).into_response()
    }
}

/// Assembles a [`RequestPipeline`] from configuration and collaborators.
pub struct PipelineBuilder {
    config: GatewayConfig,
    routes: Arc<ControllerRouteResolver>,
    token_validator: Option<Arc<dyn TokenValidator>>,
    identity_fetcher: Option<Arc<dyn CertificateIdentityFetcher>>,
    feature_flags: Option<Arc<dyn FeatureFlagResolver>>,
    clock: Arc<dyn TimeSource>,
    metrics: Arc<AdmissionMetrics>,
}

impl PipelineBuilder {
    pub fn token_validator(mut self, validator: Arc<dyn TokenValidator>) -> Self {
        self.token_validator = Some(validator);
        self
    }

    pub fn identity_fetcher(mut self, fetcher: Arc<dyn CertificateIdentityFetcher>) -> Self {
        self.identity_fetcher = Some(fetcher);
        self
    }

    /// Defaults to the statically configured `features.enabled` set.
    pub fn feature_flags(mut self, resolver: Arc<dyn FeatureFlagResolver>) -> Self {
        self.feature_flags = Some(resolver);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = clock;
        self
    }

    pub fn metrics(mut self, metrics: Arc<AdmissionMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn build(self) -> RequestPipeline {
        let config = self.config;
        let metrics = self.metrics;

        let catalog = Arc::new(VersionCatalog::from_tokens(
            config.versions.supported.iter().map(String::as_str),
        ));
        let directory = Arc::new(PartnerDirectory::new(config.partners.iter().cloned()));
        let feature_flags = self.feature_flags.unwrap_or_else(|| {
            Arc::new(StaticFeatureFlags::new(&config.features.enabled)) as Arc<dyn FeatureFlagResolver>
        });

        let identity_cache = self.identity_fetcher.map(|fetcher| {
            Arc::new(IdentityCache::new(
                fetcher,
                config.identity_cache.ttl,
                self.clock,
                config.auth.certificate_timeout,
                config.auth.force_fresh_certificate_fetch,
                Arc::clone(&metrics),
            ))
        });

        let mut auth = AuthenticationGate::new(
            directory,
            &config.security,
            config.auth.token_timeout,
            Arc::clone(&metrics),
        );
        if let Some(validator) = self.token_validator {
            auth = auth.with_token_validator(validator);
        }
        if let Some(cache) = &identity_cache {
            auth = auth.with_identity_cache(Arc::clone(cache));
        }

        let stages: Vec<Box<dyn Admit>> = vec![
            Box::new(CorrelationStage),
            Box::new(VersionResolver::new(catalog, Arc::clone(&self.routes))),
            Box::new(CorsPolicy::new(config.cors.clone())),
            Box::new(FeatureFlagStage::new(feature_flags)),
            Box::new(InputValidationGate::new(
                config.validation.clone(),
                Arc::clone(&metrics),
            )),
            Box::new(RouteGate::new(self.routes)),
            Box::new(auth),
        ];

        RequestPipeline {
            stages,
            response_check: ResponseCompletenessCheck::new(Arc::clone(&metrics)),
            identity_cache,
            metrics,
            trust_forwarded_proto: config.security.trust_forwarded_proto,
            request_timeout: config.http.request_timeout,
        }
    }
}

/// The pipeline as a `tower::Service`, for use as an axum fallback.
#[derive(Clone)]
pub struct AdmissionService {
    pipeline: Arc<RequestPipeline>,
}

impl AdmissionService {
    pub fn new(pipeline: Arc<RequestPipeline>) -> Self {
        Self { pipeline }
    }
}

impl Service<Request<Body>> for AdmissionService {
    type Response = Response;
    type Error = Infallible;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let pipeline = Arc::clone(&self.pipeline);
        Box::pin(async move { Ok(pipeline.run(req).await) })
    }
}
