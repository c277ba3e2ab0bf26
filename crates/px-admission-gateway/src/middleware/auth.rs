//! Authentication and authorization stage.
//!
//! Secure requests to the probe or an allow-listed path are admitted
//! anonymously. Everything else secure must authenticate: a bearer token
//! first, then the client certificate. A partner found by either path is then
//! checked against [`AuthorizationPolicy`]. Plaintext requests are only
//! admitted anonymously.

use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::authorization::{path_has_prefix, AuthorizationPolicy};
use super::identity_cache::IdentityCache;
use super::metrics::AdmissionMetrics;
use super::transport;
use super::{Admit, AdmissionRequest, Decision};
use crate::adapters::cancel::guarded;
use crate::domain::config::SecurityConfig;
use crate::domain::context::AuthAttempt;
use crate::domain::error::AdmissionError;
use crate::domain::identity::{normalize_distinguished_name, AuthMethod, ResolvedIdentity};
use crate::domain::partner::{PartnerDirectory, PartnerRecord};
use crate::domain::routes::{is_version_segment, PROBE_ENDPOINT};
use crate::ports::outbound::TokenValidator;

pub struct AuthenticationGate {
    directory: Arc<PartnerDirectory>,
    policy: AuthorizationPolicy,
    token_validator: Option<Arc<dyn TokenValidator>>,
    token_timeout: Duration,
    identity_cache: Option<Arc<IdentityCache>>,
    allow_unauthenticated_http: bool,
    allow_unauthenticated_https: bool,
    /// Configured paths plus every partner's declared paths.
    unauthenticated_paths: Vec<String>,
    metrics: Arc<AdmissionMetrics>,
}

impl AuthenticationGate {
    pub fn new(
        directory: Arc<PartnerDirectory>,
        security: &SecurityConfig,
        token_timeout: Duration,
        metrics: Arc<AdmissionMetrics>,
    ) -> Self {
        let mut unauthenticated_paths: Vec<String> = security
            .unauthenticated_paths
            .iter()
            .map(String::as_str)
            .chain(directory.unauthenticated_paths())
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        unauthenticated_paths.sort_by_key(|p| p.to_ascii_lowercase());
        unauthenticated_paths.dedup_by(|a, b| a.eq_ignore_ascii_case(b));

        Self {
            directory,
            policy: AuthorizationPolicy::new(),
            token_validator: None,
            token_timeout,
            identity_cache: None,
            allow_unauthenticated_http: security.allow_unauthenticated_http,
            allow_unauthenticated_https: security.allow_unauthenticated_https,
            unauthenticated_paths,
            metrics,
        }
    }

    pub fn with_token_validator(mut self, validator: Arc<dyn TokenValidator>) -> Self {
        self.token_validator = Some(validator);
        self
    }

    pub fn with_identity_cache(mut self, cache: Arc<IdentityCache>) -> Self {
        self.identity_cache = Some(cache);
        self
    }

    /// Probe and allow-listed paths need no credentials.
    pub fn is_exempt(&self, request: &AdmissionRequest) -> bool {
        let path = request.parts.uri.path();
        if is_probe_path(path) {
            return true;
        }
        let unprefixed = strip_service_segment(path);
        self.unauthenticated_paths
            .iter()
            .any(|allowed| path_has_prefix(path, allowed) || path_has_prefix(unprefixed, allowed))
    }

    fn bypass(&self, request: &mut AdmissionRequest) -> Decision {
        request.context.auth_trace.token = AuthAttempt::Bypassed;
        request.context.auth_trace.certificate = AuthAttempt::Bypassed;
        request.context.set_identity(ResolvedIdentity::anonymous());
        self.metrics.record_authenticated(AuthMethod::AnonymousBypass);
        debug!(
            correlation_id = %request.context.correlation_id,
            secure = request.secure,
            "Admitted anonymously"
        );
        Decision::Continue
    }

    async fn authenticate_token(&self, request: &mut AdmissionRequest) -> Option<Arc<PartnerRecord>> {
        let correlation_id = request.context.correlation_id;
        let header = request
            .parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let Some(header) = header.filter(|h| bearer_token(h).is_some()) else {
            request.context.auth_trace.token = AuthAttempt::Failed("no token".into());
            return None;
        };
        let Some(validator) = &self.token_validator else {
            request.context.auth_trace.token =
                AuthAttempt::Failed("token validation not configured".into());
            return None;
        };

        let cancel = request.cancel.clone();
        let outcome = guarded(
            validator.validate(&header, correlation_id, cancel.clone()),
            self.token_timeout,
            cancel,
        )
        .await;

        let validation = match outcome {
            Ok(v) if v.success => v,
            Ok(v) => {
                debug!(%correlation_id, reason = %v.message, "Token rejected");
                request.context.auth_trace.token = AuthAttempt::Failed(v.message);
                return None;
            }
            Err(e) => {
                warn!(%correlation_id, error = %e, "Token validation failed");
                request.context.auth_trace.token = AuthAttempt::Failed(e.to_string());
                return None;
            }
        };

        let Some(app_id) = validation.application_id else {
            request.context.auth_trace.token = AuthAttempt::Failed("no application id".into());
            return None;
        };
        match self.directory.find_by_application_id(&app_id) {
            Some(partner) => {
                request.context.auth_trace.token = AuthAttempt::Succeeded;
                Some(partner)
            }
            None => {
                warn!(%correlation_id, "{} isn't whitelisted", app_id);
                request.context.auth_trace.token =
                    AuthAttempt::Failed(format!("{app_id} isn't whitelisted"));
                None
            }
        }
    }

    async fn authenticate_certificate(
        &self,
        request: &mut AdmissionRequest,
    ) -> Option<Arc<PartnerRecord>> {
        let correlation_id = request.context.correlation_id;
        let Some(certificate) = transport::client_certificate(&request.parts) else {
            request.context.auth_trace.certificate = AuthAttempt::Failed("no certificate".into());
            return None;
        };
        let Some(cache) = &self.identity_cache else {
            request.context.auth_trace.certificate =
                AuthAttempt::Failed("certificate identity service not configured".into());
            return None;
        };

        let lookup = match cache.lookup(&certificate, request.cancel.clone()).await {
            Ok(lookup) => lookup,
            Err(e) => {
                warn!(%correlation_id, error = %e, "Certificate identity lookup failed");
                request.context.auth_trace.certificate = AuthAttempt::Failed(e.to_string());
                return None;
            }
        };
        request.context.auth_trace.certificate_fetch_ms = lookup.fetch_ms;
        debug!(
            %correlation_id,
            cache_hit = lookup.cache_hit,
            latency_ms = lookup.fetch_ms,
            "Certificate identity resolved"
        );

        if !lookup.claims.first().is_some_and(|c| c.is_authenticated) {
            request.context.auth_trace.certificate =
                AuthAttempt::Failed("certificate identity not authenticated".into());
            return None;
        }

        let Some(partner) = self.directory.find_by_subject(certificate.subject()) else {
            request.context.auth_trace.certificate =
                AuthAttempt::Failed(format!("subject {} is not registered", certificate.subject()));
            return None;
        };

        let fingerprint = certificate.fingerprint();
        let issuer_matches = partner
            .certificate_rule
            .as_ref()
            .and_then(|r| r.issuer.as_deref())
            .map_or(true, |issuer| {
                normalize_distinguished_name(issuer).eq_ignore_ascii_case(&fingerprint.issuer)
            });
        if !issuer_matches || !partner.thumbprint_pin_matches(&fingerprint.thumbprint) {
            request.context.auth_trace.certificate =
                AuthAttempt::Failed("certificate does not match partner rule".into());
            return None;
        }

        request.context.auth_trace.certificate = AuthAttempt::Succeeded;
        Some(partner)
    }

    async fn authenticate(&self, request: &mut AdmissionRequest) -> Decision {
        let correlation_id = request.context.correlation_id;

        let (partner, method) = match self.authenticate_token(request).await {
            Some(partner) => (partner, AuthMethod::Token),
            None => match self.authenticate_certificate(request).await {
                Some(partner) => (partner, AuthMethod::Certificate),
                None => {
                    warn!(
                        %correlation_id,
                        token = %request.context.auth_trace.token,
                        certificate = %request.context.auth_trace.certificate,
                        "Authentication failed"
                    );
                    return Decision::Reject(AdmissionError::AuthenticationFailed);
                }
            },
        };

        if !self.policy.is_authorized(&partner, &request.parts.uri) {
            warn!(
                %correlation_id,
                caller = %partner.name,
                path = %request.parts.uri.path(),
                "Partner not authorized for path"
            );
            return Decision::Reject(AdmissionError::AuthorizationDenied);
        }

        request
            .context
            .set_identity(ResolvedIdentity::partner(partner, method));
        self.metrics.record_authenticated(method);
        debug!(
            %correlation_id,
            caller = %request.context.caller_name,
            method = %method,
            "Authenticated"
        );
        Decision::Continue
    }
}

#[async_trait]
impl Admit for AuthenticationGate {
    fn stage(&self) -> &'static str {
        "auth"
    }

    async fn admit(&self, request: &mut AdmissionRequest) -> Decision {
        let exempt = self.is_exempt(request);
        if request.secure {
            if exempt || self.allow_unauthenticated_https {
                return self.bypass(request);
            }
            self.authenticate(request).await
        } else if exempt || self.allow_unauthenticated_http {
            self.bypass(request)
        } else {
            Decision::Reject(AdmissionError::ProtocolNotSupported)
        }
    }
}

/// The token of a `Bearer` authorization value; the scheme ignores case.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// `/probe`, or `/probe` under a single version segment such as `/v7.0/probe`.
fn is_probe_path(path: &str) -> bool {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        [endpoint] => endpoint.eq_ignore_ascii_case(PROBE_ENDPOINT),
        [version, endpoint] => {
            is_version_segment(version) && endpoint.eq_ignore_ascii_case(PROBE_ENDPOINT)
        }
        _ => false,
    }
}

/// `/pxservice/v7.0/x` → `/v7.0/x`; other paths are returned unchanged.
fn strip_service_segment(path: &str) -> &str {
    let trimmed = path.trim_start_matches('/');
    match trimmed.split_once('/') {
        Some((first, rest))
            if !is_version_segment(first)
                && rest.split('/').next().is_some_and(is_version_segment) =>
        {
            &trimmed[first.len()..]
        }
        _ => path,
    }
}
