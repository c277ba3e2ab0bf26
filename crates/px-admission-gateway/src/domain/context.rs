//! Per-request admission context.
//!
//! Owned by a single request. The pipeline fills it stage by stage and hands
//! it to the business handler behind an `Arc`, read-only.

use std::collections::BTreeSet;
use std::fmt;

use super::correlation::CorrelationId;
use super::identity::{ResolvedIdentity, UNKNOWN_CALLER};
use super::version::ApiVersion;

/// Feature that turns parameter validation failures into 400 responses.
pub const STRICT_PARAMETER_FEATURE: &str = "PXEnableThrowInvalidUrlParameterException";

/// Feature flags resolved once per request. Names compare case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureFlags {
    enabled: BTreeSet<String>,
}

impl FeatureFlags {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.contains(&name.to_ascii_lowercase())
    }

    pub fn enable(&mut self, name: &str) {
        self.enabled.insert(name.to_ascii_lowercase());
    }

    pub fn disable(&mut self, name: &str) {
        self.enabled.remove(&name.to_ascii_lowercase());
    }

    pub fn len(&self) -> usize {
        self.enabled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.enabled.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for FeatureFlags {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut flags = Self::default();
        for name in iter {
            flags.enable(name.as_ref());
        }
        flags
    }
}

/// Inputs the feature resolver may target flights on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlightContext {
    pub correlation_id: Option<CorrelationId>,
    pub country: Option<String>,
    pub partner: Option<String>,
    pub account_id: Option<String>,
}

/// Result of one authentication path, kept for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthAttempt {
    #[default]
    NotAttempted,
    Bypassed,
    Succeeded,
    Failed(String),
}

impl fmt::Display for AuthAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthAttempt::NotAttempted => f.write_str("NotAttempted"),
            AuthAttempt::Bypassed => f.write_str("ByPass"),
            AuthAttempt::Succeeded => f.write_str("Succeed"),
            AuthAttempt::Failed(reason) => write!(f, "Failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthTrace {
    pub token: AuthAttempt,
    pub certificate: AuthAttempt,
    /// Latency of the identity service call, when one was made.
    pub certificate_fetch_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub correlation_id: CorrelationId,
    pub tracking_id: Option<String>,
    /// Raw `api-version` header value, kept for diagnostics and 404 bodies.
    pub requested_version: Option<String>,
    pub api_version: Option<ApiVersion>,
    pub endpoint: Option<String>,
    pub account_id: Option<String>,
    pub identity: Option<ResolvedIdentity>,
    pub caller_name: String,
    pub input_validation_failed: bool,
    pub feature_flags: FeatureFlags,
    pub auth_trace: AuthTrace,
}

impl RequestContext {
    pub fn new(correlation_id: CorrelationId) -> Self {
        Self {
            correlation_id,
            tracking_id: None,
            requested_version: None,
            api_version: None,
            endpoint: None,
            account_id: None,
            identity: None,
            caller_name: UNKNOWN_CALLER.to_string(),
            input_validation_failed: false,
            feature_flags: FeatureFlags::none(),
            auth_trace: AuthTrace::default(),
        }
    }

    /// Record the identity. The first identity set wins.
    pub fn set_identity(&mut self, identity: ResolvedIdentity) {
        if self.identity.is_none() {
            self.caller_name = identity.caller_name().to_string();
            self.identity = Some(identity);
        }
    }

    pub fn partner_name(&self) -> Option<&str> {
        self.identity
            .as_ref()
            .and_then(|i| i.partner_record())
            .map(|p| p.name.as_str())
    }
}
