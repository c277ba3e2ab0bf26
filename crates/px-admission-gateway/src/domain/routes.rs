//! Controller registry and request path parsing.
//!
//! The registry is keyed by (internal version, endpoint name). A separate
//! versionless set (health probe) ignores the version entirely.

use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use super::version::{ApiVersion, InternalVersion};
use crate::ports::inbound::EndpointHandler;

static VERSION_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^v\d+\.\d+$").expect("version segment pattern compiles"));

static ACCOUNT_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[a-f0-9-]{30,40}$").expect("account pattern compiles"));

/// Name of the health probe endpoint.
pub const PROBE_ENDPOINT: &str = "probe";

/// Controllers served under v7.0.
pub const V7_CONTROLLERS: &[&str] = &[
    "paymentInstrumentsEx",
    "settings",
    "paymentMethodDescriptions",
    "addressDescriptions",
    "challengeDescriptions",
    "profileDescriptions",
    "billingGroupDescriptions",
    "tenantDescriptions",
    "taxIdDescriptions",
    "pidlTransformation",
    "pidlValidation",
    "sessions",
    "addresses",
    "addressesEx",
    "paymentSessionDescriptions",
    "paymentSessions",
    "paymentTransactions",
    "rdsSession",
    "checkoutDescriptions",
    "checkoutsEx",
    "wallets",
    "rewardsDescriptions",
    "msRewards",
    "initialization",
    "descriptions",
    "checkoutRequestsEx",
    "expressCheckout",
    "paymentRequestsEx",
    "agenticTokenDescriptions",
    "tokensEx",
];

/// Segments of a request path that the pipeline cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestPath {
    /// First `v<major>.<minor>` segment followed by `/`, as written.
    pub version_segment: Option<String>,
    /// Segment right after the version when it looks like an account id.
    pub account_id: Option<String>,
    /// Controller name: the segment after the version (and account id), or the
    /// last segment when the path has no version.
    pub endpoint: Option<String>,
}

impl RequestPath {
    pub fn parse(path: &str) -> Self {
        let raw: Vec<&str> = path.split('/').collect();
        // Position k in `raw` is followed by '/' iff k + 1 < raw.len().
        let version_at = raw
            .iter()
            .enumerate()
            .position(|(k, seg)| k + 1 < raw.len() && VERSION_SEGMENT.is_match(seg));

        let segments_after = |start: usize| raw[start..].iter().copied().filter(|s| !s.is_empty());

        match version_at {
            Some(k) => {
                let mut rest = segments_after(k + 1);
                let first = rest.next();
                let (account_id, endpoint) = match first {
                    Some(seg) if is_account_id(seg) => (Some(seg), rest.next()),
                    other => (None, other),
                };
                Self {
                    version_segment: Some(raw[k].to_string()),
                    account_id: account_id.map(str::to_string),
                    endpoint: endpoint.map(str::to_string),
                }
            }
            None => Self {
                version_segment: None,
                account_id: None,
                endpoint: segments_after(0).last().map(str::to_string),
            },
        }
    }
}

pub fn is_account_id(segment: &str) -> bool {
    ACCOUNT_SEGMENT.is_match(segment)
}

pub fn is_version_segment(segment: &str) -> bool {
    VERSION_SEGMENT.is_match(segment)
}

/// A registered business handler.
#[derive(Clone)]
pub struct HandlerDescriptor {
    pub name: String,
    pub handler: Arc<dyn EndpointHandler>,
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct ControllerRouteResolver {
    versioned: HashMap<InternalVersion, HashMap<String, HandlerDescriptor>>,
    versionless: HashMap<String, HandlerDescriptor>,
}

impl ControllerRouteResolver {
    pub fn builder() -> ControllerRouteResolverBuilder {
        ControllerRouteResolverBuilder::default()
    }

    /// Find the handler for an endpoint. Versionless names ignore `version`.
    pub fn resolve(
        &self,
        endpoint: &str,
        version: Option<&ApiVersion>,
    ) -> Option<&HandlerDescriptor> {
        let key = endpoint.to_ascii_lowercase();
        if let Some(descriptor) = self.versionless.get(&key) {
            return Some(descriptor);
        }
        self.versioned
            .get(&version?.internal())
            .and_then(|controllers| controllers.get(&key))
    }

    pub fn is_versionless(&self, endpoint: &str) -> bool {
        self.versionless.contains_key(&endpoint.to_ascii_lowercase())
    }

    pub fn versions(&self) -> impl Iterator<Item = InternalVersion> + '_ {
        self.versioned.keys().copied()
    }
}

#[derive(Default)]
pub struct ControllerRouteResolverBuilder {
    resolver: ControllerRouteResolver,
}

impl ControllerRouteResolverBuilder {
    /// Register `name` under `version`.
    pub fn add(
        mut self,
        version: InternalVersion,
        name: &str,
        handler: Arc<dyn EndpointHandler>,
    ) -> Self {
        self.resolver
            .versioned
            .entry(version)
            .or_default()
            .insert(
                name.to_ascii_lowercase(),
                HandlerDescriptor {
                    name: name.to_string(),
                    handler,
                },
            );
        self
    }

    /// Register every name in `names` under `version` with a shared handler.
    pub fn add_version(
        self,
        version: InternalVersion,
        names: &[&str],
        handler: Arc<dyn EndpointHandler>,
    ) -> Self {
        names.iter().fold(self, |builder, name| {
            builder.add(version, name, Arc::clone(&handler))
        })
    }

    pub fn add_versionless(mut self, name: &str, handler: Arc<dyn EndpointHandler>) -> Self {
        self.resolver.versionless.insert(
            name.to_ascii_lowercase(),
            HandlerDescriptor {
                name: name.to_string(),
                handler,
            },
        );
        self
    }

    pub fn build(self) -> ControllerRouteResolver {
        self.resolver
    }
}
