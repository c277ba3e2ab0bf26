//! Domain types for the admission gateway.
//!
//! Registries (versions, validators, partners, routes), the per-request
//! context, configuration and the error taxonomy. Nothing in here performs I/O
//! except [`config::GatewayConfig::load`].

pub mod config;
pub mod context;
pub mod correlation;
pub mod error;
pub mod identity;
pub mod partner;
pub mod routes;
pub mod ttl_cache;
pub mod validators;
pub mod version;

// Re-exports for convenience
pub use config::{ConfigError, GatewayConfig};
pub use context::{AuthAttempt, AuthTrace, FeatureFlags, FlightContext, RequestContext};
pub use correlation::CorrelationId;
pub use error::{AdmissionError, CollaboratorError, ErrorBody, GatewayError};
pub use identity::{
    AuthMethod, CertificateFingerprint, ClientCertificate, FetchResult, IdentityClaim,
    IdentityFetch, ResolvedIdentity,
};
pub use partner::{CertificateRule, PartnerDirectory, PartnerRecord, Role};
pub use routes::{ControllerRouteResolver, HandlerDescriptor, RequestPath};
pub use ttl_cache::TtlCache;
pub use validators::{ParameterValidator, ParameterValidators, ValidatorRule};
pub use version::{ApiVersion, InternalVersion, VersionCatalog};
