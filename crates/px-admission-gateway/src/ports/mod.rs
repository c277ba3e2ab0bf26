//! Ports: the traits the admission pipeline consumes and exposes.

pub mod inbound;
pub mod outbound;

pub use inbound::EndpointHandler;
pub use outbound::{
    CancelSignal, CertificateIdentityFetcher, FeatureFlagResolver, ManualClock, SystemTimeSource,
    TimeSource, TokenValidation, TokenValidator,
};
