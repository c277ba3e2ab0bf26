//! Adapters for the admission gateway.
//!
//! Infrastructure implementations of the outbound ports, cancellation
//! plumbing and HTTP error rendering.

pub mod cancel;
pub mod error_conversions;
pub mod features;
pub mod http;

pub use cancel::{guarded, CancelGuard};
pub use error_conversions::{timeout_response, with_correlation, Rejection};
pub use features::StaticFeatureFlags;
pub use http::{HttpIdentityFetcher, HttpTokenValidator};
