//! Outbound ports for the admission pipeline.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;

use crate::domain::context::{FeatureFlags, FlightContext};
use crate::domain::correlation::CorrelationId;
use crate::domain::error::CollaboratorError;
use crate::domain::identity::{ClientCertificate, IdentityFetch};

/// Time source trait for testability
pub trait TimeSource: Send + Sync {
    /// Seconds since the Unix epoch.
    fn now(&self) -> u64;
}

/// System time implementation
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_secs(), Ordering::SeqCst);
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Request-scoped cancellation signal.
///
/// Fires when the request is abandoned (client disconnect, request timeout).
/// A signal whose sender went away without firing never fires.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub(crate) fn from_receiver(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the request is cancelled.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                if *self.rx.borrow() {
                    return;
                }
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Result of bearer token validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenValidation {
    pub success: bool,
    #[serde(default)]
    pub application_id: Option<String>,
    #[serde(default)]
    pub message: String,
}

impl TokenValidation {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            application_id: None,
            message: message.into(),
        }
    }
}

/// External bearer token validation service.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// Validate the full `Authorization` header value.
    async fn validate(
        &self,
        authorization: &str,
        correlation_id: CorrelationId,
        cancel: CancelSignal,
    ) -> Result<TokenValidation, CollaboratorError>;
}

/// External certificate identity directory.
#[async_trait]
pub trait CertificateIdentityFetcher: Send + Sync {
    async fn fetch(
        &self,
        certificate: &ClientCertificate,
        force_fresh: bool,
        cancel: CancelSignal,
    ) -> Result<IdentityFetch, CollaboratorError>;
}

/// Feature exposure (flighting) service, consulted once per request.
#[async_trait]
pub trait FeatureFlagResolver: Send + Sync {
    async fn resolve(&self, flight: &FlightContext) -> FeatureFlags;
}
