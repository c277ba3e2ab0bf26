//! Feature flag resolution, once per request, right after version resolution.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::{Admit, AdmissionRequest, Decision};
use crate::domain::context::FlightContext;
use crate::ports::outbound::FeatureFlagResolver;

pub struct FeatureFlagStage {
    resolver: Arc<dyn FeatureFlagResolver>,
}

impl FeatureFlagStage {
    pub fn new(resolver: Arc<dyn FeatureFlagResolver>) -> Self {
        Self { resolver }
    }

    fn flight_context(request: &AdmissionRequest) -> FlightContext {
        let query = request.parts.uri.query().unwrap_or_default();
        let param = |name: &str| {
            url::form_urlencoded::parse(query.as_bytes())
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.into_owned())
        };
        FlightContext {
            correlation_id: Some(request.context.correlation_id),
            country: param("country"),
            partner: param("partner"),
            account_id: request.context.account_id.clone(),
        }
    }
}

#[async_trait]
impl Admit for FeatureFlagStage {
    fn stage(&self) -> &'static str {
        "features"
    }

    async fn admit(&self, request: &mut AdmissionRequest) -> Decision {
        let flight = Self::flight_context(request);
        let flags = self.resolver.resolve(&flight).await;
        debug!(
            correlation_id = %request.context.correlation_id,
            enabled = flags.len(),
            "Resolved feature flags"
        );
        request.context.feature_flags = flags;
        Decision::Continue
    }
}
