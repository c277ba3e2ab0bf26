//! Feature flags from configuration, switchable at runtime.

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::context::{FeatureFlags, FlightContext};
use crate::ports::outbound::FeatureFlagResolver;

/// Resolver that returns the same flag set for every request.
#[derive(Debug, Default)]
pub struct StaticFeatureFlags {
    flags: RwLock<FeatureFlags>,
}

impl StaticFeatureFlags {
    pub fn new<S: AsRef<str>>(enabled: impl IntoIterator<Item = S>) -> Self {
        Self {
            flags: RwLock::new(enabled.into_iter().collect()),
        }
    }

    pub fn set(&self, name: &str, enabled: bool) {
        let mut flags = self.flags.write();
        if enabled {
            flags.enable(name);
        } else {
            flags.disable(name);
        }
    }
}

#[async_trait]
impl FeatureFlagResolver for StaticFeatureFlags {
    async fn resolve(&self, _flight: &FlightContext) -> FeatureFlags {
        self.flags.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_runtime_toggle() {
        let resolver = StaticFeatureFlags::new(["PXEnableThrowInvalidUrlParameterException"]);
        let flight = FlightContext::default();
        assert!(resolver
            .resolve(&flight)
            .await
            .is_enabled("PXEnableThrowInvalidUrlParameterException"));

        resolver.set("pxenablethrowinvalidurlparameterexception", false);
        assert!(resolver.resolve(&flight).await.is_empty());

        resolver.set("PXOther", true);
        assert!(resolver.resolve(&flight).await.is_enabled("pxother"));
    }
}
