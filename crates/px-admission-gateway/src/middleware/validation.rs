//! Query parameter validation stage.
//!
//! Failures are soft by default: the request is marked and proceeds. Strict
//! mode (feature flag or config) turns a failed registered parameter into a
//! 400. Unregistered parameters only reject with
//! `validation.reject_unknown_parameters`.

use async_trait::async_trait;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::metrics::AdmissionMetrics;
use super::{Admit, AdmissionRequest, Decision};
use crate::domain::config::ValidationConfig;
use crate::domain::error::AdmissionError;
use crate::domain::validators::ParameterValidators;

pub struct InputValidationGate {
    validators: Arc<ParameterValidators>,
    config: ValidationConfig,
    metrics: Arc<AdmissionMetrics>,
}

impl InputValidationGate {
    pub fn new(config: ValidationConfig, metrics: Arc<AdmissionMetrics>) -> Self {
        Self::with_validators(
            Arc::new(ParameterValidators::standard().clone()),
            config,
            metrics,
        )
    }

    pub fn with_validators(
        validators: Arc<ParameterValidators>,
        config: ValidationConfig,
        metrics: Arc<AdmissionMetrics>,
    ) -> Self {
        Self {
            validators,
            config,
            metrics,
        }
    }

    fn strict(&self, request: &AdmissionRequest) -> bool {
        self.config.force_strict
            || request
                .context
                .feature_flags
                .is_enabled(&self.config.strict_feature)
    }
}

#[async_trait]
impl Admit for InputValidationGate {
    fn stage(&self) -> &'static str {
        "validation"
    }

    async fn admit(&self, request: &mut AdmissionRequest) -> Decision {
        let Some(query) = request.parts.uri.query() else {
            return Decision::Continue;
        };
        let pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        let correlation_id = request.context.correlation_id;

        for (name, value) in pairs {
            let Some(rule) = self.validators.rule(&name) else {
                debug!(%correlation_id, parameter = %name, "Unregistered query parameter");
                request.context.input_validation_failed = true;
                if self.config.reject_unknown_parameters {
                    return Decision::Reject(AdmissionError::UnknownParameter {
                        name,
                        value,
                        url: request.request_url(),
                    });
                }
                continue;
            };

            match catch_unwind(AssertUnwindSafe(|| rule.check(&value))) {
                Ok(true) => {}
                Ok(false) => {
                    request.context.input_validation_failed = true;
                    if self.strict(request) {
                        return Decision::Reject(AdmissionError::ParameterValidationFailed {
                            name,
                            value,
                            url: request.request_url(),
                        });
                    }
                    self.metrics.record_soft_invalid();
                    warn!(
                        %correlation_id,
                        parameter = %name,
                        "Invalid query parameter, continuing"
                    );
                }
                Err(_) => {
                    error!(
                        %correlation_id,
                        parameter = %name,
                        "Parameter validator panicked, continuing"
                    );
                }
            }
        }

        Decision::Continue
    }
}
