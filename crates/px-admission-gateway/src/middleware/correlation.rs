//! Correlation stage: adopt the caller's correlation id or mint one.

use async_trait::async_trait;
use tracing::Span;

use super::{Admit, AdmissionRequest, Decision};
use crate::domain::correlation::{CorrelationId, TRACKING_HEADER};

#[derive(Debug, Default, Clone, Copy)]
pub struct CorrelationStage;

#[async_trait]
impl Admit for CorrelationStage {
    fn stage(&self) -> &'static str {
        "correlation"
    }

    async fn admit(&self, request: &mut AdmissionRequest) -> Decision {
        let headers = &request.parts.headers;
        request.context.correlation_id = CorrelationId::from_headers(headers);
        request.context.tracking_id = headers
            .get(TRACKING_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Span::current().record(
            "correlation_id",
            tracing::field::display(request.context.correlation_id),
        );
        Decision::Continue
    }
}
