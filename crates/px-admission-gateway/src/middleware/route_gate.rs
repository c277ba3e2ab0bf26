//! Route gate: refuse requests with no registered controller before any
//! authentication work is done.

use async_trait::async_trait;
use std::sync::Arc;

use super::{Admit, AdmissionRequest, Decision};
use crate::domain::error::AdmissionError;
use crate::domain::routes::ControllerRouteResolver;

pub struct RouteGate {
    routes: Arc<ControllerRouteResolver>,
}

impl RouteGate {
    pub fn new(routes: Arc<ControllerRouteResolver>) -> Self {
        Self { routes }
    }
}

#[async_trait]
impl Admit for RouteGate {
    fn stage(&self) -> &'static str {
        "route"
    }

    async fn admit(&self, request: &mut AdmissionRequest) -> Decision {
        let descriptor = request.path.endpoint.as_deref().and_then(|endpoint| {
            self.routes
                .resolve(endpoint, request.context.api_version.as_ref())
        });

        match descriptor {
            Some(descriptor) => {
                request.route = Some(descriptor.clone());
                Decision::Continue
            }
            None => Decision::Reject(AdmissionError::NoControllerMapped {
                requested: request.context.requested_version.clone(),
            }),
        }
    }
}
