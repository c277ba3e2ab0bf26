//! Inbound port: business handlers the pipeline dispatches to.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use std::sync::Arc;

use crate::domain::context::RequestContext;

/// A business endpoint. Only invoked after every admission stage passed.
#[async_trait]
pub trait EndpointHandler: Send + Sync {
    async fn handle(&self, context: Arc<RequestContext>, request: Request<Body>) -> Response;
}
