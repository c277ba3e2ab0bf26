//! Per-request tracing span.
//!
//! Every request runs inside an `admission` span. Stages fill in
//! `correlation_id` and `caller` as they learn them; the status is recorded
//! when the response is ready.

use axum::{body::Body, http::Request, response::Response};
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::{field::Empty, info_span, Instrument, Span};

const TRACEPARENT_HEADER: &str = "traceparent";

#[derive(Clone, Default)]
pub struct AdmissionTraceLayer;

impl AdmissionTraceLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for AdmissionTraceLayer {
    type Service = AdmissionTraceService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AdmissionTraceService { inner }
    }
}

#[derive(Clone)]
pub struct AdmissionTraceService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for AdmissionTraceService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let mut inner = self.inner.clone();

        let span = info_span!(
            "admission",
            http.method = %req.method(),
            http.target = %req.uri().path(),
            http.status_code = Empty,
            correlation_id = Empty,
            caller = Empty,
            otel.kind = "server",
            otel.status_code = Empty,
        );
        if let Some(parent) = extract_trace_context(&req) {
            span.follows_from(parent);
        }

        Box::pin(
            async move {
                let result = inner.call(req).await;

                let span = Span::current();
                match &result {
                    Ok(response) => {
                        let status = response.status();
                        span.record("http.status_code", status.as_u16());
                        span.record(
                            "otel.status_code",
                            if status.is_server_error() { "ERROR" } else { "OK" },
                        );
                    }
                    Err(_) => {
                        span.record("otel.status_code", "ERROR");
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}

/// W3C `traceparent`: `version-trace_id-parent_id-flags`.
fn extract_trace_context<B>(req: &Request<B>) -> Option<Span> {
    let traceparent = req.headers().get(TRACEPARENT_HEADER)?.to_str().ok()?;

    let parts: Vec<&str> = traceparent.split('-').collect();
    if parts.len() != 4 || parts[1].len() != 32 || parts[2].len() != 16 {
        return None;
    }

    Some(info_span!(
        "parent_trace",
        trace_id = parts[1],
        parent_span_id = parts[2]
    ))
}
