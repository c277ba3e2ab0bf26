//! `px-gateway` binary.
//!
//! Usage: `px-gateway [CONFIG]`. The config path may also come from
//! `PX_CONFIG`; without one the built-in defaults are used. `PX_*` variables
//! override either.

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use px_admission_gateway::domain::context::RequestContext;
use px_admission_gateway::domain::version::InternalVersion;
use px_admission_gateway::{
    AdmissionGatewayService, Collaborators, ControllerRouteResolver, EndpointHandler,
    GatewayConfig, PROBE_ENDPOINT, V7_CONTROLLERS,
};

/// Liveness probe.
struct ProbeHandler;

#[async_trait]
impl EndpointHandler for ProbeHandler {
    async fn handle(&self, _context: Arc<RequestContext>, _request: Request<Body>) -> Response {
        Json(serde_json::json!({ "status": "ok" })).into_response()
    }
}

/// Stand-in for controllers hosted elsewhere.
struct UnimplementedController;

#[async_trait]
impl EndpointHandler for UnimplementedController {
    async fn handle(&self, context: Arc<RequestContext>, _request: Request<Body>) -> Response {
        let body = serde_json::json!({
            "errorCode": "NotImplemented",
            "message": format!(
                "{} is not served by this gateway instance.",
                context.endpoint.as_deref().unwrap_or_default()
            ),
            "correlationId": context.correlation_id,
        });
        (StatusCode::NOT_IMPLEMENTED, Json(body)).into_response()
    }
}

fn init_logging() -> Result<()> {
    let filter = std::env::var("PX_LOG")
        .ok()
        .map(EnvFilter::new)
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    let json = std::env::var("PX_JSON_LOGS").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
    if json {
        fmt().json().with_env_filter(filter).with_target(true).try_init()
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .try_init()
    }
    .map_err(|e| anyhow::anyhow!(e))
}

fn load_config() -> Result<GatewayConfig> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("PX_CONFIG").ok());

    match path {
        Some(path) => {
            info!(%path, "Loading configuration");
            GatewayConfig::load(&path).with_context(|| format!("loading {path}"))
        }
        None => {
            info!("No configuration file given, using defaults");
            let mut config = GatewayConfig::default();
            config.apply_overrides(|key| std::env::var(key).ok());
            Ok(config)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let config = load_config()?;

    let routes = Arc::new(
        ControllerRouteResolver::builder()
            .add_version(
                InternalVersion::new(7, 0),
                V7_CONTROLLERS,
                Arc::new(UnimplementedController),
            )
            .add_versionless(PROBE_ENDPOINT, Arc::new(ProbeHandler))
            .build(),
    );

    let mut service = AdmissionGatewayService::new(config, routes, Collaborators::default())?;
    let metrics = service.metrics();

    if let Some(shutdown) = service.shutdown_handle() {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl+C received, shutting down");
                let _ = shutdown.send(());
            }
        });
    }

    service.start().await?;

    info!(metrics = %metrics.to_json(), "Final admission metrics");
    Ok(())
}
