//! Admission gateway service: wires configuration, collaborators and the
//! pipeline into an axum server.

use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower::ServiceBuilder;
use tracing::{error, info};

use crate::adapters::http::{HttpIdentityFetcher, HttpTokenValidator};
use crate::domain::config::GatewayConfig;
use crate::domain::error::GatewayError;
use crate::domain::routes::ControllerRouteResolver;
use crate::middleware::identity_cache::cleanup_task;
use crate::middleware::{create_cors_layer, AdmissionMetrics, AdmissionTraceLayer};
use crate::pipeline::{AdmissionService, RequestPipeline};
use crate::ports::outbound::{
    CertificateIdentityFetcher, FeatureFlagResolver, TimeSource, TokenValidator,
};

/// External services the gateway calls. Anything left unset is built from
/// the configured service URLs, if any.
#[derive(Default)]
pub struct Collaborators {
    pub token_validator: Option<Arc<dyn TokenValidator>>,
    pub identity_fetcher: Option<Arc<dyn CertificateIdentityFetcher>>,
    pub feature_flags: Option<Arc<dyn FeatureFlagResolver>>,
    pub clock: Option<Arc<dyn TimeSource>>,
}

pub struct AdmissionGatewayService {
    config: GatewayConfig,
    pipeline: Arc<RequestPipeline>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_rx: Option<oneshot::Receiver<()>>,
}

impl AdmissionGatewayService {
    pub fn new(
        config: GatewayConfig,
        routes: Arc<ControllerRouteResolver>,
        collaborators: Collaborators,
    ) -> Result<Self, GatewayError> {
        config
            .validate()
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        let token_validator = match collaborators.token_validator {
            Some(v) => Some(v),
            None => config
                .auth
                .token_service_url
                .as_deref()
                .map(|u| parse_url("auth.token_service_url", u))
                .transpose()?
                .map(|url| Arc::new(HttpTokenValidator::new(url)) as Arc<dyn TokenValidator>),
        };
        let identity_fetcher = match collaborators.identity_fetcher {
            Some(f) => Some(f),
            None => config
                .auth
                .certificate_service_url
                .as_deref()
                .map(|u| parse_url("auth.certificate_service_url", u))
                .transpose()?
                .map(|url| {
                    Arc::new(HttpIdentityFetcher::new(url)) as Arc<dyn CertificateIdentityFetcher>
                }),
        };

        let mut builder = RequestPipeline::builder(config.clone(), routes);
        if let Some(v) = token_validator {
            builder = builder.token_validator(v);
        }
        if let Some(f) = identity_fetcher {
            builder = builder.identity_fetcher(f);
        }
        if let Some(flags) = collaborators.feature_flags {
            builder = builder.feature_flags(flags);
        }
        if let Some(clock) = collaborators.clock {
            builder = builder.clock(clock);
        }
        let pipeline = Arc::new(builder.build());

        info!(
            versions = ?config.versions.supported,
            partners = config.partners.len(),
            stages = ?pipeline.stage_names(),
            "Admission pipeline ready"
        );

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        Ok(Self {
            config,
            pipeline,
            shutdown_tx: Some(shutdown_tx),
            shutdown_rx: Some(shutdown_rx),
        })
    }

    /// Every path goes through the pipeline; CORS and tracing wrap it.
    pub fn router(&self) -> Router {
        let middleware = ServiceBuilder::new()
            .layer(create_cors_layer(&self.config.cors))
            .layer(AdmissionTraceLayer::new());

        Router::new()
            .fallback_service(AdmissionService::new(Arc::clone(&self.pipeline)))
            .layer(middleware)
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn start(&mut self) -> Result<(), GatewayError> {
        let addr = self.config.http_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::Bind(format!("{addr}: {e}")))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown or a server error.
    /// A service serves at most once.
    pub async fn serve(&mut self, listener: TcpListener) -> Result<(), GatewayError> {
        let mut shutdown_rx = self.shutdown_rx.take().ok_or(GatewayError::ShuttingDown)?;

        let cleanup = self.pipeline.identity_cache().map(|cache| {
            tokio::spawn(cleanup_task(cache, self.config.identity_cache.cleanup_interval))
        });

        let addr = listener
            .local_addr()
            .map_err(|e| GatewayError::Bind(e.to_string()))?;
        info!(%addr, "Starting admission gateway");
        let router = self.router();
        let mut server = tokio::spawn(async move { axum::serve(listener, router).await });

        let result = tokio::select! {
            _ = &mut shutdown_rx => {
                info!("Received shutdown signal");
                server.abort();
                Ok(())
            }
            joined = &mut server => match joined {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => {
                    error!(error = %e, "HTTP server error");
                    Err(GatewayError::Serve(e.to_string()))
                }
                Err(e) => {
                    error!(error = %e, "HTTP server task failed");
                    Err(GatewayError::Serve(e.to_string()))
                }
            }
        };

        if let Some(handle) = cleanup {
            handle.abort();
        }
        info!("Admission gateway stopped");
        result
    }

    /// Trigger graceful shutdown.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Sender that stops [`Self::serve`] from another task. Take it before
    /// serving.
    pub fn shutdown_handle(&mut self) -> Option<oneshot::Sender<()>> {
        self.shutdown_tx.take()
    }

    pub fn metrics(&self) -> Arc<AdmissionMetrics> {
        self.pipeline.metrics()
    }

    pub fn pipeline(&self) -> Arc<RequestPipeline> {
        Arc::clone(&self.pipeline)
    }
}

fn parse_url(key: &str, value: &str) -> Result<url::Url, GatewayError> {
    value
        .parse()
        .map_err(|e| GatewayError::Config(format!("{key}: {e}")))
}
