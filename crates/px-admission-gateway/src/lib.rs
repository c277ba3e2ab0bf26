// Allow missing docs for internal items in development
#![allow(missing_docs)]

//! PX Admission Gateway - request admission for the payment experience API.
//!
//! Every inbound request passes a fixed chain of admission stages before a
//! business controller sees it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                     ADMISSION GATEWAY (px)                           │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │   tower-http CORS layer → AdmissionTraceLayer (span "admission")     │
//! │                              │                                       │
//! │   ┌──────────────────────────┴───────────────────────────────────┐   │
//! │   │                     RequestPipeline                          │   │
//! │   │  Correlation → Version → CORS policy → Feature flags         │   │
//! │   │    → Input validation → Route gate → Authentication          │   │
//! │   │                                         (+ authorization)    │   │
//! │   └──────────────────────────┬───────────────────────────────────┘   │
//! │                              │                                       │
//! │                     EndpointHandler (business)                       │
//! │                              │                                       │
//! │                   Response completeness check                        │
//! └──────────────────────────────┼───────────────────────────────────────┘
//!                                │
//!          ┌─────────────────────┼─────────────────────┐
//!          ▼                     ▼                     ▼
//!   token service     certificate identity     feature flag source
//!                       service (cached)
//! ```
//!
//! # Stages
//!
//! - **Version**: one `api-version` header value or a `v<major>.<minor>` URL
//!   segment, resolved against the supported catalog.
//! - **Input validation**: registered query parameters are checked; failures
//!   are soft unless strict mode is on.
//! - **Route gate**: no registered controller for the version is a 404 before
//!   any handler runs.
//! - **Authentication**: secure requests authenticate by bearer token, then
//!   client certificate; the matched partner must be authorized for the path.
//!
//! # Usage
//!
//! ```ignore
//! use px_admission_gateway::{AdmissionGatewayService, Collaborators, GatewayConfig};
//!
//! let config = GatewayConfig::load("px-gateway.toml")?;
//! let mut service = AdmissionGatewayService::new(config, routes, Collaborators::default())?;
//! service.start().await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod domain;
pub mod middleware;
pub mod pipeline;
pub mod ports;
pub mod service;

pub use domain::config::GatewayConfig;
pub use domain::error::{AdmissionError, GatewayError};
pub use domain::routes::{ControllerRouteResolver, PROBE_ENDPOINT, V7_CONTROLLERS};
pub use pipeline::{AdmissionService, PipelineBuilder, RequestPipeline};
pub use ports::{EndpointHandler, TokenValidator};
pub use service::{AdmissionGatewayService, Collaborators};
