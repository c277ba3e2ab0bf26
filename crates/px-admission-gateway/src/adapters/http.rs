//! HTTP clients for the token validation and certificate identity services.
//!
//! Both race the call against the request's cancel signal. Per-call timeouts
//! are applied by the caller.

use async_trait::async_trait;
use base64::Engine;
use serde::Serialize;
use tracing::debug;

use crate::domain::correlation::{CorrelationId, CORRELATION_HEADER};
use crate::domain::error::CollaboratorError;
use crate::domain::identity::{ClientCertificate, FetchResult, IdentityFetch};
use crate::ports::outbound::{
    CancelSignal, CertificateIdentityFetcher, TokenValidation, TokenValidator,
};

fn client() -> reqwest::Client {
    // reqwest::Client::new() is infallible
    reqwest::Client::builder()
        .use_rustls_tls()
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Token validator backed by a remote validation endpoint.
///
/// The caller's `Authorization` header is forwarded as-is.
#[derive(Debug, Clone)]
pub struct HttpTokenValidator {
    client: reqwest::Client,
    endpoint: url::Url,
}

impl HttpTokenValidator {
    pub fn new(endpoint: url::Url) -> Self {
        Self {
            client: client(),
            endpoint,
        }
    }

    async fn send(
        &self,
        authorization: &str,
        correlation_id: CorrelationId,
    ) -> Result<TokenValidation, CollaboratorError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .header(reqwest::header::AUTHORIZATION, authorization)
            .header(CORRELATION_HEADER, correlation_id.to_string())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            debug!(%correlation_id, status = status.as_u16(), "Token service refused token");
            return Ok(TokenValidation::failed(format!(
                "token service returned {}",
                status.as_u16()
            )));
        }
        Ok(response.json::<TokenValidation>().await?)
    }
}

#[async_trait]
impl TokenValidator for HttpTokenValidator {
    async fn validate(
        &self,
        authorization: &str,
        correlation_id: CorrelationId,
        mut cancel: CancelSignal,
    ) -> Result<TokenValidation, CollaboratorError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(CollaboratorError::Cancelled),
            result = self.send(authorization, correlation_id) => result,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IdentityQuery {
    certificate: String,
    thumbprint: String,
    force_fresh: bool,
}

/// Certificate identity fetcher backed by a remote directory service.
#[derive(Debug, Clone)]
pub struct HttpIdentityFetcher {
    client: reqwest::Client,
    endpoint: url::Url,
}

impl HttpIdentityFetcher {
    pub fn new(endpoint: url::Url) -> Self {
        Self {
            client: client(),
            endpoint,
        }
    }

    async fn send(
        &self,
        certificate: &ClientCertificate,
        force_fresh: bool,
    ) -> Result<IdentityFetch, CollaboratorError> {
        let query = IdentityQuery {
            certificate: base64::engine::general_purpose::STANDARD.encode(certificate.der()),
            thumbprint: certificate.thumbprint().to_string(),
            force_fresh,
        };
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&query)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(IdentityFetch {
                result: FetchResult::NotFound,
                identities: Vec::new(),
                message: "certificate not known to the identity service".to_string(),
            });
        }
        if !status.is_success() {
            return Err(CollaboratorError::Transport(format!(
                "identity service returned {}",
                status.as_u16()
            )));
        }
        Ok(response.json::<IdentityFetch>().await?)
    }
}

#[async_trait]
impl CertificateIdentityFetcher for HttpIdentityFetcher {
    async fn fetch(
        &self,
        certificate: &ClientCertificate,
        force_fresh: bool,
        mut cancel: CancelSignal,
    ) -> Result<IdentityFetch, CollaboratorError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(CollaboratorError::Cancelled),
            result = self.send(certificate, force_fresh) => result,
        }
    }
}
