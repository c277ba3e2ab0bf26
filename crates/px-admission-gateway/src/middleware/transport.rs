//! Transport facts about a request: channel security and the client
//! certificate.
//!
//! A TLS acceptor in front of the router records both in a [`TransportInfo`]
//! request extension. Behind a TLS-terminating proxy the gateway falls back to
//! `X-Forwarded-Proto` (when trusted) and the `X-ARR-ClientCert` header.

use axum::http::request::Parts;
use tracing::warn;

use crate::domain::identity::ClientCertificate;

pub const FORWARDED_PROTO_HEADER: &str = "x-forwarded-proto";
pub const ARR_CLIENT_CERT_HEADER: &str = "x-arr-clientcert";

#[derive(Debug, Clone, Default)]
pub struct TransportInfo {
    pub secure: bool,
    pub client_certificate: Option<ClientCertificate>,
}

impl TransportInfo {
    pub fn tls(client_certificate: Option<ClientCertificate>) -> Self {
        Self {
            secure: true,
            client_certificate,
        }
    }
}

/// Decide whether the request arrived over a secure channel.
pub fn is_secure(parts: &Parts, trust_forwarded_proto: bool) -> bool {
    if let Some(info) = parts.extensions.get::<TransportInfo>() {
        return info.secure;
    }
    if trust_forwarded_proto {
        if let Some(proto) = parts
            .headers
            .get(FORWARDED_PROTO_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            // A proxy chain appends; the first entry is the client-facing hop.
            let first = proto.split(',').next().unwrap_or_default().trim();
            return first.eq_ignore_ascii_case("https");
        }
    }
    parts.uri.scheme_str() == Some("https")
}

/// The client certificate, if one was presented and parses.
pub fn client_certificate(parts: &Parts) -> Option<ClientCertificate> {
    if let Some(cert) = parts
        .extensions
        .get::<TransportInfo>()
        .and_then(|info| info.client_certificate.clone())
    {
        return Some(cert);
    }

    let encoded = parts.headers.get(ARR_CLIENT_CERT_HEADER)?.to_str().ok()?;
    if encoded.trim().is_empty() {
        return None;
    }
    match ClientCertificate::from_base64(encoded) {
        Ok(cert) => Some(cert),
        Err(e) => {
            warn!(error = %e, "Ignoring unparseable client certificate header");
            None
        }
    }
}
