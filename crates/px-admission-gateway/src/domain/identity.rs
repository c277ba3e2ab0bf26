//! Caller identity: resolved identities, client certificates and the
//! distinguished-name normalization used to match them against partners.

use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;
use std::sync::Arc;

use super::partner::PartnerRecord;

/// Caller name recorded for anonymous bypass decisions.
pub const ANONYMOUS_CALLER: &str = "AnonymousCaller";

/// Caller name recorded before any identity is resolved.
pub const UNKNOWN_CALLER: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthMethod {
    Token,
    Certificate,
    AnonymousBypass,
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuthMethod::Token => "token",
            AuthMethod::Certificate => "certificate",
            AuthMethod::AnonymousBypass => "anonymous",
        })
    }
}

/// Outcome of authentication, fixed once per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    partner: Option<Arc<PartnerRecord>>,
    is_authenticated: bool,
    auth_method: AuthMethod,
}

impl ResolvedIdentity {
    pub fn anonymous() -> Self {
        Self {
            partner: None,
            is_authenticated: false,
            auth_method: AuthMethod::AnonymousBypass,
        }
    }

    pub fn partner(partner: Arc<PartnerRecord>, auth_method: AuthMethod) -> Self {
        Self {
            partner: Some(partner),
            is_authenticated: true,
            auth_method,
        }
    }

    pub fn partner_record(&self) -> Option<&PartnerRecord> {
        self.partner.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.is_authenticated
    }

    pub fn auth_method(&self) -> AuthMethod {
        self.auth_method
    }

    pub fn caller_name(&self) -> &str {
        match &self.partner {
            Some(p) => &p.name,
            None => ANONYMOUS_CALLER,
        }
    }
}

/// One identity returned by the certificate identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityClaim {
    pub name: String,
    pub is_authenticated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchResult {
    Success,
    NotFound,
    Failure,
}

/// Response of the certificate identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityFetch {
    pub result: FetchResult,
    #[serde(default)]
    pub identities: Vec<IdentityClaim>,
    #[serde(default)]
    pub message: String,
}

/// Identity cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CertificateFingerprint {
    pub thumbprint: String,
    pub subject: String,
    pub issuer: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CertificateError {
    #[error("certificate header is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("certificate is not valid DER: {0}")]
    Der(String),
}

/// A client certificate with the fields the gateway matches on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCertificate {
    der: Bytes,
    subject: String,
    issuer: String,
    thumbprint: String,
}

impl ClientCertificate {
    pub fn from_der(der: impl Into<Bytes>) -> Result<Self, CertificateError> {
        let der = der.into();
        let (_, cert) = x509_parser::parse_x509_certificate(&der)
            .map_err(|e| CertificateError::Der(e.to_string()))?;
        let subject = cert.subject().to_string();
        let issuer = cert.issuer().to_string();
        let thumbprint = hex::encode_upper(Sha1::digest(&der));
        Ok(Self {
            der,
            subject,
            issuer,
            thumbprint,
        })
    }

    /// Decode the proxy-injected `X-ARR-ClientCert` value.
    pub fn from_base64(encoded: &str) -> Result<Self, CertificateError> {
        let der = base64::engine::general_purpose::STANDARD.decode(encoded.trim())?;
        Self::from_der(der)
    }

    pub fn der(&self) -> &Bytes {
        &self.der
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Upper-case hex SHA-1 of the DER encoding.
    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    pub fn fingerprint(&self) -> CertificateFingerprint {
        CertificateFingerprint {
            thumbprint: normalize_thumbprint(&self.thumbprint),
            subject: normalize_distinguished_name(&self.subject),
            issuer: normalize_distinguished_name(&self.issuer),
        }
    }
}

/// Keep only letters and digits, upper-cased.
pub fn normalize_thumbprint(thumbprint: &str) -> String {
    thumbprint
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_uppercase)
        .collect()
}

const DN_SPECIAL: &[char] = &[',', '=', '+', '<', '>', '#', ';', '"', '\\'];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot parse distinguished name at byte {position}")]
pub struct DnParseError {
    pub position: usize,
}

/// Canonical form of a distinguished name: `name=value` pairs with trimmed
/// values, sorted case-insensitively and joined by `,`.
///
/// Names that cannot be tokenized are returned trimmed and otherwise untouched,
/// so they still compare equal to themselves.
pub fn normalize_distinguished_name(dn: &str) -> String {
    try_normalize_distinguished_name(dn).unwrap_or_else(|_| dn.trim().to_string())
}

pub fn try_normalize_distinguished_name(dn: &str) -> Result<String, DnParseError> {
    let mut attributes = Vec::new();
    let chars: Vec<(usize, char)> = dn.char_indices().collect();
    let mut i = 0;
    let err = |i: usize| DnParseError {
        position: chars.get(i).map(|(p, _)| *p).unwrap_or(dn.len()),
    };

    while i < chars.len() {
        skip_whitespace(&chars, &mut i);

        let name_start = i;
        while i < chars.len() && chars[i].1 != '=' && chars[i].1 != ',' {
            i += 1;
        }
        if i >= chars.len() || chars[i].1 != '=' {
            return Err(err(i));
        }
        let name: String = chars[name_start..i].iter().map(|(_, c)| c).collect();
        let name = name.trim();
        if name.is_empty() || !is_dn_name(name) {
            return Err(err(name_start));
        }
        i += 1;
        skip_whitespace(&chars, &mut i);

        let value = if chars.get(i).map(|(_, c)| *c) == Some('"') {
            i += 1;
            let mut quoted = String::new();
            loop {
                match chars.get(i).map(|(_, c)| *c) {
                    None => return Err(err(i)),
                    Some('"') if chars.get(i + 1).map(|(_, c)| *c) == Some('"') => {
                        quoted.push('"');
                        i += 2;
                    }
                    Some('"') => {
                        i += 1;
                        break;
                    }
                    Some(c) => {
                        quoted.push(c);
                        i += 1;
                    }
                }
            }
            skip_whitespace(&chars, &mut i);
            escape_specials(&quoted)
        } else {
            let mut unquoted = String::new();
            while let Some((_, c)) = chars.get(i).copied() {
                match c {
                    ',' => break,
                    '\\' => {
                        let (_, next) = *chars.get(i + 1).ok_or_else(|| err(i))?;
                        unquoted.push('\\');
                        unquoted.push(next);
                        i += 2;
                    }
                    c if DN_SPECIAL.contains(&c) => return Err(err(i)),
                    c => {
                        unquoted.push(c);
                        i += 1;
                    }
                }
            }
            unquoted
        };

        match chars.get(i).map(|(_, c)| *c) {
            None => {}
            Some(',') => {
                i += 1;
                if i >= chars.len() {
                    return Err(err(i));
                }
            }
            Some(_) => return Err(err(i)),
        }

        attributes.push(format!("{}={}", name, value.trim()));
    }

    if attributes.is_empty() {
        return Err(err(0));
    }

    attributes.sort_by_key(|a| a.to_lowercase());
    Ok(attributes.join(","))
}

fn skip_whitespace(chars: &[(usize, char)], i: &mut usize) {
    while *i < chars.len() && chars[*i].1.is_whitespace() {
        *i += 1;
    }
}

fn is_dn_name(name: &str) -> bool {
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
}

fn escape_specials(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if DN_SPECIAL.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
