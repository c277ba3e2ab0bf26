//! Gateway configuration with validation.
//!
//! Loaded from TOML, then overridden from `PX_*` environment variables, then
//! validated. Every section has defaults so an empty file is a valid config.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use super::context::STRICT_PARAMETER_FEATURE;
use super::partner::PartnerRecord;
use super::version::ApiVersion;

/// Main gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub http: HttpConfig,
    pub security: SecurityConfig,
    pub auth: AuthConfig,
    pub identity_cache: IdentityCacheConfig,
    pub validation: ValidationConfig,
    pub cors: CorsConfig,
    pub versions: VersionsConfig,
    pub features: FeaturesConfig,
    pub partners: Vec<PartnerRecord>,
}

impl GatewayConfig {
    /// Load configuration from a TOML file and apply environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;

        let mut config = Self::parse(&content)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string (no overrides, no validation).
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply `PX_*` overrides read through `lookup`.
    ///
    /// - `PX_HTTP_HOST`, `PX_HTTP_PORT`
    /// - `PX_TOKEN_SERVICE_URL`, `PX_CERTIFICATE_SERVICE_URL`
    /// - `PX_ALLOW_UNAUTHENTICATED_HTTP`, `PX_ALLOW_UNAUTHENTICATED_HTTPS`
    /// - `PX_FORCE_STRICT_PARAMETERS`
    /// - `PX_FEATURES` (comma separated, appended)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("PX_HTTP_HOST").and_then(|v| v.parse().ok()) {
            self.http.host = host;
        }
        if let Some(port) = lookup("PX_HTTP_PORT").and_then(|v| v.parse().ok()) {
            self.http.port = port;
        }
        if let Some(url) = lookup("PX_TOKEN_SERVICE_URL") {
            self.auth.token_service_url = Some(url);
        }
        if let Some(url) = lookup("PX_CERTIFICATE_SERVICE_URL") {
            self.auth.certificate_service_url = Some(url);
        }
        if let Some(flag) = lookup("PX_ALLOW_UNAUTHENTICATED_HTTP").and_then(|v| parse_bool(&v)) {
            self.security.allow_unauthenticated_http = flag;
        }
        if let Some(flag) = lookup("PX_ALLOW_UNAUTHENTICATED_HTTPS").and_then(|v| parse_bool(&v)) {
            self.security.allow_unauthenticated_https = flag;
        }
        if let Some(flag) = lookup("PX_FORCE_STRICT_PARAMETERS").and_then(|v| parse_bool(&v)) {
            self.validation.force_strict = flag;
        }
        if let Some(features) = lookup("PX_FEATURES") {
            self.features.enabled.extend(
                features
                    .split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(str::to_string),
            );
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.versions.supported.is_empty() {
            return Err(ConfigError::Invalid("no supported api versions".into()));
        }
        for token in &self.versions.supported {
            if ApiVersion::from_token(token).is_none() {
                return Err(ConfigError::InvalidVersion(token.clone()));
            }
        }

        if self.auth.token_timeout.is_zero() || self.auth.certificate_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "collaborator timeouts cannot be 0".into(),
            ));
        }
        if self.http.request_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "request timeout cannot be 0".into(),
            ));
        }
        // Cache expiry is tracked in whole seconds.
        if self.identity_cache.ttl < Duration::from_secs(1) {
            return Err(ConfigError::InvalidTimeout(
                "identity cache ttl must be at least 1s".into(),
            ));
        }

        let mut names = HashSet::new();
        for partner in &self.partners {
            if !names.insert(partner.name.to_lowercase()) {
                return Err(ConfigError::DuplicatePartner(partner.name.clone()));
            }
            if partner.certificate_rule.is_none() && partner.application_id.is_none() {
                return Err(ConfigError::Invalid(format!(
                    "partner '{}' has neither a certificate rule nor an application id",
                    partner.name
                )));
            }
        }

        Ok(())
    }

    /// Get HTTP server bind address
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.http.host, self.http.port)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Upper bound on a whole request, handler included. Expiry cancels
    /// in-flight collaborator calls.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 8080,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Transport security rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Treat `X-Forwarded-Proto: https` from the fronting proxy as a secure channel.
    pub trust_forwarded_proto: bool,
    /// Plaintext calls get an anonymous bypass instead of 403.
    pub allow_unauthenticated_http: bool,
    /// Secure calls get an anonymous bypass without attempting auth.
    pub allow_unauthenticated_https: bool,
    /// Paths admitted anonymously, in addition to each partner's own list.
    pub unauthenticated_paths: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            trust_forwarded_proto: true,
            allow_unauthenticated_http: false,
            allow_unauthenticated_https: false,
            unauthenticated_paths: Vec::new(),
        }
    }
}

/// Authentication collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    #[serde(with = "humantime_serde")]
    pub token_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub certificate_timeout: Duration,
    /// Ask the identity service to bypass its own cache on every miss here.
    pub force_fresh_certificate_fetch: bool,
    pub token_service_url: Option<String>,
    pub certificate_service_url: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_timeout: Duration::from_secs(5),
            certificate_timeout: Duration::from_secs(5),
            force_fresh_certificate_fetch: true,
            token_service_url: None,
            certificate_service_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityCacheConfig {
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
}

impl Default for IdentityCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            cleanup_interval: Duration::from_secs(300),
        }
    }
}

/// Query parameter validation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Feature flag that enables strict (rejecting) validation.
    pub strict_feature: String,
    /// Strict regardless of the feature flag.
    pub force_strict: bool,
    /// Reject parameters that have no registered validator.
    pub reject_unknown_parameters: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            strict_feature: STRICT_PARAMETER_FEATURE.to_string(),
            force_strict: false,
            reject_unknown_parameters: false,
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub enabled: bool,
    /// Allowed origins ("*" for all)
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub expose_headers: Vec<String>,
    /// Max age for preflight cache, seconds
    pub max_age: u64,
    pub allow_credentials: bool,
}

impl CorsConfig {
    pub fn allows_origin(&self, origin: &str) -> bool {
        self.allowed_origins
            .iter()
            .any(|o| o == "*" || o.eq_ignore_ascii_case(origin))
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec!["*".to_string()],
            allowed_methods: vec![
                "GET".to_string(),
                "POST".to_string(),
                "PATCH".to_string(),
                "OPTIONS".to_string(),
            ],
            allowed_headers: vec![
                "Content-Type".to_string(),
                "Authorization".to_string(),
                "api-version".to_string(),
                "x-ms-correlation-id".to_string(),
                "x-ms-tracking-id".to_string(),
            ],
            expose_headers: vec!["x-ms-correlation-id".to_string()],
            max_age: 86400, // 24 hours
            allow_credentials: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionsConfig {
    /// External version tokens, e.g. `v7.0`.
    pub supported: Vec<String>,
}

impl Default for VersionsConfig {
    fn default() -> Self {
        Self {
            supported: vec!["v7.0".to_string()],
        }
    }
}

/// Statically enabled feature flags (used when no flighting service is wired).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    pub enabled: Vec<String>,
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {error}")]
    Io { path: String, error: String },
    #[error("failed to parse configuration: {0}")]
    Parse(String),
    #[error("invalid api version token: {0}")]
    InvalidVersion(String),
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    #[error("duplicate partner name: {0}")]
    DuplicatePartner(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Humantime serde module for Duration serialization
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() != 0 {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        } else {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        // "ms" before "s" and "m".
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map_err(|_| "invalid minutes")?
                .checked_mul(60)
                .map(Duration::from_secs)
                .ok_or("minutes out of range")
        } else if let Some(hours) = s.strip_suffix('h') {
            hours
                .trim()
                .parse::<u64>()
                .map_err(|_| "invalid hours")?
                .checked_mul(3600)
                .map(Duration::from_secs)
                .ok_or("hours out of range")
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}
