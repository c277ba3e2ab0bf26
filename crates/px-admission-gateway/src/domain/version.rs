//! Supported API versions.
//!
//! The catalog is built once at startup and read without locks afterwards.
//! External tokens compare case-insensitively ("V7.0" and "v7.0" are the same).

use std::collections::HashMap;
use std::fmt;

/// Internal numeric version (`major.minor`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InternalVersion {
    pub major: u32,
    pub minor: u32,
}

impl InternalVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for InternalVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// A supported version: the token callers send plus the internal number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApiVersion {
    external: String,
    internal: InternalVersion,
}

impl ApiVersion {
    pub fn new(external: impl Into<String>, internal: InternalVersion) -> Self {
        Self {
            external: external.into(),
            internal,
        }
    }

    /// Parse an external token such as `v7.0` into a version.
    ///
    /// Returns `None` when the token is not `v<major>.<minor>`.
    pub fn from_token(token: &str) -> Option<Self> {
        let rest = token.strip_prefix(['v', 'V'])?;
        let (major, minor) = rest.split_once('.')?;
        if major.is_empty()
            || minor.is_empty()
            || !major.bytes().all(|b| b.is_ascii_digit())
            || !minor.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }
        Some(Self::new(
            token,
            InternalVersion::new(major.parse().ok()?, minor.parse().ok()?),
        ))
    }

    pub fn external(&self) -> &str {
        &self.external
    }

    pub fn internal(&self) -> InternalVersion {
        self.internal
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.external)
    }
}

/// Process-wide table of supported versions.
#[derive(Debug, Clone, Default)]
pub struct VersionCatalog {
    by_token: HashMap<String, ApiVersion>,
}

impl VersionCatalog {
    pub fn new(versions: impl IntoIterator<Item = ApiVersion>) -> Self {
        let by_token = versions
            .into_iter()
            .map(|v| (v.external.to_ascii_lowercase(), v))
            .collect();
        Self { by_token }
    }

    /// Build a catalog from external tokens, skipping malformed ones.
    pub fn from_tokens<'a>(tokens: impl IntoIterator<Item = &'a str>) -> Self {
        Self::new(tokens.into_iter().filter_map(ApiVersion::from_token))
    }

    pub fn lookup(&self, token: &str) -> Option<&ApiVersion> {
        self.by_token.get(&token.trim().to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.by_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_token.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ApiVersion> {
        self.by_token.values()
    }
}
