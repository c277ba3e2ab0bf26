//! Trusted partner directory.
//!
//! Records are loaded once from configuration and shared behind `Arc`.
//! Lookups never fail: an unknown caller is `None`, not an error.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::identity::{normalize_distinguished_name, normalize_thumbprint};

/// Wildcard entry in `allowed_accounts` that admits any account id.
pub const ANY_ACCOUNT: &str = "*";

/// Placeholder in a path template that stands for the account id segment.
pub const ACCOUNT_PLACEHOLDER: &str = "{0}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Authorized for every path.
    Admin,
    User,
    Test,
}

/// Certificate identity a partner must present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRule {
    pub subject: String,
    #[serde(default)]
    pub issuer: Option<String>,
    /// When set, the presented certificate must carry this thumbprint.
    #[serde(default)]
    pub thumbprint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerRecord {
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub certificate_rule: Option<CertificateRule>,
    #[serde(default)]
    pub application_id: Option<String>,
    /// Path prefix such as `/pxservice/v7.0/{0}`, where `{0}` is the account id.
    pub allowed_authenticated_path_template: String,
    #[serde(default)]
    pub allowed_accounts: Vec<String>,
    #[serde(default)]
    pub allowed_unauthenticated_paths: Vec<String>,
}

impl PartnerRecord {
    pub fn allows_account(&self, account_id: &str) -> bool {
        self.allowed_accounts
            .iter()
            .any(|a| a == ANY_ACCOUNT || a.trim().eq_ignore_ascii_case(account_id))
    }

    /// Check an optional thumbprint pin against a normalized thumbprint.
    pub fn thumbprint_pin_matches(&self, normalized_thumbprint: &str) -> bool {
        use subtle::ConstantTimeEq;

        match self
            .certificate_rule
            .as_ref()
            .and_then(|r| r.thumbprint.as_deref())
        {
            None => true,
            Some(pinned) => {
                let pinned = normalize_thumbprint(pinned);
                pinned.len() == normalized_thumbprint.len()
                    && bool::from(pinned.as_bytes().ct_eq(normalized_thumbprint.as_bytes()))
            }
        }
    }
}

/// Read-only partner table, indexed by certificate subject and application id.
#[derive(Debug, Default)]
pub struct PartnerDirectory {
    records: Vec<Arc<PartnerRecord>>,
    by_subject: HashMap<String, Arc<PartnerRecord>>,
    by_application_id: HashMap<String, Arc<PartnerRecord>>,
}

impl PartnerDirectory {
    pub fn new(records: impl IntoIterator<Item = PartnerRecord>) -> Self {
        let mut directory = Self::default();
        for record in records {
            let record = Arc::new(record);
            if let Some(rule) = &record.certificate_rule {
                directory.by_subject.insert(
                    normalize_distinguished_name(&rule.subject).to_lowercase(),
                    Arc::clone(&record),
                );
            }
            if let Some(app_id) = &record.application_id {
                directory
                    .by_application_id
                    .insert(app_id.trim().to_lowercase(), Arc::clone(&record));
            }
            directory.records.push(record);
        }
        directory
    }

    /// Find a partner by certificate subject; the subject is normalized first.
    pub fn find_by_subject(&self, subject: &str) -> Option<Arc<PartnerRecord>> {
        self.by_subject
            .get(&normalize_distinguished_name(subject).to_lowercase())
            .cloned()
    }

    pub fn find_by_application_id(&self, application_id: &str) -> Option<Arc<PartnerRecord>> {
        self.by_application_id
            .get(&application_id.trim().to_lowercase())
            .cloned()
    }

    /// Every unauthenticated path any partner declares.
    pub fn unauthenticated_paths(&self) -> impl Iterator<Item = &str> {
        self.records
            .iter()
            .flat_map(|r| r.allowed_unauthenticated_paths.iter())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
