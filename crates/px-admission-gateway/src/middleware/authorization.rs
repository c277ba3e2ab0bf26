//! Authorization of an authenticated partner against the request URI.
//!
//! Stateless: the decision depends only on the partner record and the path.

use axum::http::Uri;

use crate::domain::partner::{PartnerRecord, Role, ACCOUNT_PLACEHOLDER};
use crate::domain::routes::{is_account_id, is_version_segment};

#[derive(Debug, Default, Clone, Copy)]
pub struct AuthorizationPolicy;

impl AuthorizationPolicy {
    pub fn new() -> Self {
        Self
    }

    pub fn is_authorized(&self, partner: &PartnerRecord, uri: &Uri) -> bool {
        if partner.role == Role::Admin {
            return true;
        }

        let template: Vec<&str> = segments(&partner.allowed_authenticated_path_template).collect();
        if template.is_empty() {
            return false;
        }
        let request: Vec<&str> = segments(uri.path()).collect();

        if matches_template(partner, &template, &request) {
            return true;
        }

        // The gateway may sit behind a proxy that strips the service name.
        let leading = template[0];
        leading != ACCOUNT_PLACEHOLDER
            && !is_version_segment(leading)
            && matches_template(partner, &template[1..], &request)
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn matches_template(partner: &PartnerRecord, template: &[&str], request: &[&str]) -> bool {
    if template.is_empty() {
        return false;
    }
    for (i, expected) in template.iter().enumerate() {
        let Some(actual) = request.get(i) else {
            return false;
        };
        if *expected == ACCOUNT_PLACEHOLDER {
            // A controller name where the account would be: nothing to scope.
            return !is_account_id(actual) || partner.allows_account(actual);
        }
        if !expected.eq_ignore_ascii_case(actual) {
            return false;
        }
    }
    true
}

/// Whether `path` starts with `prefix` on a segment boundary, ignoring case.
pub fn path_has_prefix(path: &str, prefix: &str) -> bool {
    let mut path = segments(path);
    let mut matched = false;
    for expected in segments(prefix) {
        match path.next() {
            Some(actual) if actual.eq_ignore_ascii_case(expected) => matched = true,
            _ => return false,
        }
    }
    matched
}
