//! Admission counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::domain::error::AdmissionError;
use crate::domain::identity::AuthMethod;

/// Admission gateway metrics
#[derive(Debug, Default)]
pub struct AdmissionMetrics {
    // Request counters
    requests_total: AtomicU64,
    requests_admitted: AtomicU64,
    requests_timed_out: AtomicU64,

    // Rejections by class
    rejected_bad_request: AtomicU64,
    rejected_unauthorized: AtomicU64,
    rejected_forbidden: AtomicU64,
    rejected_not_found: AtomicU64,

    // Authentication
    token_successes: AtomicU64,
    certificate_successes: AtomicU64,
    anonymous_bypasses: AtomicU64,
    identity_cache_hits: AtomicU64,
    identity_cache_misses: AtomicU64,

    validation_soft_failures: AtomicU64,
    incomplete_responses: AtomicU64,

    total_latency_ms: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub requests_admitted: u64,
    pub requests_timed_out: u64,
    pub rejected_bad_request: u64,
    pub rejected_unauthorized: u64,
    pub rejected_forbidden: u64,
    pub rejected_not_found: u64,
    pub token_successes: u64,
    pub certificate_successes: u64,
    pub anonymous_bypasses: u64,
    pub identity_cache_hits: u64,
    pub identity_cache_misses: u64,
    pub validation_soft_failures: u64,
    pub incomplete_responses: u64,
}

impl AdmissionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished request and its latency.
    pub fn record_request(&self, latency_ms: u64) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms
            .fetch_add(latency_ms, Ordering::Relaxed);
    }

    pub fn record_admitted(&self) {
        self.requests_admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.requests_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejection(&self, error: &AdmissionError) {
        let counter = match error.class() {
            "bad_request" => &self.rejected_bad_request,
            "unauthorized" => &self.rejected_unauthorized,
            "forbidden" => &self.rejected_forbidden,
            _ => &self.rejected_not_found,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_authenticated(&self, method: AuthMethod) {
        let counter = match method {
            AuthMethod::Token => &self.token_successes,
            AuthMethod::Certificate => &self.certificate_successes,
            AuthMethod::AnonymousBypass => &self.anonymous_bypasses,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_lookup(&self, hit: bool) {
        if hit {
            self.identity_cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.identity_cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_soft_invalid(&self) {
        self.validation_soft_failures
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_incomplete_response(&self) {
        self.incomplete_responses.fetch_add(1, Ordering::Relaxed);
    }

    /// Get average latency in ms
    pub fn average_latency_ms(&self) -> f64 {
        let total = self.total_latency_ms.load(Ordering::Relaxed);
        let count = self.requests_total.load(Ordering::Relaxed);
        if count == 0 {
            0.0
        } else {
            total as f64 / count as f64
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            requests_total: load(&self.requests_total),
            requests_admitted: load(&self.requests_admitted),
            requests_timed_out: load(&self.requests_timed_out),
            rejected_bad_request: load(&self.rejected_bad_request),
            rejected_unauthorized: load(&self.rejected_unauthorized),
            rejected_forbidden: load(&self.rejected_forbidden),
            rejected_not_found: load(&self.rejected_not_found),
            token_successes: load(&self.token_successes),
            certificate_successes: load(&self.certificate_successes),
            anonymous_bypasses: load(&self.anonymous_bypasses),
            identity_cache_hits: load(&self.identity_cache_hits),
            identity_cache_misses: load(&self.identity_cache_misses),
            validation_soft_failures: load(&self.validation_soft_failures),
            incomplete_responses: load(&self.incomplete_responses),
        }
    }

    /// Export metrics as JSON
    pub fn to_json(&self) -> serde_json::Value {
        let s = self.snapshot();
        serde_json::json!({
            "requests": {
                "total": s.requests_total,
                "admitted": s.requests_admitted,
                "timed_out": s.requests_timed_out,
            },
            "rejections": {
                "bad_request": s.rejected_bad_request,
                "unauthorized": s.rejected_unauthorized,
                "forbidden": s.rejected_forbidden,
                "not_found": s.rejected_not_found,
            },
            "auth": {
                "token": s.token_successes,
                "certificate": s.certificate_successes,
                "anonymous": s.anonymous_bypasses,
                "cache_hits": s.identity_cache_hits,
                "cache_misses": s.identity_cache_misses,
            },
            "validation": {
                "soft_failures": s.validation_soft_failures,
            },
            "responses": {
                "incomplete": s.incomplete_responses,
            },
            "latency": {
                "average_ms": self.average_latency_ms(),
            }
        })
    }
}

/// Request timing helper
pub struct RequestTimer {
    start: Instant,
    metrics: Arc<AdmissionMetrics>,
}

impl RequestTimer {
    pub fn new(metrics: Arc<AdmissionMetrics>) -> Self {
        Self {
            start: Instant::now(),
            metrics,
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    pub fn finish(self) {
        self.metrics.record_request(self.elapsed_ms());
    }
}
