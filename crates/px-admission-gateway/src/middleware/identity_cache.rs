//! Certificate identity cache.
//!
//! Claims returned by the identity service are cached per certificate
//! fingerprint for the configured TTL. Concurrent misses for the same
//! fingerprint may each call the service; the last insert wins.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use super::metrics::AdmissionMetrics;
use crate::adapters::cancel::guarded;
use crate::domain::error::CollaboratorError;
use crate::domain::identity::{CertificateFingerprint, ClientCertificate, IdentityClaim};
use crate::domain::ttl_cache::TtlCache;
use crate::ports::outbound::{CancelSignal, CertificateIdentityFetcher, TimeSource};

/// Claims for a certificate and how they were obtained.
#[derive(Debug, Clone)]
pub struct CachedLookup {
    pub claims: Arc<[IdentityClaim]>,
    pub cache_hit: bool,
    /// Identity service latency on a miss.
    pub fetch_ms: Option<u64>,
}

pub struct IdentityCache {
    entries: TtlCache<CertificateFingerprint, Arc<[IdentityClaim]>>,
    fetcher: Arc<dyn CertificateIdentityFetcher>,
    fetch_timeout: Duration,
    force_fresh: bool,
    metrics: Arc<AdmissionMetrics>,
}

impl IdentityCache {
    pub fn new(
        fetcher: Arc<dyn CertificateIdentityFetcher>,
        ttl: Duration,
        clock: Arc<dyn TimeSource>,
        fetch_timeout: Duration,
        force_fresh: bool,
        metrics: Arc<AdmissionMetrics>,
    ) -> Self {
        Self {
            entries: TtlCache::new(ttl, clock),
            fetcher,
            fetch_timeout,
            force_fresh,
            metrics,
        }
    }

    /// Cached claims for `certificate`, fetching them on a miss.
    ///
    /// Failed fetches are not cached.
    pub async fn lookup(
        &self,
        certificate: &ClientCertificate,
        cancel: CancelSignal,
    ) -> Result<CachedLookup, CollaboratorError> {
        let key = certificate.fingerprint();
        if let Some(claims) = self.entries.get(&key) {
            self.metrics.record_cache_lookup(true);
            return Ok(CachedLookup {
                claims,
                cache_hit: true,
                fetch_ms: None,
            });
        }
        self.metrics.record_cache_lookup(false);

        let started = Instant::now();
        let fetched = guarded(
            self.fetcher.fetch(certificate, self.force_fresh, cancel.clone()),
            self.fetch_timeout,
            cancel,
        )
        .await?;
        let fetch_ms = started.elapsed().as_millis() as u64;

        let claims: Arc<[IdentityClaim]> = fetched.identities.into();
        debug!(
            thumbprint = %key.thumbprint,
            result = ?fetched.result,
            claims = claims.len(),
            latency_ms = fetch_ms,
            "Fetched certificate identities"
        );
        self.entries.insert(key, Arc::clone(&claims));

        Ok(CachedLookup {
            claims,
            cache_hit: false,
            fetch_ms: Some(fetch_ms),
        })
    }

    pub fn purge_expired(&self) -> usize {
        self.entries.purge_expired()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Periodically drop expired entries.
pub async fn cleanup_task(cache: Arc<IdentityCache>, interval: Duration) {
    let mut cleanup_interval = tokio::time::interval(interval);
    cleanup_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        cleanup_interval.tick().await;
        let removed = cache.purge_expired();
        if removed > 0 {
            debug!(removed, "Cleaned up expired identity cache entries");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::{FetchResult, IdentityFetch};
    use crate::ports::outbound::ManualClock;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CertificateIdentityFetcher for CountingFetcher {
        async fn fetch(
            &self,
            certificate: &ClientCertificate,
            _force_fresh: bool,
            _cancel: CancelSignal,
        ) -> Result<IdentityFetch, CollaboratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(IdentityFetch {
                result: FetchResult::Success,
                identities: vec![IdentityClaim {
                    name: certificate.subject().to_string(),
                    is_authenticated: true,
                }],
                message: String::new(),
            })
        }
    }

    struct SlowFetcher;

    #[async_trait]
    impl CertificateIdentityFetcher for SlowFetcher {
        async fn fetch(
            &self,
            _certificate: &ClientCertificate,
            _force_fresh: bool,
            _cancel: CancelSignal,
        ) -> Result<IdentityFetch, CollaboratorError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(CollaboratorError::Transport("unreachable".into()))
        }
    }

    fn certificate() -> ClientCertificate {
        let mut params = rcgen::CertificateParams::default();
        params.distinguished_name = rcgen::DistinguishedName::new();
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, "px-cot.example.com");
        let key = rcgen::KeyPair::generate().unwrap();
        let cert = params.self_signed(&key).unwrap();
        ClientCertificate::from_der(cert.der().to_vec()).unwrap()
    }

    fn cache(
        fetcher: Arc<dyn CertificateIdentityFetcher>,
        clock: &Arc<ManualClock>,
        metrics: &Arc<AdmissionMetrics>,
    ) -> IdentityCache {
        IdentityCache::new(
            fetcher,
            Duration::from_secs(3600),
            Arc::clone(clock) as Arc<dyn TimeSource>,
            Duration::from_millis(50),
            true,
            Arc::clone(metrics),
        )
    }

    #[tokio::test]
    async fn test_single_fetch_within_ttl() {
        let fetcher = Arc::new(CountingFetcher::default());
        let clock = Arc::new(ManualClock::new(0));
        let metrics = Arc::new(AdmissionMetrics::new());
        let cache = cache(Arc::clone(&fetcher) as Arc<dyn CertificateIdentityFetcher>, &clock, &metrics);
        let cert = certificate();

        let first = cache.lookup(&cert, CancelSignal::never()).await.unwrap();
        assert!(!first.cache_hit);
        assert!(first.fetch_ms.is_some());

        clock.advance(Duration::from_secs(1800));
        let second = cache.lookup(&cert, CancelSignal::never()).await.unwrap();
        assert!(second.cache_hit);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.identity_cache_hits, 1);
        assert_eq!(snapshot.identity_cache_misses, 1);
    }

    #[tokio::test]
    async fn test_refetch_after_ttl() {
        let fetcher = Arc::new(CountingFetcher::default());
        let clock = Arc::new(ManualClock::new(0));
        let metrics = Arc::new(AdmissionMetrics::new());
        let cache = cache(Arc::clone(&fetcher) as Arc<dyn CertificateIdentityFetcher>, &clock, &metrics);
        let cert = certificate();

        cache.lookup(&cert, CancelSignal::never()).await.unwrap();
        clock.advance(Duration::from_secs(3600));
        let again = cache.lookup(&cert, CancelSignal::never()).await.unwrap();

        assert!(!again.cache_hit);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_timeout_is_not_cached() {
        let clock = Arc::new(ManualClock::new(0));
        let metrics = Arc::new(AdmissionMetrics::new());
        let cache = cache(Arc::new(SlowFetcher), &clock, &metrics);

        let result = cache.lookup(&certificate(), CancelSignal::never()).await;
        assert!(matches!(result, Err(CollaboratorError::Timeout(50))));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_purge_drops_expired() {
        let fetcher = Arc::new(CountingFetcher::default());
        let clock = Arc::new(ManualClock::new(0));
        let metrics = Arc::new(AdmissionMetrics::new());
        let cache = cache(fetcher, &clock, &metrics);

        cache.lookup(&certificate(), CancelSignal::never()).await.unwrap();
        assert_eq!(cache.len(), 1);

        clock.advance(Duration::from_secs(7200));
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }
}
