use crate::core::cache::{Clock, FreshnessCache, SystemClock, cache_key};
use crate::core::provider::{MetricsProvider, MetricsReport};
use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

/// Serves provider reports from a [`FreshnessCache`] while they are fresh.
///
/// Every fetch outcome replaces the cached entry. Failures are stored as the
/// all-null fallback report and are never served from the cache.
pub struct CachingMetricsProvider<P: MetricsProvider, C: Clock = SystemClock> {
    inner: P,
    cache: FreshnessCache<MetricsReport, C>,
}

impl<P: MetricsProvider, C: Clock> CachingMetricsProvider<P, C> {
    pub fn new(inner: P, cache: FreshnessCache<MetricsReport, C>) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &FreshnessCache<MetricsReport, C> {
        &self.cache
    }
}

#[async_trait]
impl<P: MetricsProvider, C: Clock + 'static> MetricsProvider for CachingMetricsProvider<P, C> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn fetch_metrics(&self, symbol: &str) -> Result<MetricsReport> {
        let key = cache_key(symbol);
        if let Some(entry) = self.cache.get(&key).await {
            debug!("Cache hit for metrics: {}", key);
            let mut report = entry.data;
            report.cache.fundamentals_used_from_cache = true;
            report.cache.fundamentals_fetched_at = Some(entry.fetched_at);
            return Ok(report);
        }

        debug!("Cache miss for metrics: {}", key);
        match self.inner.fetch_metrics(&key).await {
            Ok(mut report) => {
                let fetched_at = self.cache.put(&key, report.clone()).await;
                report.cache.fundamentals_used_from_cache = false;
                report.cache.fundamentals_fetched_at = Some(fetched_at);
                Ok(report)
            }
            Err(e) => {
                let fallback = MetricsReport::fallback(
                    &key,
                    self.inner.name(),
                    &e.to_string(),
                    self.cache.now(),
                );
                self.cache.put_failed(&key, fallback).await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::testing::ManualClock;
    use crate::core::metrics::{Metric, MetricSet};
    use crate::core::provider::CacheInfo;
    use anyhow::anyhow;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct MockInnerProvider {
        call_count: AtomicUsize,
        failing: AtomicBool,
    }

    impl MockInnerProvider {
        fn new() -> Self {
            Self {
                call_count: AtomicUsize::new(0),
                failing: AtomicBool::new(false),
            }
        }

        fn calls(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl<'a> MetricsProvider for &'a MockInnerProvider {
        fn name(&self) -> &str {
            "mock"
        }

        async fn fetch_metrics(&self, symbol: &str) -> Result<MetricsReport> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) || symbol == "BAD" {
                return Err(anyhow!("Unknown symbol"));
            }
            Ok(MetricsReport {
                symbol: symbol.to_string(),
                company_name: symbol.to_string(),
                fetched_at: Utc::now(),
                source: "mock".to_string(),
                metrics: MetricSet::from_values([(Metric::Roic, Some(0.2))], "", "mock"),
                price: None,
                cache: CacheInfo::default(),
                error_message: None,
            })
        }
    }

    fn cached<'a>(
        inner: &'a MockInnerProvider,
        clock: &Arc<ManualClock>,
    ) -> CachingMetricsProvider<&'a MockInnerProvider, Arc<ManualClock>> {
        let cache = FreshnessCache::with_clock(Duration::days(7), Arc::clone(clock));
        CachingMetricsProvider::new(inner, cache)
    }

    fn start() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_caching_metrics_provider() {
        let inner = MockInnerProvider::new();
        let clock = Arc::new(ManualClock::new(start()));
        let provider = cached(&inner, &clock);

        // First call - should hit inner provider
        let first = provider.fetch_metrics("ko").await.unwrap();
        assert_eq!(first.symbol, "KO");
        assert!(!first.cache.fundamentals_used_from_cache);
        assert_eq!(first.cache.fundamentals_fetched_at, Some(start()));
        assert_eq!(inner.calls(), 1);

        // Second call - served from cache, key normalized
        let second = provider.fetch_metrics(" KO ").await.unwrap();
        assert!(second.cache.fundamentals_used_from_cache);
        assert_eq!(second.metrics.value(Metric::Roic), Some(0.2));
        assert_eq!(inner.calls(), 1);

        // Different symbol goes upstream
        provider.fetch_metrics("PEP").await.unwrap();
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test]
    async fn test_stale_entry_is_refetched() {
        let inner = MockInnerProvider::new();
        let clock = Arc::new(ManualClock::new(start()));
        let provider = cached(&inner, &clock);

        provider.fetch_metrics("KO").await.unwrap();
        clock.advance(Duration::days(6) + Duration::hours(23));
        provider.fetch_metrics("KO").await.unwrap();
        assert_eq!(inner.calls(), 1);

        clock.advance(Duration::hours(1) + Duration::minutes(1));
        let refreshed = provider.fetch_metrics("KO").await.unwrap();
        assert_eq!(inner.calls(), 2);
        assert!(!refreshed.cache.fundamentals_used_from_cache);
    }

    #[tokio::test]
    async fn test_failures_are_stored_but_never_fresh() {
        let inner = MockInnerProvider::new();
        let clock = Arc::new(ManualClock::new(start()));
        let provider = cached(&inner, &clock);

        provider.fetch_metrics("KO").await.unwrap();
        clock.advance(Duration::days(8));

        inner.failing.store(true, Ordering::SeqCst);
        assert!(provider.fetch_metrics("KO").await.is_err());
        assert_eq!(inner.calls(), 2);
        // The failed fetch replaced the stale entry but is not served.
        assert!(provider.cache().get("KO").await.is_none());

        assert!(provider.fetch_metrics("KO").await.is_err());
        assert_eq!(inner.calls(), 3);

        inner.failing.store(false, Ordering::SeqCst);
        assert!(provider.fetch_metrics("KO").await.is_ok());
        assert_eq!(inner.calls(), 4);
        assert_eq!(provider.cache().len().await, 1);
    }

    #[tokio::test]
    async fn test_failure_fallback_uses_cache_clock() {
        let inner = MockInnerProvider::new();
        let clock = Arc::new(ManualClock::new(start()));
        let provider = cached(&inner, &clock);

        clock.advance(Duration::days(2));
        assert!(provider.fetch_metrics("BAD").await.is_err());

        let entry = provider.cache().peek("BAD").await.unwrap();
        assert!(entry.failed);
        assert_eq!(entry.fetched_at, start() + Duration::days(2));
        assert_eq!(entry.data.fetched_at, entry.fetched_at);
        assert_eq!(entry.data.error_message.as_deref(), Some("Unknown symbol"));
    }
}
