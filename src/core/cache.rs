use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Provider responses are considered fresh for a week by default.
pub const DEFAULT_TTL_DAYS: i64 = 7;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub data: V,
    pub fetched_at: DateTime<Utc>,
    /// Set when `data` is a fallback for a failed fetch.
    pub failed: bool,
}

impl<V> CacheEntry<V> {
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        !self.failed && now - self.fetched_at < ttl
    }
}

/// Cache keys are trimmed, uppercased symbols.
pub fn cache_key(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// Per-symbol memo with a time-to-live checked on read.
///
/// Entries are never evicted; stale ones are simply ignored until replaced.
/// Clones share the same storage.
#[derive(Clone)]
pub struct FreshnessCache<V, C = SystemClock>
where
    V: Clone + Send + Sync + 'static,
    C: Clock,
{
    inner: Arc<Mutex<HashMap<String, CacheEntry<V>>>>,
    ttl: Duration,
    clock: Arc<C>,
}

impl<V> FreshnessCache<V, SystemClock>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::with_clock(Duration::days(DEFAULT_TTL_DAYS), SystemClock)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self::with_clock(ttl, SystemClock)
    }
}

impl<V> Default for FreshnessCache<V, SystemClock>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V, C> FreshnessCache<V, C>
where
    V: Clone + Send + Sync + 'static,
    C: Clock,
{
    pub fn with_clock(ttl: Duration, clock: C) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            ttl,
            clock: Arc::new(clock),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Current time according to the cache's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Returns the entry for `symbol` only while it is fresh.
    pub async fn get(&self, symbol: &str) -> Option<CacheEntry<V>> {
        let key = cache_key(symbol);
        let cache = self.inner.lock().await;
        match cache.get(&key) {
            Some(entry) if entry.is_fresh(self.clock.now(), self.ttl) => {
                debug!("Cache HIT for {}", key);
                Some(entry.clone())
            }
            Some(_) => {
                debug!("Cache STALE for {}", key);
                None
            }
            None => {
                debug!("Cache MISS for {}", key);
                None
            }
        }
    }

    pub async fn put(&self, symbol: &str, data: V) -> DateTime<Utc> {
        self.insert(symbol, data, false).await
    }

    /// Stores a fallback for a failed fetch. It replaces any previous entry
    /// but is never served as fresh.
    pub async fn put_failed(&self, symbol: &str, data: V) -> DateTime<Utc> {
        self.insert(symbol, data, true).await
    }

    async fn insert(&self, symbol: &str, data: V, failed: bool) -> DateTime<Utc> {
        let key = cache_key(symbol);
        let fetched_at = self.clock.now();
        let mut cache = self.inner.lock().await;
        debug!(failed, "Cache PUT for {}", key);
        cache.insert(
            key,
            CacheEntry {
                data,
                fetched_at,
                failed,
            },
        );
        fetched_at
    }

    /// Stored entry regardless of freshness.
    #[cfg(test)]
    pub(crate) async fn peek(&self, symbol: &str) -> Option<CacheEntry<V>> {
        self.inner.lock().await.get(&cache_key(symbol)).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}
