// ── Weather cache ──
//
// Bounded TTL cache in front of the weather provider. Lookups for the
// same `(city, units)` key are single-flight: concurrent callers wait on
// one provider request. Failures never reach the caller; they produce a
// fallback value that is cached for a shorter lifetime.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::WeatherCacheConfig;
use crate::convert::weather_from_current;
use crate::error::CoreError;
use crate::model::{Units, Weather};

/// Something that can look up current weather.
#[async_trait]
pub trait WeatherLookup: Send + Sync {
    async fn lookup(&self, city: &str, units: Units) -> Result<Weather, CoreError>;
}

#[async_trait]
impl WeatherLookup for stayboard_api::WeatherClient {
    async fn lookup(&self, city: &str, units: Units) -> Result<Weather, CoreError> {
        let current = self.current(city, &units.to_string()).await?;
        Ok(weather_from_current(current, units))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    city: String,
    units: Units,
}

impl CacheKey {
    fn new(city: &str, units: Units) -> Self {
        Self {
            city: city.trim().to_lowercase(),
            units,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Weather,
    fetched_at: Instant,
    expires_at: Instant,
}

type Slot = Arc<Mutex<Option<CacheEntry>>>;

/// Shared weather cache. Construct once and hand out via `Arc`.
pub struct WeatherCache {
    lookup: Arc<dyn WeatherLookup>,
    config: WeatherCacheConfig,
    slots: DashMap<CacheKey, Slot>,
}

impl WeatherCache {
    pub fn new(lookup: Arc<dyn WeatherLookup>, config: WeatherCacheConfig) -> Self {
        Self {
            lookup,
            config,
            slots: DashMap::new(),
        }
    }

    /// Current weather for `city`, from cache when fresh.
    ///
    /// Never fails: provider errors yield `Weather::fallback`.
    pub async fn get(&self, city: &str, units: Units) -> Weather {
        let key = CacheKey::new(city, units);
        // Clone the slot out so no map shard lock is held across await.
        let slot: Slot = Arc::clone(self.slots.entry(key.clone()).or_default().value());

        let mut entry = slot.lock().await;
        let now = Instant::now();
        if let Some(cached) = entry.as_ref().filter(|e| e.expires_at > now) {
            debug!(city = %key.city, %units, "weather cache hit");
            return cached.value.clone();
        }

        let (value, ttl) = match self.lookup.lookup(city, units).await {
            Ok(weather) => (weather, self.config.ttl),
            Err(e) => {
                warn!(city = %key.city, error = %e, "weather lookup failed, using fallback");
                (Weather::fallback(city.trim(), units), self.config.failure_ttl)
            }
        };
        let fetched_at = Instant::now();
        *entry = Some(CacheEntry {
            value: value.clone(),
            fetched_at,
            expires_at: fetched_at + ttl,
        });
        drop(entry);

        self.evict_over_capacity(&key);
        value
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drop every cached value.
    pub fn clear(&self) {
        self.slots.clear();
    }

    /// Evict the oldest-fetched entries until within `max_entries`.
    /// Slots that are mid-lookup are skipped; `keep` is never evicted.
    fn evict_over_capacity(&self, keep: &CacheKey) {
        while self.slots.len() > self.config.max_entries {
            let oldest = self
                .slots
                .iter()
                .filter(|r| r.key() != keep)
                .filter_map(|r| {
                    let fetched_at = r.value().try_lock().ok()?.as_ref()?.fetched_at;
                    Some((r.key().clone(), fetched_at))
                })
                .min_by_key(|(_, fetched_at)| *fetched_at);

            match oldest {
                Some((key, _)) => {
                    debug!(city = %key.city, "evicting weather entry");
                    self.slots.remove(&key);
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::model::WeatherSource;

    #[derive(Default)]
    struct CountingLookup {
        calls: AtomicUsize,
        fail: AtomicBool,
    }

    #[async_trait]
    impl WeatherLookup for CountingLookup {
        async fn lookup(&self, city: &str, units: Units) -> Result<Weather, CoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            if self.fail.load(Ordering::SeqCst) {
                return Err(CoreError::ThirdPartyDegraded {
                    message: "provider down".into(),
                });
            }
            Ok(Weather {
                city: city.to_owned(),
                units,
                temperature: 61.0,
                description: "clear sky".into(),
                icon: "01d".into(),
                humidity: Some(40),
                wind_speed: Some(3.5),
                source: WeatherSource::Live,
            })
        }
    }

    fn cache(lookup: &Arc<CountingLookup>, max_entries: usize) -> WeatherCache {
        WeatherCache::new(
            lookup.clone(),
            WeatherCacheConfig {
                max_entries,
                ..WeatherCacheConfig::default()
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_entries_are_served_from_cache() {
        let lookup = Arc::new(CountingLookup::default());
        let cache = cache(&lookup, 8);

        let first = cache.get("Denver", Units::Imperial).await;
        let second = cache.get(" denver ", Units::Imperial).await;
        assert_eq!(first, second);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);

        // Different units are a different key.
        cache.get("Denver", Units::Metric).await;
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let lookup = Arc::new(CountingLookup::default());
        let cache = cache(&lookup, 8);

        cache.get("Denver", Units::Imperial).await;
        tokio::time::advance(Duration::from_secs(29 * 60)).await;
        cache.get("Denver", Units::Imperial).await;
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(2 * 60)).await;
        cache.get("Denver", Units::Imperial).await;
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_lookups_are_single_flight() {
        let lookup = Arc::new(CountingLookup::default());
        let cache = Arc::new(cache(&lookup, 8));

        let tasks: Vec<_> = (0..5)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get("Lisbon", Units::Metric).await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().is_live());
        }
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_yield_fallback_with_short_ttl() {
        let lookup = Arc::new(CountingLookup::default());
        lookup.fail.store(true, Ordering::SeqCst);
        let cache = cache(&lookup, 8);

        let weather = cache.get("Atlantis", Units::Metric).await;
        assert_eq!(weather.source, WeatherSource::Fallback);
        assert_eq!(weather.description, Weather::FALLBACK_DESCRIPTION);

        cache.get("Atlantis", Units::Metric).await;
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);

        lookup.fail.store(false, Ordering::SeqCst);
        tokio::time::advance(Duration::from_secs(5 * 60 + 1)).await;
        assert!(cache.get("Atlantis", Units::Metric).await.is_live());
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn oldest_entry_is_evicted_at_capacity() {
        let lookup = Arc::new(CountingLookup::default());
        let cache = cache(&lookup, 2);

        cache.get("A", Units::Metric).await;
        cache.get("B", Units::Metric).await;
        cache.get("C", Units::Metric).await;
        assert_eq!(cache.len(), 2);

        // "A" was evicted, so it is fetched again.
        cache.get("A", Units::Metric).await;
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 4);
    }
}
