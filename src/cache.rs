//! Time-to-live cache service.
//!
//! Used for brand logos and other slow-to-fetch display assets. Entries
//! expire `ttl` after insertion; expired entries are evicted when read, on
//! an explicit sweep, and when a persisted cache is loaded. Persistence is
//! a zstd-compressed bincode file.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const ZSTD_LEVEL: i32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache file I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("Cache file is corrupt: {0}")]
    Encoding(#[from] bincode::Error),
}

/// Source of the current time
pub trait Clock {
    fn now(&self) -> SystemTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

fn unix_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Capability interface for a keyed cache
pub trait CacheService<V> {
    /// Live value for `key`; an expired entry is evicted and `None` returned
    fn get(&mut self, key: &str) -> Option<V>;

    fn insert(&mut self, key: &str, value: V);

    fn remove(&mut self, key: &str) -> Option<V>;

    /// Drop every expired entry, returning how many were removed
    fn evict_expired(&mut self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry<V> {
    value: V,
    /// Unix time in milliseconds
    inserted_at: u64,
}

/// In-memory TTL cache with an injected clock
#[derive(Debug)]
pub struct TtlCache<V, C = SystemClock> {
    ttl: Duration,
    clock: C,
    entries: HashMap<String, CacheEntry<V>>,
}

impl<V> TtlCache<V, SystemClock> {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, SystemClock)
    }
}

impl<V, C: Clock> TtlCache<V, C> {
    pub fn with_clock(ttl: Duration, clock: C) -> Self {
        Self {
            ttl,
            clock,
            entries: HashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn ttl_millis(&self) -> u64 {
        self.ttl.as_millis() as u64
    }

    fn is_expired(&self, entry: &CacheEntry<V>, now: u64) -> bool {
        now.saturating_sub(entry.inserted_at) >= self.ttl_millis()
    }
}

impl<V: Clone, C: Clock> CacheService<V> for TtlCache<V, C> {
    fn get(&mut self, key: &str) -> Option<V> {
        let now = unix_millis(self.clock.now());
        let expired = self.is_expired(self.entries.get(key)?, now);
        if expired {
            log::debug!("Cache entry '{}' expired", key);
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|e| e.value.clone())
    }

    fn insert(&mut self, key: &str, value: V) {
        let inserted_at = unix_millis(self.clock.now());
        self.entries
            .insert(key.to_string(), CacheEntry { value, inserted_at });
    }

    fn remove(&mut self, key: &str) -> Option<V> {
        self.entries.remove(key).map(|e| e.value)
    }

    fn evict_expired(&mut self) -> usize {
        let now = unix_millis(self.clock.now());
        let ttl = self.ttl_millis();
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_sub(entry.inserted_at) < ttl);
        before - self.entries.len()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<V: Serialize + DeserializeOwned, C: Clock> TtlCache<V, C> {
    /// Write all entries, expired or not, to `path`
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        let encoded = bincode::serialize(&self.entries)?;
        let compressed = zstd::encode_all(encoded.as_slice(), ZSTD_LEVEL)?;
        fs::write(path, compressed)?;
        log::debug!("Saved {} cache entries to {}", self.entries.len(), path.display());
        Ok(())
    }

    /// Load a cache from `path`, dropping entries that have already expired.
    ///
    /// A missing file yields an empty cache.
    pub fn load(path: &Path, ttl: Duration, clock: C) -> Result<Self, CacheError> {
        let mut cache = Self::with_clock(ttl, clock);
        let compressed = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(cache),
            Err(e) => return Err(e.into()),
        };

        let encoded = zstd::decode_all(compressed.as_slice())?;
        cache.entries = bincode::deserialize(&encoded)?;

        let now = unix_millis(cache.clock.now());
        let ttl = cache.ttl_millis();
        cache
            .entries
            .retain(|_, entry| now.saturating_sub(entry.inserted_at) < ttl);
        log::debug!("Loaded {} live cache entries from {}", cache.entries.len(), path.display());
        Ok(cache)
    }
}

/// Logo URLs keyed by brand name
pub struct LogoCache<C: Clock = SystemClock> {
    inner: TtlCache<String, C>,
}

impl<C: Clock> LogoCache<C> {
    pub fn new(inner: TtlCache<String, C>) -> Self {
        Self { inner }
    }

    /// Brand names compare case-insensitively and ignore surrounding whitespace
    pub fn normalize_brand(brand: &str) -> String {
        brand.trim().to_lowercase()
    }

    pub fn logo(&mut self, brand: &str) -> Option<String> {
        self.inner.get(&Self::normalize_brand(brand))
    }

    pub fn store_logo(&mut self, brand: &str, url: &str) {
        self.inner.insert(&Self::normalize_brand(brand), url.to_string());
    }

    /// Return the cached logo or fetch, store and return a fresh one
    pub fn logo_or_fetch<E>(
        &mut self,
        brand: &str,
        fetch: impl FnOnce(&str) -> Result<String, E>,
    ) -> Result<String, E> {
        if let Some(url) = self.logo(brand) {
            return Ok(url);
        }
        let url = fetch(brand)?;
        self.store_logo(brand, &url);
        Ok(url)
    }

    pub fn evict_expired(&mut self) -> usize {
        self.inner.evict_expired()
    }

    /// Persist the cached logos to `path`
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        self.inner.save(path)
    }

    pub fn cache(&self) -> &TtlCache<String, C> {
        &self.inner
    }
}
