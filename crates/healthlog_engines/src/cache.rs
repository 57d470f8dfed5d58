#![forbid(unsafe_code)]

use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use healthlog_kernel_contracts::model::ModelExtraction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionCacheConfig {
    pub capacity: usize,
    pub ttl: Duration,
}

impl ExtractionCacheConfig {
    pub fn mvp_v1() -> Self {
        Self {
            capacity: 500,
            ttl: Duration::from_secs(3 * 24 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    extraction: ModelExtraction,
    touched_at: Instant,
}

/// Model extractions keyed by normalized input text. Reads refresh an entry's age;
/// expired entries are dropped on access or by [`ExtractionCache::purge_expired`].
/// At capacity the least recently touched entry is evicted.
#[derive(Debug)]
pub struct ExtractionCache {
    config: ExtractionCacheConfig,
    entries: DashMap<String, CacheEntry>,
    // Serializes writers so the capacity check and the insert act as one step.
    write_lock: Mutex<()>,
}

impl ExtractionCache {
    pub fn new(config: ExtractionCacheConfig) -> Self {
        Self {
            config,
            entries: DashMap::with_capacity(config.capacity),
            write_lock: Mutex::new(()),
        }
    }

    pub fn get(&self, key: &str) -> Option<ModelExtraction> {
        self.get_at(key, Instant::now())
    }

    pub fn insert(&self, key: &str, extraction: ModelExtraction) {
        self.insert_at(key, extraction, Instant::now());
    }

    pub fn get_at(&self, key: &str, now: Instant) -> Option<ModelExtraction> {
        {
            let mut entry = self.entries.get_mut(key)?;
            if !self.is_expired(&entry, now) {
                entry.touched_at = now;
                return Some(entry.extraction.clone());
            }
        }
        // The shard lock is released above; only remove if still expired.
        self.entries
            .remove_if(key, |_, entry| self.is_expired(entry, now));
        debug!("cache entry expired");
        None
    }

    pub fn insert_at(&self, key: &str, extraction: ModelExtraction, now: Instant) {
        if self.config.capacity == 0 {
            return;
        }
        let _guard = self.write_lock.lock();
        if !self.entries.contains_key(key) && self.entries.len() >= self.config.capacity {
            self.purge_expired(now);
            while self.entries.len() >= self.config.capacity {
                if !self.evict_oldest() {
                    break;
                }
            }
        }
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                extraction,
                touched_at: now,
            },
        );
    }

    pub fn purge_expired(&self, now: Instant) {
        self.entries.retain(|_, entry| !self.is_expired(entry, now));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    fn is_expired(&self, entry: &CacheEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.touched_at) >= self.config.ttl
    }

    fn evict_oldest(&self) -> bool {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|e| e.value().touched_at)
            .map(|e| (e.key().clone(), e.value().touched_at));
        let Some((key, touched_at)) = oldest else {
            return false;
        };
        // A concurrent read may have refreshed it; then it is no longer the oldest.
        let removed = self
            .entries
            .remove_if(&key, |_, entry| entry.touched_at == touched_at)
            .is_some();
        if removed {
            debug!("cache evicted least recently used entry");
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::thread;

    use healthlog_kernel_contracts::parse::Intent;

    fn extraction(intent: Intent) -> ModelExtraction {
        ModelExtraction {
            intent,
            slots: BTreeMap::new(),
            confidence: Some(0.8),
            missing: vec![],
        }
    }

    fn small(capacity: usize, ttl_secs: u64) -> ExtractionCache {
        ExtractionCache::new(ExtractionCacheConfig {
            capacity,
            ttl: Duration::from_secs(ttl_secs),
        })
    }

    #[test]
    fn at_cache_01_hit_within_ttl() {
        let cache = small(10, 60);
        let t0 = Instant::now();
        cache.insert_at("pho", extraction(Intent::Food), t0);
        assert_eq!(
            cache.get_at("pho", t0 + Duration::from_secs(30)),
            Some(extraction(Intent::Food))
        );
        assert_eq!(cache.get_at("ramen", t0), None);
    }

    #[test]
    fn at_cache_02_expires_after_ttl() {
        let cache = small(10, 60);
        let t0 = Instant::now();
        cache.insert_at("pho", extraction(Intent::Food), t0);
        assert_eq!(cache.get_at("pho", t0 + Duration::from_secs(60)), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn at_cache_03_access_refreshes_age() {
        let cache = small(10, 60);
        let t0 = Instant::now();
        cache.insert_at("pho", extraction(Intent::Food), t0);
        assert!(cache.get_at("pho", t0 + Duration::from_secs(50)).is_some());
        assert!(cache.get_at("pho", t0 + Duration::from_secs(100)).is_some());
        assert!(cache.get_at("pho", t0 + Duration::from_secs(161)).is_none());
    }

    #[test]
    fn at_cache_04_capacity_evicts_least_recently_touched() {
        let cache = small(2, 600);
        let t0 = Instant::now();
        cache.insert_at("a", extraction(Intent::Food), t0);
        cache.insert_at("b", extraction(Intent::Drink), t0 + Duration::from_secs(1));
        assert!(cache.get_at("a", t0 + Duration::from_secs(2)).is_some());
        cache.insert_at("c", extraction(Intent::Bm), t0 + Duration::from_secs(3));
        assert_eq!(cache.len(), 2);
        assert!(cache.get_at("b", t0 + Duration::from_secs(4)).is_none());
        assert!(cache.get_at("a", t0 + Duration::from_secs(4)).is_some());
        assert!(cache.get_at("c", t0 + Duration::from_secs(4)).is_some());
    }

    #[test]
    fn at_cache_05_concurrent_access_stays_bounded() {
        let cache = Arc::new(small(50, 600));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..200 {
                        let key = format!("k{}", (t * 1000) + i);
                        cache.insert(&key, extraction(Intent::Food));
                        let _ = cache.get(&key);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(cache.len() <= 50);
        assert!(!cache.is_empty());
    }
}
