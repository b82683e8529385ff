//  Copyright 2024 coho contributors
//
//  Licensed under the Apache License, Version 2.0 (the "License");
//  you may not use this file except in compliance with the License.
//  You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.

//! `LocalCache` (spec C5): a bounded, evicting, TTL'd map with
//! loader/store integration.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use coho_collections::{CacheEvent, ListenerFlags, ListenerWeight, MapListener, MapListenerSupport, SafeHashMap};
use coho_common::code::{Key, Value};
use coho_common::config::LocalCacheConfig;
use coho_common::context::Units;
use coho_common::error::Result;
use coho_common::filter::Filter;
use coho_common::metrics::Metrics;
use coho_common::time::{Clock, SystemClock};
use parking_lot::Mutex;

use crate::entry::Entry;
use crate::eviction::{self, Candidate, EvictionPolicy};
use crate::loader::{CacheLoader, CacheStore};

pub struct LocalCache<K: Key, V: Value> {
    map: SafeHashMap<K, Entry<V>>,
    listeners: MapListenerSupport<K, V>,
    total_units: AtomicUsize,
    config: LocalCacheConfig,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
    eviction: Box<dyn EvictionPolicy>,
    eviction_lock: Mutex<()>,
    loader: Option<Arc<dyn CacheLoader<K, V>>>,
    store: Option<Arc<dyn CacheStore<K, V>>>,
}

impl<K: Key, V: Value> LocalCache<K, V> {
    pub fn new(config: LocalCacheConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_clock(config, Arc::new(SystemClock::default())))
    }

    pub fn with_clock(config: LocalCacheConfig, clock: Arc<dyn Clock>) -> Self {
        let eviction = eviction::policy_for(config.eviction_policy);
        Self {
            map: SafeHashMap::from_config(&config),
            listeners: MapListenerSupport::new(),
            total_units: AtomicUsize::new(0),
            config,
            clock,
            metrics: Metrics::default(),
            eviction,
            eviction_lock: Mutex::new(()),
            loader: None,
            store: None,
        }
    }

    pub fn with_loader(mut self, loader: Arc<dyn CacheLoader<K, V>>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn CacheStore<K, V>>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn config(&self) -> &LocalCacheConfig {
        &self.config
    }

    pub fn listeners(&self) -> &MapListenerSupport<K, V> {
        &self.listeners
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn units(&self) -> Units {
        Units(self.total_units.load(Ordering::Acquire))
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.peek(key).is_some()
    }

    fn default_expiry_millis(&self) -> Option<u64> {
        self.config.default_expiry.map(|d| d.as_millis() as u64)
    }

    /// Looks at the current value without touching access bookkeeping or
    /// triggering expiry/load -- used internally and by query/invoke paths
    /// that already hold the key lock.
    fn peek(&self, key: &K) -> Option<V> {
        self.map.get(key).map(|e| e.value)
    }

    /// Read path (spec §4.5 + the read half of §4.6.2's front lookup):
    /// returns the cached value if present and unexpired, evicting it with
    /// an `expired` event if it has lapsed, and otherwise falling through to
    /// the configured loader.
    pub fn get(&self, key: &K) -> Result<Option<V>> {
        let now = self.clock.now_millis();
        if let Some(entry) = self.map.get(key) {
            if entry.is_expired(now, self.default_expiry_millis()) {
                self.expire(key);
            } else {
                let mut touched = entry;
                touched.touch(now);
                let value = touched.value.clone();
                self.map.insert(key.clone(), touched);
                self.metrics.hit.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(value));
            }
        }
        self.metrics.miss.fetch_add(1, Ordering::Relaxed);
        self.load_on_miss(key)
    }

    fn load_on_miss(&self, key: &K) -> Result<Option<V>> {
        let Some(loader) = self.loader.clone() else { return Ok(None) };
        match loader.load(key)? {
            Some(value) => {
                self.insert_entry(key.clone(), value.clone(), 0, true);
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Write path: write-through to the store (if any), then cache.
    /// `expiry_millis` follows `Entry`'s overload (`0` = cache default, `<0`
    /// = never).
    pub fn put(&self, key: K, value: V, expiry_millis: i64) -> Result<Option<V>> {
        if let Some(store) = &self.store {
            store.store(&key, &value)?;
        }
        let old = self.insert_entry(key, value, expiry_millis, false);
        Ok(old)
    }

    fn insert_entry(&self, key: K, value: V, expiry_millis: i64, synthetic: bool) -> Option<V> {
        let now = self.clock.now_millis();
        let units = Units(1);
        let entry = Entry::new(value.clone(), now, units, expiry_millis);
        let old = self.map.insert(key.clone(), entry);
        match &old {
            Some(previous) => {
                self.metrics.replace.fetch_add(1, Ordering::Relaxed);
                let event = if synthetic {
                    CacheEvent::updated(key, previous.value.clone(), value).synthetic()
                } else {
                    CacheEvent::updated(key, previous.value.clone(), value)
                };
                let _ = self.listeners.fire(&event, false);
            }
            None => {
                self.total_units.fetch_add(units.0, Ordering::AcqRel);
                self.metrics.insert.fetch_add(1, Ordering::Relaxed);
                let event = if synthetic { CacheEvent::inserted(key, value).synthetic() } else { CacheEvent::inserted(key, value) };
                let _ = self.listeners.fire(&event, false);
            }
        }
        self.run_eviction();
        old.map(|e| e.value)
    }

    pub fn remove(&self, key: &K) -> Result<Option<V>> {
        if let Some(store) = &self.store {
            store.erase(key)?;
        }
        Ok(self.remove_internal(key, false, false))
    }

    fn remove_internal(&self, key: &K, synthetic: bool, expired: bool) -> Option<V> {
        let removed = self.map.remove(key);
        if let Some(entry) = &removed {
            self.total_units.fetch_sub(entry.units.0, Ordering::AcqRel);
            self.metrics.remove.fetch_add(1, Ordering::Relaxed);
            let mut event = CacheEvent::deleted(key.clone(), entry.value.clone());
            if synthetic {
                event = event.synthetic();
            }
            if expired {
                event = event.expired();
            }
            let _ = self.listeners.fire(&event, false);
        }
        removed.map(|e| e.value)
    }

    fn expire(&self, key: &K) {
        self.metrics.expire.fetch_add(1, Ordering::Relaxed);
        self.remove_internal(key, true, true);
    }

    pub fn clear(&self) {
        let keys: Vec<K> = self.map.iter_snapshot().map(|(k, _)| k).collect();
        for key in keys {
            self.remove_internal(&key, false, false);
        }
    }

    pub fn add_filter_listener(
        &self,
        filter: Arc<dyn Filter<CacheEvent<K, V>>>,
        listener: Arc<dyn MapListener<K, V>>,
        weight: ListenerWeight,
        flags: ListenerFlags,
    ) -> coho_collections::FilterId {
        self.listeners.add_filter_listener(filter, listener, weight, flags)
    }

    pub fn add_key_listener(
        &self,
        key: K,
        listener: Arc<dyn MapListener<K, V>>,
        weight: ListenerWeight,
        flags: ListenerFlags,
    ) -> coho_collections::ListenerId {
        let current = self.peek(&key);
        self.listeners.add_key_listener(key, listener, weight, flags, current)
    }

    pub(crate) fn snapshot_pairs(&self) -> Vec<(K, V)> {
        self.map.iter_snapshot().map(|(k, e)| (k, e.value)).collect()
    }

    /// Prunes entries down to `low_units` when `high_units` has been
    /// exceeded (spec §4.5, Testable Properties 2 and 9). Serialized by
    /// `eviction_lock` so only one thread runs a prune pass at a time.
    fn run_eviction(&self) {
        if self.config.high_units == 0 {
            return;
        }
        let _guard = self.eviction_lock.lock();
        let low_units = self.config.effective_low_units();
        if self.total_units.load(Ordering::Acquire) <= self.config.high_units {
            return;
        }
        while self.total_units.load(Ordering::Acquire) > low_units {
            let now = self.clock.now_millis();
            let snapshot: Vec<(K, Candidate)> = self
                .map
                .iter_snapshot()
                .map(|(k, e)| (k, Candidate { touch_count: e.touch_count, last_touch: e.last_touch, age: now.saturating_sub(e.last_touch) }))
                .collect();
            if snapshot.is_empty() {
                break;
            }
            let candidates: Vec<Candidate> = snapshot.iter().map(|(_, c)| *c).collect();
            let Some(victim_index) = self.eviction.select_victim(&candidates) else { break };
            let (victim_key, _) = &snapshot[victim_index];
            self.metrics.evict.fetch_add(1, Ordering::Relaxed);
            self.remove_internal(victim_key, true, false);
            if self.total_units.load(Ordering::Acquire) <= low_units {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use coho_common::time::FakeClock;

    use super::*;

    #[derive(Debug, Default)]
    struct Recorder {
        events: StdMutex<Vec<CacheEvent<i32, i32>>>,
    }

    impl MapListener<i32, i32> for Recorder {
        fn notify(&self, event: &CacheEvent<i32, i32>) -> Result<()> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    #[test]
    fn put_get_roundtrip() {
        let cache: LocalCache<i32, i32> = LocalCache::new(LocalCacheConfig::default()).unwrap();
        cache.put(1, 100, 0).unwrap();
        assert_eq!(cache.get(&1).unwrap(), Some(100));
        assert_eq!(cache.metrics().hit.load(Ordering::Relaxed), 1);
    }

    /// Scenario S2 from spec §8: LRU eviction at `highUnits=3, lowUnits=2`.
    #[test]
    fn lru_eviction_matches_scenario_s2() {
        let mut config = LocalCacheConfig { high_units: 3, low_units: 2, ..Default::default() };
        config.eviction_policy = coho_common::config::EvictionPolicy::Lru;
        let clock = Arc::new(FakeClock::new(0));
        let cache: LocalCache<i32, i32> = LocalCache::with_clock(config, clock.clone());
        let recorder = Arc::new(Recorder::default());
        cache.add_filter_listener(Arc::new(coho_common::filter::AlwaysFilter), recorder.clone(), ListenerWeight::Standard, ListenerFlags::default());

        cache.put(1, 1, 0).unwrap();
        clock.advance(10);
        cache.put(2, 2, 0).unwrap();
        clock.advance(10);
        cache.put(3, 3, 0).unwrap();
        clock.advance(10);

        // touch key 1 so key 2 becomes the oldest lastTouch.
        cache.get(&1).unwrap();
        clock.advance(10);
        cache.put(4, 4, 0).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains_key(&2));
        assert!(cache.contains_key(&1));
        assert!(cache.contains_key(&4));

        let events = recorder.events.lock().unwrap();
        let evicted = events.iter().filter(|e| e.synthetic && e.id == coho_collections::EventId::Deleted).count();
        assert_eq!(evicted, 1);
    }

    /// Scenario S3 from spec §8: TTL expiry.
    #[test]
    fn ttl_expiry_fires_expired_event() {
        let clock = Arc::new(FakeClock::new(0));
        let cache: LocalCache<i32, i32> = LocalCache::with_clock(LocalCacheConfig::default(), clock.clone());
        let recorder = Arc::new(Recorder::default());
        cache.add_filter_listener(Arc::new(coho_common::filter::AlwaysFilter), recorder.clone(), ListenerWeight::Standard, ListenerFlags::default());

        cache.put(1, 1, 50).unwrap();
        clock.advance(100);
        assert_eq!(cache.get(&1).unwrap(), None);

        let events = recorder.events.lock().unwrap();
        assert!(events.iter().any(|e| e.expired && e.synthetic));
    }

    #[test]
    fn units_tracked_across_insert_and_remove() {
        let cache: LocalCache<i32, i32> = LocalCache::new(LocalCacheConfig::default()).unwrap();
        cache.put(1, 1, 0).unwrap();
        cache.put(2, 2, 0).unwrap();
        assert_eq!(cache.units(), Units(2));
        cache.remove(&1).unwrap();
        assert_eq!(cache.units(), Units(1));
    }

    struct StaticLoader;
    impl CacheLoader<i32, i32> for StaticLoader {
        fn load(&self, key: &i32) -> Result<Option<i32>> {
            Ok(Some(key * 100))
        }
    }

    #[test]
    fn loader_populates_on_miss_with_synthetic_event() {
        let cache: LocalCache<i32, i32> = LocalCache::new(LocalCacheConfig::default()).unwrap().with_loader(Arc::new(StaticLoader));
        let recorder = Arc::new(Recorder::default());
        cache.add_filter_listener(Arc::new(coho_common::filter::AlwaysFilter), recorder.clone(), ListenerWeight::Standard, ListenerFlags::default());

        assert_eq!(cache.get(&3).unwrap(), Some(300));
        let events = recorder.events.lock().unwrap();
        assert!(events[0].synthetic);
    }
}
