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

//! `CachingMap` (spec C6): the two-tier composition of a cheap, incomplete
//! front (`coho_memory::LocalCache`) over an authoritative, expensive back
//! (`NamedCache`), kept coherent per the configured
//! [`InvalidationStrategy`](coho_common::config::InvalidationStrategy).
//!
//! Grounded in `original_source/include/public/coherence/net/cache/CachingMap.hpp`:
//! `f_hMapControl` becomes [`crate::control::ControlMap`], the listener that
//! routes back events into it or directly invalidates the front is
//! `InvalidationListener` below, and the `NamedCacheDeactivationListener`
//! that reacts to `destroy`/`truncate` is `DeactivationListener`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use coho_collections::{CacheEvent, FilterId, ListenerFlags, ListenerId, ListenerWeight, MapListener};
use coho_common::code::{Key, Value};
use coho_common::config::{CachingMapConfig, InvalidationStrategy};
use coho_common::error::{Error, Result};
use coho_common::filter::{AlwaysFilter, Filter};
use coho_common::metrics::{Metrics, MetricsSnapshot};
use coho_memory::LocalCache;
use parking_lot::Mutex;

use crate::backend::{CacheMap, NamedCache};
use crate::control::ControlMap;

/// The strategy actually in force, as distinct from the configured one:
/// `auto` starts here as `Present` and is promoted to `All` once the number
/// of distinct per-key listeners crosses
/// [`CachingMapConfig::auto_promote_threshold`]; it never demotes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuntimeStrategy {
    None,
    Present,
    All,
    Logical,
}

struct Inner<K: Key, V: Value> {
    front: Arc<LocalCache<K, V>>,
    back: Arc<dyn NamedCache<K, V>>,
    control: ControlMap<K, V>,
    config: CachingMapConfig,
    promotable: bool,
    strategy: Mutex<RuntimeStrategy>,
    back_filter_listener: Mutex<Option<FilterId>>,
    back_key_listeners: Mutex<HashMap<K, ListenerId>>,
    released: AtomicBool,
    global_lock: Mutex<()>,
    metrics: Metrics,
}

/// Filters out events the back reports as synthetic, i.e. caused by the
/// back's own housekeeping (expiry, eviction) rather than a client write.
/// Backs this crate's `logical` invalidation strategy.
#[derive(Debug, Clone, Copy, Default)]
struct NonSyntheticFilter;

impl<K: Key, V: Value> Filter<CacheEvent<K, V>> for NonSyntheticFilter {
    fn evaluate(&self, event: &CacheEvent<K, V>) -> bool {
        !event.synthetic
    }
}

/// Routes back events either into the control map (when the key is locked
/// by an in-flight `get`/`put` on this `CachingMap`) or straight into a
/// front invalidation (spec §4.6.3/§4.6.4's "events-prove-freshness" rule).
#[derive(Debug)]
struct InvalidationListener<K: Key, V: Value> {
    inner: Weak<Inner<K, V>>,
    logical: bool,
}

impl<K: Key, V: Value> MapListener<K, V> for InvalidationListener<K, V> {
    fn notify(&self, event: &CacheEvent<K, V>) -> Result<()> {
        if self.logical && event.synthetic {
            return Ok(());
        }
        let Some(inner) = self.inner.upgrade() else { return Ok(()) };
        if inner.control.record_event(&event.key, event.clone()) {
            return Ok(());
        }
        if inner.front.contains_key(&event.key) {
            inner.front.remove(&event.key)?;
            inner.metrics.invalidation_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            inner.metrics.invalidation_misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}

/// Watches the front for synthetic removals (eviction, expiry) so the
/// matching per-key back listener (`present`/`auto`) doesn't outlive the
/// entry it was registered for.
#[derive(Debug)]
struct FrontMapListener<K: Key, V: Value> {
    inner: Weak<Inner<K, V>>,
}

impl<K: Key, V: Value> MapListener<K, V> for FrontMapListener<K, V> {
    fn entry_deleted(&self, event: &CacheEvent<K, V>) -> Result<()> {
        if event.synthetic {
            if let Some(inner) = self.inner.upgrade() {
                CachingMap(inner).unregister_key_listener(&event.key);
            }
        }
        Ok(())
    }
}

/// Reacts to the back being destroyed or truncated server-side (spec §6).
#[derive(Debug)]
struct DeactivationListener<K: Key, V: Value> {
    inner: Weak<Inner<K, V>>,
}

impl<K: Key, V: Value> MapListener<K, V> for DeactivationListener<K, V> {
    fn entry_deleted(&self, _event: &CacheEvent<K, V>) -> Result<()> {
        if let Some(inner) = self.inner.upgrade() {
            CachingMap(inner).release()?;
        }
        Ok(())
    }

    fn entry_updated(&self, _event: &CacheEvent<K, V>) -> Result<()> {
        if let Some(inner) = self.inner.upgrade() {
            inner.front.clear();
        }
        Ok(())
    }
}

/// True when `events`, captured while a key was locked, are consistent with
/// `value` being the value an independent read of the back would return
/// right now -- i.e. the last captured event (if any) settled on the same
/// value. An empty capture list means nothing raced the read/write, so the
/// value is trivially fresh.
fn events_prove_fresh<K, V: PartialEq>(events: &[CacheEvent<K, V>], value: &Option<V>) -> bool {
    match events.last() {
        None => true,
        Some(event) => event.new_value.as_ref() == value.as_ref(),
    }
}

/// The coherent two-tier cache (spec C6). Cheap to clone: internally an
/// `Arc`, so every clone shares the same front, back, control map and
/// listener registrations.
pub struct CachingMap<K: Key, V: Value>(Arc<Inner<K, V>>);

impl<K: Key, V: Value> Clone for CachingMap<K, V> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<K: Key, V: Value> CachingMap<K, V> {
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn new(front: Arc<LocalCache<K, V>>, back: Arc<dyn NamedCache<K, V>>, config: CachingMapConfig) -> Result<Self> {
        config.validate()?;
        let promotable = config.invalidation_strategy == InvalidationStrategy::Auto;
        let initial = match config.invalidation_strategy {
            InvalidationStrategy::None => RuntimeStrategy::None,
            InvalidationStrategy::Present | InvalidationStrategy::Auto => RuntimeStrategy::Present,
            InvalidationStrategy::All => RuntimeStrategy::All,
            InvalidationStrategy::Logical => RuntimeStrategy::Logical,
        };

        let inner = Arc::new(Inner {
            front,
            back,
            control: ControlMap::new(),
            config,
            promotable,
            strategy: Mutex::new(initial),
            back_filter_listener: Mutex::new(None),
            back_key_listeners: Mutex::new(HashMap::new()),
            released: AtomicBool::new(false),
            global_lock: Mutex::new(()),
            metrics: Metrics::default(),
        });
        let map = Self(inner);

        match initial {
            RuntimeStrategy::All => map.register_filter_listener(Arc::new(AlwaysFilter)),
            RuntimeStrategy::Logical => map.register_filter_listener(Arc::new(NonSyntheticFilter)),
            RuntimeStrategy::None | RuntimeStrategy::Present => {}
        }
        if !matches!(initial, RuntimeStrategy::None) {
            map.register_front_listener();
        }
        map.register_deactivation_listener();
        Ok(map)
    }

    fn register_filter_listener(&self, filter: Arc<dyn Filter<CacheEvent<K, V>>>) {
        let logical = matches!(*self.0.strategy.lock(), RuntimeStrategy::Logical);
        let listener = Arc::new(InvalidationListener { inner: Arc::downgrade(&self.0), logical });
        let id = self.0.back.add_filter_listener(filter, listener, false);
        *self.0.back_filter_listener.lock() = Some(id);
    }

    fn register_front_listener(&self) {
        let listener = Arc::new(FrontMapListener { inner: Arc::downgrade(&self.0) });
        self.0.front.add_filter_listener(Arc::new(AlwaysFilter), listener, ListenerWeight::Lite, ListenerFlags::default());
    }

    fn register_deactivation_listener(&self) {
        let listener = Arc::new(DeactivationListener { inner: Arc::downgrade(&self.0) });
        self.0.back.add_deactivation_listener(listener);
    }

    fn ensure_active(&self) -> Result<()> {
        if self.0.released.load(Ordering::Acquire) {
            return Err(Error::illegal_state("CachingMap has been released"));
        }
        Ok(())
    }

    /// Lazily registers a per-key back listener the first time a key is
    /// touched under the `present` strategy (or `auto` before promotion),
    /// promoting to `all` once the registration count crosses the
    /// configured threshold.
    fn ensure_key_listener(&self, key: &K) {
        if !matches!(*self.0.strategy.lock(), RuntimeStrategy::Present) {
            return;
        }
        let mut listeners = self.0.back_key_listeners.lock();
        if listeners.contains_key(key) {
            return;
        }
        let listener = Arc::new(InvalidationListener { inner: Arc::downgrade(&self.0), logical: false });
        let id = self.0.back.add_key_listener(key.clone(), listener, false, false);
        listeners.insert(key.clone(), id);
        let should_promote = self.0.promotable && listeners.len() > self.0.config.auto_promote_threshold;
        drop(listeners);
        if should_promote {
            self.promote_to_all();
        }
    }

    fn unregister_key_listener(&self, key: &K) {
        let mut listeners = self.0.back_key_listeners.lock();
        if let Some(id) = listeners.remove(key) {
            drop(listeners);
            self.0.back.remove_key_listener(key, id);
        }
    }

    fn promote_to_all(&self) {
        {
            let mut strategy = self.0.strategy.lock();
            if !matches!(*strategy, RuntimeStrategy::Present) {
                return;
            }
            *strategy = RuntimeStrategy::All;
        }
        self.register_filter_listener(Arc::new(AlwaysFilter));
        let mut listeners = self.0.back_key_listeners.lock();
        for (key, id) in listeners.drain() {
            self.0.back.remove_key_listener(&key, id);
        }
        tracing::debug!("invalidation strategy promoted from present to all");
    }

    /// Read path (spec §4.6.2): a front hit returns immediately. On a miss,
    /// the key is locked for the duration of the back read so any
    /// concurrent invalidation event is captured rather than lost, then
    /// `events_prove_fresh` decides whether the fetched value is still
    /// safe to cache.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn get(&self, key: &K) -> Result<Option<V>> {
        self.ensure_active()?;
        if let Some(value) = self.0.front.get(key)? {
            return Ok(Some(value));
        }
        self.0.control.lock(key, self.0.config.control_wait)?;
        let result = (|| -> Result<Option<V>> {
            self.ensure_key_listener(key);
            let value = self.0.back.get(key)?;
            let events = self.0.control.take_events(key);
            if events_prove_fresh(&events, &value) {
                if let Some(v) = &value {
                    self.0.front.put_with_expiry(key.clone(), v.clone(), None)?;
                }
            }
            Ok(value)
        })();
        self.0.control.unlock(key)?;
        result
    }

    pub fn get_all(&self, keys: &[K]) -> Result<HashMap<K, V>> {
        self.ensure_active()?;
        let mut out = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.get(key)? {
                out.insert(key.clone(), value);
            }
        }
        Ok(out)
    }

    /// Write path (spec §4.6.2): write-through to the back first, then
    /// reflect the written value in the front. Held under the same per-key
    /// control lock as `get` so a concurrent invalidation event arriving
    /// mid-write is captured rather than racing the front update.
    #[tracing::instrument(level = "trace", skip(self, value))]
    pub fn put(&self, key: K, value: V, expiry: Option<Duration>) -> Result<Option<V>> {
        self.ensure_active()?;
        self.0.control.lock(&key, self.0.config.control_wait)?;
        let result = (|| -> Result<Option<V>> {
            self.ensure_key_listener(&key);
            let old = self.0.back.put_with_expiry(key.clone(), value.clone(), expiry)?;
            let events = self.0.control.take_events(&key);
            if events_prove_fresh(&events, &Some(value.clone())) {
                self.0.front.put_with_expiry(key.clone(), value, expiry)?;
            } else {
                self.0.front.remove(&key)?;
            }
            Ok(old)
        })();
        self.0.control.unlock(&key)?;
        result
    }

    pub fn put_all(&self, entries: Vec<(K, V)>) -> Result<()> {
        self.ensure_active()?;
        for (key, value) in entries {
            self.put(key, value, None)?;
        }
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip(self))]
    pub fn remove(&self, key: &K) -> Result<Option<V>> {
        self.ensure_active()?;
        self.0.control.lock(key, self.0.config.control_wait)?;
        let result = (|| -> Result<Option<V>> {
            let old = self.0.back.remove(key)?;
            let _ = self.0.control.take_events(key);
            self.0.front.remove(key)?;
            Ok(old)
        })();
        self.0.control.unlock(key)?;
        self.unregister_key_listener(key);
        result
    }

    pub fn clear(&self) -> Result<()> {
        self.ensure_active()?;
        let _guard = self.0.global_lock.lock();
        self.0.back.clear()?;
        self.0.front.clear();
        let mut listeners = self.0.back_key_listeners.lock();
        for (key, id) in listeners.drain() {
            self.0.back.remove_key_listener(&key, id);
        }
        Ok(())
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.0.front.contains_key(key) || self.0.back.contains_key(key)
    }

    pub fn size(&self) -> usize {
        self.0.back.size()
    }

    pub fn stats(&self) -> MetricsSnapshot {
        self.0.metrics.snapshot()
    }

    pub fn is_released(&self) -> bool {
        self.0.released.load(Ordering::Acquire)
    }

    /// Unregisters every back listener this `CachingMap` installed and
    /// clears the front, without tearing down the back itself. Idempotent.
    pub fn release(&self) -> Result<()> {
        if self.0.released.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(id) = self.0.back_filter_listener.lock().take() {
            self.0.back.remove_filter_listener(id);
        }
        let mut listeners = self.0.back_key_listeners.lock();
        for (key, id) in listeners.drain() {
            self.0.back.remove_key_listener(&key, id);
        }
        drop(listeners);
        self.0.back.remove_deactivation_listener();
        self.0.front.clear();
        Ok(())
    }

    /// `release`, followed by destroying the back map itself.
    pub fn destroy(&self) -> Result<()> {
        self.release()?;
        self.0.back.destroy()
    }

    /// Holds this map's control lock for `key`, signals `ready`, then sleeps
    /// for `hold` before releasing it. Exists only so integration tests
    /// outside this crate can exercise `control_wait` timeout behavior
    /// without reaching into `Inner`'s private fields.
    #[cfg(any(test, feature = "test-util"))]
    pub fn hold_control_lock_for_test(&self, key: &K, ready: Arc<std::sync::Barrier>, hold: Duration) {
        self.0.control.lock(key, None).expect("uncontended lock");
        ready.wait();
        std::thread::sleep(hold);
        self.0.control.unlock(key).expect("still held by this thread");
    }
}

impl<K: Key, V: Value> CacheMap<K, V> for CachingMap<K, V> {
    fn size(&self) -> usize {
        self.size()
    }

    fn contains_key(&self, key: &K) -> bool {
        self.contains_key(key)
    }

    fn get(&self, key: &K) -> Result<Option<V>> {
        self.get(key)
    }

    fn put_with_expiry(&self, key: K, value: V, expiry: Option<Duration>) -> Result<Option<V>> {
        self.put(key, value, expiry)
    }

    fn remove(&self, key: &K) -> Result<Option<V>> {
        self.remove(key)
    }

    fn clear(&self) -> Result<()> {
        self.clear()
    }

    fn entry_set(&self) -> Result<Vec<(K, V)>> {
        self.0.back.entry_set()
    }
}

#[cfg(test)]
mod tests {
    use coho_common::config::LocalCacheConfig;

    use super::*;
    use crate::testing::InProcessNamedCache;

    fn front() -> Arc<LocalCache<i32, i32>> {
        Arc::new(LocalCache::new(LocalCacheConfig::default()).unwrap())
    }

    fn back() -> Arc<InProcessNamedCache<i32, i32>> {
        Arc::new(InProcessNamedCache::new())
    }

    #[test]
    fn present_strategy_caches_on_get_and_invalidates_on_external_write() {
        let b = back();
        b.seed(1, 100);
        let config = CachingMapConfig { invalidation_strategy: InvalidationStrategy::Present, ..Default::default() };
        let map = CachingMap::new(front(), b.clone(), config).unwrap();

        assert_eq!(map.get(&1).unwrap(), Some(100));
        assert!(map.0.front.contains_key(&1));

        // a write that bypasses CachingMap entirely (simulating another client)
        b.seed(1, 200);
        assert!(!map.0.front.contains_key(&1));
        assert_eq!(map.get(&1).unwrap(), Some(200));
    }

    #[test]
    fn all_strategy_registers_single_filter_listener_eagerly() {
        let config = CachingMapConfig { invalidation_strategy: InvalidationStrategy::All, ..Default::default() };
        let map = CachingMap::new(front(), back(), config).unwrap();
        assert!(map.0.back_filter_listener.lock().is_some());
    }

    #[test]
    fn auto_promotes_to_all_after_threshold() {
        let config = CachingMapConfig { invalidation_strategy: InvalidationStrategy::Auto, auto_promote_threshold: 2, ..Default::default() };
        let map = CachingMap::new(front(), back(), config).unwrap();

        for key in 0..4 {
            map.put(key, key, None).unwrap();
        }
        assert!(map.0.back_filter_listener.lock().is_some());
        assert!(map.0.back_key_listeners.lock().is_empty());
    }

    #[test]
    fn logical_strategy_ignores_synthetic_events() {
        let b = back();
        let config = CachingMapConfig { invalidation_strategy: InvalidationStrategy::Logical, ..Default::default() };
        let map = CachingMap::new(front(), b.clone(), config).unwrap();

        map.put(1, 1, None).unwrap();
        assert!(map.0.front.contains_key(&1));

        b.fire_synthetic_update(1, 1, 2);
        assert!(map.0.front.contains_key(&1), "synthetic events must not invalidate under `logical`");
    }

    #[test]
    fn clear_wipes_both_tiers_and_listeners() {
        let b = back();
        let config = CachingMapConfig { invalidation_strategy: InvalidationStrategy::Present, ..Default::default() };
        let map = CachingMap::new(front(), b, config).unwrap();
        map.put(1, 1, None).unwrap();
        map.put(2, 2, None).unwrap();

        map.clear().unwrap();
        assert_eq!(map.size(), 0);
        assert!(!map.0.front.contains_key(&1));
        assert!(map.0.back_key_listeners.lock().is_empty());
    }

    #[test]
    fn release_is_idempotent_and_blocks_further_use() {
        let map = CachingMap::new(front(), back(), CachingMapConfig::default()).unwrap();
        map.put(1, 1, None).unwrap();
        map.release().unwrap();
        map.release().unwrap();
        assert!(map.get(&1).is_err());
    }

    #[test]
    fn destroy_propagates_to_back() {
        let b = back();
        let map = CachingMap::new(front(), b.clone(), CachingMapConfig::default()).unwrap();
        map.destroy().unwrap();
        assert!(!b.is_active());
    }

    #[test]
    fn events_prove_fresh_handles_empty_and_stale_captures() {
        let empty: Vec<CacheEvent<i32, i32>> = Vec::new();
        assert!(events_prove_fresh(&empty, &Some(5)));

        let stale = vec![CacheEvent::updated(1, 5, 6)];
        assert!(!events_prove_fresh(&stale, &Some(5)));
        assert!(events_prove_fresh(&stale, &Some(6)));
    }
}
