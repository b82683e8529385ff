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

//! A minimal in-process [`NamedCache`], for exercising `CachingMap` without
//! a real distributed-cache client. Grounded in the fixture style of
//! `original_source/tests/LocalNamedCacheTest.hpp`, which backs its own
//! `CachingMap` tests with a plain in-memory map rather than a real remote
//! service.
//!
//! Exposed behind the `test-util` feature so it is available to this
//! crate's own `tests/` directory (and to integrators who want to exercise
//! `CachingMap` in-process); also available unconditionally under `#[cfg(test)]`
//! for this crate's own unit tests.
//!
//! Requires `K: Default, V: Default` so `destroy`/`truncate` can hand the
//! deactivation listener a sentinel event -- a constraint specific to this
//! test fixture, not to the `NamedCache` trait itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use coho_collections::{CacheEvent, FilterId, ListenerFlags, ListenerId, ListenerWeight, MapListener, ObservableHashMap};
use coho_common::code::{Key, Value};
use coho_common::error::Result;
use coho_common::filter::Filter;
use parking_lot::Mutex;

use crate::backend::{CacheMap, NamedCache, ObservableMap};

pub struct InProcessNamedCache<K: Key + Default, V: Value + Default> {
    map: ObservableHashMap<K, V>,
    active: AtomicBool,
    deactivation: Mutex<Option<Arc<dyn MapListener<K, V>>>>,
}

impl<K: Key + Default, V: Value + Default> Default for InProcessNamedCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Key + Default, V: Value + Default> InProcessNamedCache<K, V> {
    pub fn new() -> Self {
        Self { map: ObservableHashMap::new(), active: AtomicBool::new(true), deactivation: Mutex::new(None) }
    }

    /// Inserts a value as if an independent client wrote it directly to the
    /// back, firing the ordinary insert/update event.
    pub fn seed(&self, key: K, value: V) {
        self.map.insert(key, value);
    }

    /// Fires a synthetic update event without touching the underlying
    /// value, for exercising the `logical` invalidation strategy's
    /// "ignore synthetic events" rule.
    pub fn fire_synthetic_update(&self, key: K, old: V, new: V) {
        let event = CacheEvent::updated(key, old, new).synthetic();
        let _ = self.map.listeners().fire(&event, false);
    }
}

impl<K: Key + Default, V: Value + Default> CacheMap<K, V> for InProcessNamedCache<K, V> {
    fn size(&self) -> usize {
        self.map.len()
    }

    fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    fn get(&self, key: &K) -> Result<Option<V>> {
        Ok(self.map.get(key))
    }

    fn put_with_expiry(&self, key: K, value: V, _expiry: Option<std::time::Duration>) -> Result<Option<V>> {
        Ok(self.map.insert(key, value))
    }

    fn remove(&self, key: &K) -> Result<Option<V>> {
        Ok(self.map.remove(key))
    }

    fn clear(&self) -> Result<()> {
        self.map.clear();
        Ok(())
    }

    fn entry_set(&self) -> Result<Vec<(K, V)>> {
        Ok(self.map.iter_snapshot().collect())
    }
}

impl<K: Key + Default, V: Value + Default> ObservableMap<K, V> for InProcessNamedCache<K, V> {
    fn add_key_listener(&self, key: K, listener: Arc<dyn MapListener<K, V>>, lite: bool, priming: bool) -> ListenerId {
        let weight = if lite { ListenerWeight::Lite } else { ListenerWeight::Standard };
        let flags = ListenerFlags { priming, ..Default::default() };
        self.map.add_key_listener(key, listener, weight, flags)
    }

    fn remove_key_listener(&self, key: &K, id: ListenerId) {
        self.map.listeners().remove_key_listener(key, id);
    }

    fn add_filter_listener(&self, filter: Arc<dyn Filter<CacheEvent<K, V>>>, listener: Arc<dyn MapListener<K, V>>, lite: bool) -> FilterId {
        let weight = if lite { ListenerWeight::Lite } else { ListenerWeight::Standard };
        self.map.add_filter_listener(filter, listener, weight, ListenerFlags::default())
    }

    fn remove_filter_listener(&self, id: FilterId) {
        self.map.listeners().remove_filter_listener(id);
    }
}

impl<K: Key + Default, V: Value + Default> NamedCache<K, V> for InProcessNamedCache<K, V> {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn add_deactivation_listener(&self, listener: Arc<dyn MapListener<K, V>>) {
        *self.deactivation.lock() = Some(listener);
    }

    fn remove_deactivation_listener(&self) {
        *self.deactivation.lock() = None;
    }

    fn destroy(&self) -> Result<()> {
        self.active.store(false, Ordering::Release);
        if let Some(listener) = self.deactivation.lock().clone() {
            let event = CacheEvent::deleted(K::default(), V::default());
            let _ = listener.entry_deleted(&event);
        }
        Ok(())
    }

    fn truncate(&self) -> Result<()> {
        self.map.truncate();
        if let Some(listener) = self.deactivation.lock().clone() {
            let event = CacheEvent::updated(K::default(), V::default(), V::default());
            let _ = listener.entry_updated(&event);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_then_get_roundtrip() {
        let cache = InProcessNamedCache::<i32, i32>::new();
        cache.seed(1, 100);
        assert_eq!(cache.get(&1).unwrap(), Some(100));
    }

    #[test]
    fn destroy_notifies_deactivation_listener_and_marks_inactive() {
        #[derive(Debug, Default)]
        struct Flag(std::sync::atomic::AtomicBool);
        impl MapListener<i32, i32> for Flag {
            fn entry_deleted(&self, _event: &CacheEvent<i32, i32>) -> Result<()> {
                self.0.store(true, Ordering::Relaxed);
                Ok(())
            }
        }

        let cache = InProcessNamedCache::<i32, i32>::new();
        let flag = Arc::new(Flag::default());
        cache.add_deactivation_listener(flag.clone());
        cache.destroy().unwrap();

        assert!(!cache.is_active());
        assert!(flag.0.load(Ordering::Relaxed));
    }
}
