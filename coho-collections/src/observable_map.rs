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

//! `ObservableHashMap` (spec C3): a `SafeHashMap` that fires `CacheEvent`s
//! through an internally owned `MapListenerSupport` on every mutation.

use coho_common::code::{Key, Value};
use coho_common::config::LocalCacheConfig;

use crate::event::CacheEvent;
use crate::listener::{ListenerFlags, ListenerWeight, MapListener, MapListenerSupport};
use crate::safe_map::{SafeHashMap, SafeMapIter};
use std::sync::Arc;

pub struct ObservableHashMap<K, V> {
    map: SafeHashMap<K, V>,
    listeners: MapListenerSupport<K, V>,
}

impl<K: Key, V: Value> Default for ObservableHashMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Key, V: Value> ObservableHashMap<K, V> {
    pub fn new() -> Self {
        Self { map: SafeHashMap::default(), listeners: MapListenerSupport::new() }
    }

    pub fn from_config(config: &LocalCacheConfig) -> Self {
        Self { map: SafeHashMap::from_config(config), listeners: MapListenerSupport::new() }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.map.get(key)
    }

    pub fn listeners(&self) -> &MapListenerSupport<K, V> {
        &self.listeners
    }

    pub fn iter_snapshot(&self) -> SafeMapIter<'_, K, V> {
        self.map.iter_snapshot()
    }

    /// Inserts `value` under `key`, firing an `Inserted` or `Updated` event
    /// depending on whether a prior value existed. Listener errors are
    /// logged, never propagated: the mutation has already committed by the
    /// time listeners run, so there is nothing left to roll back.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        let old = self.map.insert(key.clone(), value.clone());
        let event = match old.clone() {
            Some(old_value) => CacheEvent::updated(key, old_value, value),
            None => CacheEvent::inserted(key, value),
        };
        let _ = self.listeners.fire(&event, false);
        old
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let old = self.map.remove(key);
        if let Some(old_value) = old.clone() {
            let event = CacheEvent::deleted(key.clone(), old_value);
            let _ = self.listeners.fire(&event, false);
        }
        old
    }

    /// Removes every entry, firing one `Deleted` event per entry.
    pub fn clear(&self) {
        let snapshot = self.map.iter_snapshot();
        let keys: Vec<K> = snapshot.map(|(k, _)| k).collect();
        for key in keys {
            self.remove(&key);
        }
    }

    /// Removes every entry without firing any events -- the documented
    /// asymmetry with `clear` (spec §4.3, Open Question in §9 about its
    /// interaction with the `logical` invalidation strategy).
    pub fn truncate(&self) {
        self.map.clear();
    }

    pub fn add_filter_listener(
        &self,
        filter: Arc<dyn coho_common::filter::Filter<CacheEvent<K, V>>>,
        listener: Arc<dyn MapListener<K, V>>,
        weight: ListenerWeight,
        flags: ListenerFlags,
    ) -> crate::listener::FilterId {
        self.listeners.add_filter_listener(filter, listener, weight, flags)
    }

    pub fn add_key_listener(
        &self,
        key: K,
        listener: Arc<dyn MapListener<K, V>>,
        weight: ListenerWeight,
        flags: ListenerFlags,
    ) -> crate::listener::ListenerId {
        let current = self.map.get(&key);
        self.listeners.add_key_listener(key, listener, weight, flags, current)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use coho_common::error::Result;

    use super::*;

    #[derive(Debug, Default)]
    struct Recorder {
        events: StdMutex<Vec<CacheEvent<String, i32>>>,
    }

    impl MapListener<String, i32> for Recorder {
        fn notify(&self, event: &CacheEvent<String, i32>) -> Result<()> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    #[test]
    fn insert_fires_inserted_then_updated() {
        let map = ObservableHashMap::<String, i32>::new();
        let recorder = Arc::new(Recorder::default());
        map.add_filter_listener(
            Arc::new(coho_common::filter::AlwaysFilter),
            recorder.clone(),
            ListenerWeight::Standard,
            ListenerFlags::default(),
        );

        map.insert("a".into(), 1);
        map.insert("a".into(), 2);

        let events = recorder.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].new_value, Some(1));
        assert!(events[0].old_value.is_none());
        assert_eq!(events[1].old_value, Some(1));
        assert_eq!(events[1].new_value, Some(2));
    }

    #[test]
    fn truncate_suppresses_events_clear_does_not() {
        let map = ObservableHashMap::<String, i32>::new();
        let recorder = Arc::new(Recorder::default());
        map.add_filter_listener(
            Arc::new(coho_common::filter::AlwaysFilter),
            recorder.clone(),
            ListenerWeight::Standard,
            ListenerFlags::default(),
        );
        map.insert("a".into(), 1);
        recorder.events.lock().unwrap().clear();

        map.truncate();
        assert!(recorder.events.lock().unwrap().is_empty());
        assert!(map.is_empty());

        map.insert("b".into(), 2);
        recorder.events.lock().unwrap().clear();
        map.clear();
        assert_eq!(recorder.events.lock().unwrap().len(), 1);
    }

    #[test]
    fn key_listener_priming_reflects_current_value() {
        let map = ObservableHashMap::<String, i32>::new();
        map.insert("a".into(), 42);
        let recorder = Arc::new(Recorder::default());
        map.add_key_listener(
            "a".into(),
            recorder.clone(),
            ListenerWeight::Standard,
            ListenerFlags { priming: true, ..Default::default() },
        );

        let events = recorder.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].priming);
        assert_eq!(events[0].new_value, Some(42));
    }
}
