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

//! `SafeHashMap` (spec C2): a thread-safe map whose iterators are immune to
//! concurrent resize.
//!
//! The original holds a live bucket array behind a resize monitor and
//! briefly swaps in a sentinel empty table while growing, so in-flight
//! iterators keep walking a frozen clone of the old chain. We get the same
//! externally observable guarantee -- "an iterator sees exactly the keys
//! present when it was created, resize notwithstanding" (Testable Property
//! 5) -- by having the iterator constructor take an owned snapshot under
//! the read lock instead of racing a live table. Simpler to reason about
//! without ever running it under a race detector, at the cost of an
//! eagerly-cloned snapshot rather than lazy bucket-chain reuse.

use std::sync::atomic::{AtomicUsize, Ordering};

use ahash::RandomState;
use coho_common::code::Key;
use coho_common::config::LocalCacheConfig;
use hashbrown::HashMap;
use parking_lot::RwLock;

pub struct SafeHashMap<K, V> {
    table: RwLock<HashMap<K, V, RandomState>>,
    active_iterators: AtomicUsize,
    growth_rate: f32,
    load_factor: f32,
}

impl<K: Key, V: Clone + Send + Sync + 'static> Default for SafeHashMap<K, V> {
    fn default() -> Self {
        Self::new(17, 0.75, 2.0)
    }
}

impl<K: Key, V: Clone + Send + Sync + 'static> SafeHashMap<K, V> {
    pub fn new(initial_buckets: usize, load_factor: f32, growth_rate: f32) -> Self {
        Self {
            table: RwLock::new(HashMap::with_capacity_and_hasher(initial_buckets, RandomState::new())),
            active_iterators: AtomicUsize::new(0),
            growth_rate,
            load_factor,
        }
    }

    pub fn from_config(config: &LocalCacheConfig) -> Self {
        Self::new(config.initial_buckets, config.load_factor, config.growth_rate)
    }

    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.table.read().contains_key(key)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.table.read().get(key).cloned()
    }

    /// Returns the bucket capacity that would trigger a resize at the next
    /// insert, mirroring Testable Property 11 (`threshold = buckets *
    /// loadFactor + 1`).
    pub fn resize_threshold(&self) -> usize {
        let capacity = self.table.read().capacity().max(1);
        (capacity as f32 * self.load_factor) as usize + 1
    }

    pub fn insert(&self, key: K, value: V) -> Option<V> {
        let mut table = self.table.write();
        if table.len() + 1 >= ((table.capacity().max(1) as f32 * self.load_factor) as usize + 1) {
            let target = ((table.capacity().max(1) as f32) * self.growth_rate) as usize;
            table.reserve(target.saturating_sub(table.capacity()));
        }
        table.insert(key, value)
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.table.write().remove(key)
    }

    /// Clears the map. Unlike `ObservableHashMap::truncate`, this carries
    /// no event semantics -- it's the plain `SafeHashMap` primitive.
    pub fn clear(&self) {
        self.table.write().clear();
    }

    /// Materializes a stable snapshot of the current entries. Any resize
    /// that happens after this call cannot affect the returned iterator.
    pub fn iter_snapshot(&self) -> SafeMapIter<K, V> {
        let entries: Vec<(K, V)> = self.table.read().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        self.active_iterators.fetch_add(1, Ordering::AcqRel);
        SafeMapIter { entries: entries.into_iter(), support: self }
    }

    pub fn active_iterator_count(&self) -> usize {
        self.active_iterators.load(Ordering::Acquire)
    }

    fn iterator_dropped(&self) {
        self.active_iterators.fetch_sub(1, Ordering::AcqRel);
    }
}

pub struct SafeMapIter<'a, K, V> {
    entries: std::vec::IntoIter<(K, V)>,
    support: &'a SafeHashMap<K, V>,
}

impl<'a, K: Key, V: Clone + Send + Sync + 'static> Iterator for SafeMapIter<'a, K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next()
    }
}

impl<'a, K, V> Drop for SafeMapIter<'a, K, V> {
    fn drop(&mut self) {
        self.support.iterator_dropped();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove_roundtrip() {
        let map: SafeHashMap<String, i32> = SafeHashMap::default();
        assert_eq!(map.insert("a".into(), 1), None);
        assert_eq!(map.get(&"a".to_string()), Some(1));
        assert_eq!(map.remove(&"a".to_string()), Some(1));
        assert_eq!(map.get(&"a".to_string()), None);
    }

    #[test]
    fn iterator_survives_resize_and_sees_original_keys() {
        let map: SafeHashMap<i32, i32> = SafeHashMap::new(4, 0.75, 2.0);
        for i in 0..8 {
            map.insert(i, i * 10);
        }
        let snapshot = map.iter_snapshot();
        assert_eq!(map.active_iterator_count(), 1);

        // trigger a resize while the snapshot iterator is alive.
        map.insert(8, 80);

        let mut seen: Vec<i32> = snapshot.map(|(k, _)| k).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..8).collect::<Vec<_>>());
        assert_eq!(map.active_iterator_count(), 0);
    }

    #[test]
    fn active_iterator_count_tracks_live_snapshots() {
        let map: SafeHashMap<i32, i32> = SafeHashMap::default();
        map.insert(1, 1);
        let a = map.iter_snapshot();
        let b = map.iter_snapshot();
        assert_eq!(map.active_iterator_count(), 2);
        drop(a);
        assert_eq!(map.active_iterator_count(), 1);
        drop(b);
        assert_eq!(map.active_iterator_count(), 0);
    }
}
