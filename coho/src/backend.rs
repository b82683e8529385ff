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

//! The front/back collaborator seam (spec §6): `CacheMap`, `ObservableMap`
//! and `NamedCache` are the interfaces `CachingMap` consumes but does not
//! itself define. A real deployment's back map is a remote, observable
//! cache client; `coho_memory::LocalCache` plays the front (and, in the
//! `testing` module, a minimal in-process map plays the back for tests).

use std::collections::HashMap;
use std::time::Duration;

use coho_collections::{CacheEvent, FilterId, ListenerId, MapListener};
use coho_common::code::{Key, Value};
use coho_common::error::Result;
use coho_common::filter::Filter;
use std::sync::Arc;

/// `size, isEmpty, containsKey, containsValue, get, getAll, put, putAll,
/// remove, clear, keySet, values, entrySet` (spec §6).
pub trait CacheMap<K: Key, V: Value>: Send + Sync {
    fn size(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    fn contains_key(&self, key: &K) -> bool;

    fn get(&self, key: &K) -> Result<Option<V>>;

    /// Bulk read; the default folds `get` over each key, matching the
    /// fallback the original takes when a back map has no bulk-read
    /// acceleration.
    fn get_all(&self, keys: &[K]) -> Result<HashMap<K, V>> {
        let mut out = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.get(key)? {
                out.insert(key.clone(), value);
            }
        }
        Ok(out)
    }

    /// `put(k, v)` with no explicit expiry (cache default applies).
    fn put(&self, key: K, value: V) -> Result<Option<V>> {
        self.put_with_expiry(key, value, None)
    }

    /// `put(k, v, ttl)`.
    fn put_with_expiry(&self, key: K, value: V, expiry: Option<Duration>) -> Result<Option<V>>;

    fn put_all(&self, entries: Vec<(K, V)>) -> Result<()> {
        for (key, value) in entries {
            self.put(key, value)?;
        }
        Ok(())
    }

    fn remove(&self, key: &K) -> Result<Option<V>>;

    fn clear(&self) -> Result<()>;

    fn key_set(&self) -> Result<Vec<K>> {
        Ok(self.entry_set()?.into_iter().map(|(k, _)| k).collect())
    }

    fn values(&self) -> Result<Vec<V>> {
        Ok(self.entry_set()?.into_iter().map(|(_, v)| v).collect())
    }

    fn entry_set(&self) -> Result<Vec<(K, V)>>;
}

/// `addKeyListener, removeKeyListener, addMapListener, removeMapListener,
/// addFilterListener(filter,lite), removeFilterListener(filter)` (spec §6).
/// Only available on the back map; `CachingMap` degrades to the `none`
/// invalidation strategy when the configured back does not implement it.
pub trait ObservableMap<K: Key, V: Value>: CacheMap<K, V> {
    /// Registers a listener for a single key. `priming` requests an
    /// immediate synthetic event reflecting the key's current value (spec
    /// §4.4 rule 4); `lite` controls whether delivered events carry
    /// old/new values.
    fn add_key_listener(&self, key: K, listener: Arc<dyn MapListener<K, V>>, lite: bool, priming: bool) -> ListenerId;

    fn remove_key_listener(&self, key: &K, id: ListenerId);

    /// `addMapListener` with no filter is the degenerate case of
    /// `addFilterListener(AlwaysFilter, lite)`; `CachingMap`'s `all` and
    /// `logical` strategies always go through the filter form.
    fn add_filter_listener(&self, filter: Arc<dyn Filter<CacheEvent<K, V>>>, listener: Arc<dyn MapListener<K, V>>, lite: bool) -> FilterId;

    fn remove_filter_listener(&self, id: FilterId);
}

/// The back collaborator proper: an `ObservableMap` that can also report
/// liveness and be torn down or wiped server-side (spec §6:
/// `NamedCacheDeactivationListener` reacts to exactly these two things).
pub trait NamedCache<K: Key, V: Value>: ObservableMap<K, V> {
    fn is_active(&self) -> bool;

    /// Registers a deactivation listener: `entryDeleted` on destroy,
    /// `entryUpdated` on truncate, `entryInserted` unused (spec §6).
    fn add_deactivation_listener(&self, listener: Arc<dyn MapListener<K, V>>);

    fn remove_deactivation_listener(&self);

    fn destroy(&self) -> Result<()>;

    fn truncate(&self) -> Result<()>;
}

/// Adapts `coho_memory::LocalCache` to the `CacheMap` seam so it can serve
/// as `CachingMap`'s front tier. A local trait over a foreign type: legal
/// under Rust's orphan rules because the trait is defined in this crate.
impl<K: Key, V: Value> CacheMap<K, V> for coho_memory::LocalCache<K, V> {
    fn size(&self) -> usize {
        self.len()
    }

    fn is_empty(&self) -> bool {
        coho_memory::LocalCache::is_empty(self)
    }

    fn contains_key(&self, key: &K) -> bool {
        coho_memory::LocalCache::contains_key(self, key)
    }

    fn get(&self, key: &K) -> Result<Option<V>> {
        coho_memory::LocalCache::get(self, key)
    }

    fn put_with_expiry(&self, key: K, value: V, expiry: Option<Duration>) -> Result<Option<V>> {
        let expiry_millis = expiry.map(|d| d.as_millis() as i64).unwrap_or(0);
        coho_memory::LocalCache::put(self, key, value, expiry_millis)
    }

    fn remove(&self, key: &K) -> Result<Option<V>> {
        coho_memory::LocalCache::remove(self, key)
    }

    fn clear(&self) -> Result<()> {
        coho_memory::LocalCache::clear(self);
        Ok(())
    }

    fn entry_set(&self) -> Result<Vec<(K, V)>> {
        Ok(self.key_set(&coho_common::filter::AlwaysFilter).into_iter().filter_map(|k| self.get(&k).ok().flatten().map(|v| (k, v))).collect())
    }
}
