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

//! `ConverterCollections` (spec C7): lets the front and back hold different
//! representations of the same logical key/value space -- typically a
//! deserialized client-facing form over the back's serialized wire form --
//! by converting at the seam rather than requiring both tiers to agree on
//! one representation.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use coho_collections::{CacheEvent, EventId, MapEvent, MapListener};
use coho_common::code::{Key, Value};
use coho_common::error::Result;

use crate::backend::CacheMap;

/// One-directional conversion between representations. `Converter<A, B>`
/// and `Converter<B, A>` together form a round trip; nothing enforces that
/// `convert(convert(x))` recovers `x` beyond whatever the implementer
/// guarantees.
pub trait Converter<A, B>: Send + Sync + std::fmt::Debug {
    fn convert(&self, value: &A) -> B;
}

/// Adapts a back `CacheMap<Kb, Vb>` to the `Kf`/`Vf` representation the
/// front (and the client) actually uses. Every operation pays one
/// conversion per key/value it touches; there is no caching of converted
/// values here, unlike [`ConverterMapEvent`] below.
pub struct ConverterCacheMap<Kf: Key, Vf: Value, Kb: Key, Vb: Value> {
    inner: Arc<dyn CacheMap<Kb, Vb>>,
    key_up: Arc<dyn Converter<Kb, Kf>>,
    key_down: Arc<dyn Converter<Kf, Kb>>,
    value_up: Arc<dyn Converter<Vb, Vf>>,
    value_down: Arc<dyn Converter<Vf, Vb>>,
}

impl<Kf: Key, Vf: Value, Kb: Key, Vb: Value> ConverterCacheMap<Kf, Vf, Kb, Vb> {
    pub fn new(
        inner: Arc<dyn CacheMap<Kb, Vb>>,
        key_up: Arc<dyn Converter<Kb, Kf>>,
        key_down: Arc<dyn Converter<Kf, Kb>>,
        value_up: Arc<dyn Converter<Vb, Vf>>,
        value_down: Arc<dyn Converter<Vf, Vb>>,
    ) -> Self {
        Self { inner, key_up, key_down, value_up, value_down }
    }
}

impl<Kf: Key, Vf: Value, Kb: Key, Vb: Value> CacheMap<Kf, Vf> for ConverterCacheMap<Kf, Vf, Kb, Vb> {
    fn size(&self) -> usize {
        self.inner.size()
    }

    fn contains_key(&self, key: &Kf) -> bool {
        self.inner.contains_key(&self.key_down.convert(key))
    }

    fn get(&self, key: &Kf) -> Result<Option<Vf>> {
        Ok(self.inner.get(&self.key_down.convert(key))?.map(|v| self.value_up.convert(&v)))
    }

    fn put_with_expiry(&self, key: Kf, value: Vf, expiry: Option<Duration>) -> Result<Option<Vf>> {
        let back_key = self.key_down.convert(&key);
        let back_value = self.value_down.convert(&value);
        Ok(self.inner.put_with_expiry(back_key, back_value, expiry)?.map(|v| self.value_up.convert(&v)))
    }

    fn remove(&self, key: &Kf) -> Result<Option<Vf>> {
        Ok(self.inner.remove(&self.key_down.convert(key))?.map(|v| self.value_up.convert(&v)))
    }

    fn clear(&self) -> Result<()> {
        self.inner.clear()
    }

    fn entry_set(&self) -> Result<Vec<(Kf, Vf)>> {
        Ok(self.inner.entry_set()?.into_iter().map(|(k, v)| (self.key_up.convert(&k), self.value_up.convert(&v))).collect())
    }
}

/// A `CacheEvent<Kb, Vb>` viewed through `Kf`/`Vf` converters, with each
/// field converted at most once and cached for the life of this wrapper --
/// useful when a listener only inspects, say, the key and never touches the
/// (possibly expensive to deserialize) value.
pub struct ConverterMapEvent<Kf, Vf, Kb, Vb> {
    inner: CacheEvent<Kb, Vb>,
    key_up: Arc<dyn Converter<Kb, Kf>>,
    value_up: Arc<dyn Converter<Vb, Vf>>,
    key_cache: OnceLock<Kf>,
    old_cache: OnceLock<Option<Vf>>,
    new_cache: OnceLock<Option<Vf>>,
}

impl<Kf, Vf, Kb, Vb> ConverterMapEvent<Kf, Vf, Kb, Vb> {
    pub fn new(inner: CacheEvent<Kb, Vb>, key_up: Arc<dyn Converter<Kb, Kf>>, value_up: Arc<dyn Converter<Vb, Vf>>) -> Self {
        Self { inner, key_up, value_up, key_cache: OnceLock::new(), old_cache: OnceLock::new(), new_cache: OnceLock::new() }
    }

    pub fn id(&self) -> EventId {
        self.inner.id
    }

    pub fn key(&self) -> &Kf {
        self.key_cache.get_or_init(|| self.key_up.convert(&self.inner.key))
    }

    pub fn old_value(&self) -> &Option<Vf> {
        self.old_cache.get_or_init(|| self.inner.old_value.as_ref().map(|v| self.value_up.convert(v)))
    }

    pub fn new_value(&self) -> &Option<Vf> {
        self.new_cache.get_or_init(|| self.inner.new_value.as_ref().map(|v| self.value_up.convert(v)))
    }
}

/// Adapts a front `MapListener<Kf, Vf>` for registration on a back
/// `NamedCache<Kb, Vb>`, converting each delivered event eagerly (a
/// listener must receive a concrete `CacheEvent<Kf, Vf>`, so there is no
/// room for `ConverterMapEvent`'s laziness on this path).
#[derive(Debug)]
pub struct ConverterMapListener<Kf: Key, Vf: Value, Kb: Key, Vb: Value> {
    inner: Arc<dyn MapListener<Kf, Vf>>,
    key_up: Arc<dyn Converter<Kb, Kf>>,
    value_up: Arc<dyn Converter<Vb, Vf>>,
}

impl<Kf: Key, Vf: Value, Kb: Key, Vb: Value> ConverterMapListener<Kf, Vf, Kb, Vb> {
    pub fn new(inner: Arc<dyn MapListener<Kf, Vf>>, key_up: Arc<dyn Converter<Kb, Kf>>, value_up: Arc<dyn Converter<Vb, Vf>>) -> Self {
        Self { inner, key_up, value_up }
    }
}

impl<Kf: Key, Vf: Value, Kb: Key, Vb: Value> MapListener<Kb, Vb> for ConverterMapListener<Kf, Vf, Kb, Vb> {
    fn notify(&self, event: &CacheEvent<Kb, Vb>) -> Result<()> {
        let converted = CacheEvent {
            event: MapEvent {
                id: event.id,
                key: self.key_up.convert(&event.key),
                old_value: event.old_value.as_ref().map(|v| self.value_up.convert(v)),
                new_value: event.new_value.as_ref().map(|v| self.value_up.convert(v)),
            },
            synthetic: event.synthetic,
            priming: event.priming,
            expired: event.expired,
            transformation_state: event.transformation_state,
        };
        self.inner.notify(&converted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InProcessNamedCache;

    #[derive(Debug)]
    struct IntToString;
    impl Converter<i32, String> for IntToString {
        fn convert(&self, value: &i32) -> String {
            value.to_string()
        }
    }

    #[derive(Debug)]
    struct StringToInt;
    impl Converter<String, i32> for StringToInt {
        fn convert(&self, value: &String) -> i32 {
            value.parse().expect("back representation must be a valid integer")
        }
    }

    fn converter_map() -> ConverterCacheMap<i32, i32, String, String> {
        let back: Arc<InProcessNamedCache<String, String>> = Arc::new(InProcessNamedCache::new());
        ConverterCacheMap::new(back, Arc::new(StringToInt), Arc::new(IntToString), Arc::new(StringToInt), Arc::new(IntToString))
    }

    #[test]
    fn put_then_get_round_trips_through_both_converters() {
        let map = converter_map();
        assert_eq!(map.put_with_expiry(1, 100, None).unwrap(), None);
        assert_eq!(map.get(&1).unwrap(), Some(100));
        assert_eq!(map.size(), 1);
    }

    #[test]
    fn entry_set_converts_every_pair() {
        let map = converter_map();
        map.put_with_expiry(1, 10, None).unwrap();
        map.put_with_expiry(2, 20, None).unwrap();
        let mut entries = map.entry_set().unwrap();
        entries.sort();
        assert_eq!(entries, vec![(1, 10), (2, 20)]);
    }

    #[test]
    fn converter_map_event_caches_conversions() {
        let event = CacheEvent::updated("7".to_string(), "70".to_string(), "71".to_string());
        let wrapped = ConverterMapEvent::new(event, Arc::new(StringToInt), Arc::new(StringToInt));
        assert_eq!(*wrapped.key(), 7);
        assert_eq!(*wrapped.key(), 7); // second call hits the memoized value
        assert_eq!(*wrapped.new_value(), Some(71));
    }
}
