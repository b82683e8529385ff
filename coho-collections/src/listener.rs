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

//! `MapListenerSupport` (spec C4): a two-dimensional listener registry keyed
//! by filter or by key, with lite/standard tracking and collect-then-fire
//! dispatch so that listener callbacks never run while the registry's own
//! lock is held.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use coho_common::code::{Key, Value};
use coho_common::error::Result;
use coho_common::filter::Filter;
use parking_lot::Mutex;

use crate::event::{CacheEvent, EventId, TransformationState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilterId(pub(crate) u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerWeight {
    Lite,
    Standard,
}

/// Capability tags from spec §6 (`MapListener` capabilities): `Synchronous`,
/// `Priming`, plus the transformer-awareness used by rule 6 of §4.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListenerFlags {
    pub synchronous: bool,
    pub priming: bool,
    pub transformer_aware: bool,
}

/// Receives `CacheEvent`s from a `MapListenerSupport`. Default methods are
/// no-ops so implementers only override what they care about, matching the
/// Coherence `MapListener` capability split (`entryInserted` /
/// `entryUpdated` / `entryDeleted`).
pub trait MapListener<K, V>: Send + Sync + Debug {
    fn entry_inserted(&self, event: &CacheEvent<K, V>) -> Result<()> {
        let _ = event;
        Ok(())
    }

    fn entry_updated(&self, event: &CacheEvent<K, V>) -> Result<()> {
        let _ = event;
        Ok(())
    }

    fn entry_deleted(&self, event: &CacheEvent<K, V>) -> Result<()> {
        let _ = event;
        Ok(())
    }

    fn notify(&self, event: &CacheEvent<K, V>) -> Result<()> {
        match event.id {
            EventId::Inserted => self.entry_inserted(event),
            EventId::Updated => self.entry_updated(event),
            EventId::Deleted => self.entry_deleted(event),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizationPlan {
    NoListeners,
    AllListener,
    KeyListener,
    NoOptimize,
}

struct FilterRegistration<K, V> {
    filter: Arc<dyn Filter<CacheEvent<K, V>>>,
    listener: Arc<dyn MapListener<K, V>>,
    weight: ListenerWeight,
    flags: ListenerFlags,
}

struct KeyRegistration<K, V> {
    listener: Arc<dyn MapListener<K, V>>,
    weight: ListenerWeight,
    flags: ListenerFlags,
}

struct Inner<K, V> {
    filters: HashMap<u64, FilterRegistration<K, V>>,
    keys: HashMap<K, Vec<(u64, KeyRegistration<K, V>)>>,
}

/// One matched registration, ready to be notified outside the lock.
struct Dispatch<K, V> {
    listener: Arc<dyn MapListener<K, V>>,
    weight: ListenerWeight,
}

pub struct MapListenerSupport<K, V> {
    inner: Mutex<Inner<K, V>>,
    next_id: AtomicU64,
}

impl<K: Key, V: Value> Default for MapListenerSupport<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Key, V: Value> MapListenerSupport<K, V> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner { filters: HashMap::new(), keys: HashMap::new() }),
            next_id: AtomicU64::new(1),
        }
    }

    fn alloc_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn add_filter_listener(
        &self,
        filter: Arc<dyn Filter<CacheEvent<K, V>>>,
        listener: Arc<dyn MapListener<K, V>>,
        weight: ListenerWeight,
        flags: ListenerFlags,
    ) -> FilterId {
        let id = self.alloc_id();
        self.inner.lock().filters.insert(id, FilterRegistration { filter, listener, weight, flags });
        FilterId(id)
    }

    pub fn remove_filter_listener(&self, id: FilterId) {
        self.inner.lock().filters.remove(&id.0);
    }

    /// Registers a key listener. If `flags.priming` is set, fires a
    /// synthetic priming event reflecting `current` immediately, before
    /// returning (spec §4.4 rule 4).
    pub fn add_key_listener(
        &self,
        key: K,
        listener: Arc<dyn MapListener<K, V>>,
        weight: ListenerWeight,
        flags: ListenerFlags,
        current: Option<V>,
    ) -> ListenerId {
        let id = self.alloc_id();
        {
            let mut inner = self.inner.lock();
            inner.keys.entry(key.clone()).or_default().push((id, KeyRegistration { listener: listener.clone(), weight, flags }));
        }
        if flags.priming {
            let event = CacheEvent::new(crate::event::MapEvent { id: EventId::Inserted, key, old_value: None, new_value: current })
                .priming()
                .synthetic();
            if let Err(error) = listener.notify(&event) {
                tracing::warn!(?error, "priming listener notification failed");
            }
        }
        ListenerId(id)
    }

    pub fn remove_key_listener(&self, key: &K, id: ListenerId) {
        let mut inner = self.inner.lock();
        if let Some(list) = inner.keys.get_mut(key) {
            list.retain(|(existing, _)| *existing != id.0);
            if list.is_empty() {
                inner.keys.remove(key);
            }
        }
    }

    pub fn plan(&self) -> OptimizationPlan {
        let inner = self.inner.lock();
        match (inner.filters.len(), inner.keys.len()) {
            (0, 0) => OptimizationPlan::NoListeners,
            (0, _) => OptimizationPlan::KeyListener,
            (1, 0) => OptimizationPlan::AllListener,
            _ => OptimizationPlan::NoOptimize,
        }
    }

    /// Gathers the listeners that should see `event`, without dispatching.
    /// Applies the transformation-state routing rule (§4.4 rule 6): a
    /// `NonTransformable` event skips transformer-aware listeners, a
    /// `Transformed` event reaches only them, `Transformable` reaches all.
    fn collect(&self, event: &CacheEvent<K, V>) -> Vec<Dispatch<K, V>> {
        let inner = self.inner.lock();
        if inner.filters.is_empty() && inner.keys.is_empty() {
            return Vec::new();
        }

        let passes_transformation = |aware: bool| match event.transformation_state {
            TransformationState::NonTransformable => !aware,
            TransformationState::Transformed => aware,
            TransformationState::Transformable => true,
        };

        let mut out = Vec::new();
        for reg in inner.filters.values() {
            if passes_transformation(reg.flags.transformer_aware) && reg.filter.evaluate(event) {
                out.push(Dispatch { listener: reg.listener.clone(), weight: reg.weight });
            }
        }
        if let Some(list) = inner.keys.get(&event.key) {
            for (_, reg) in list {
                if passes_transformation(reg.flags.transformer_aware) {
                    out.push(Dispatch { listener: reg.listener.clone(), weight: reg.weight });
                }
            }
        }
        out
    }

    /// Dispatches `event` to every matching listener outside the registry
    /// lock. In `strict` mode, the first listener error aborts the
    /// remaining dispatch for this event and is returned to the caller
    /// (spec §7: "errors raised by listener callbacks in strict dispatch
    /// mode abort the dispatch and propagate to the mutator"); otherwise
    /// errors are logged and dispatch continues.
    pub fn fire(&self, event: &CacheEvent<K, V>, strict: bool) -> Result<()> {
        let targets = self.collect(event);
        for target in targets {
            let delivered = match target.weight {
                ListenerWeight::Lite => event.to_lite(),
                ListenerWeight::Standard => event.clone(),
            };
            if let Err(error) = target.listener.notify(&delivered) {
                if strict {
                    return Err(error);
                }
                tracing::error!(?error, "listener error in non-strict dispatch");
            }
        }
        Ok(())
    }

    pub fn filter_listener_count(&self) -> usize {
        self.inner.lock().filters.len()
    }

    pub fn key_listener_count(&self, key: &K) -> usize {
        self.inner.lock().keys.get(key).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use coho_common::filter::AlwaysFilter;

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
    fn key_listener_receives_matching_events_only() {
        let support = MapListenerSupport::<String, i32>::new();
        let recorder = Arc::new(Recorder::default());
        support.add_key_listener("a".into(), recorder.clone(), ListenerWeight::Standard, ListenerFlags::default(), None);

        support.fire(&CacheEvent::inserted("a".to_string(), 1), true).unwrap();
        support.fire(&CacheEvent::inserted("b".to_string(), 2), true).unwrap();

        let events = recorder.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].key, "a");
    }

    #[test]
    fn priming_listener_fires_immediately_on_registration() {
        let support = MapListenerSupport::<String, i32>::new();
        let recorder = Arc::new(Recorder::default());
        let flags = ListenerFlags { priming: true, ..Default::default() };
        support.add_key_listener("a".into(), recorder.clone(), ListenerWeight::Standard, flags, Some(7));

        let events = recorder.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].priming);
        assert_eq!(events[0].new_value, Some(7));
    }

    #[test]
    fn lite_listener_receives_blanked_values() {
        let support = MapListenerSupport::<String, i32>::new();
        let recorder = Arc::new(Recorder::default());
        support.add_filter_listener(Arc::new(AlwaysFilter), recorder.clone(), ListenerWeight::Lite, ListenerFlags::default());

        support.fire(&CacheEvent::updated("a".to_string(), 1, 2), true).unwrap();

        let events = recorder.events.lock().unwrap();
        assert!(events[0].old_value.is_none());
        assert!(events[0].new_value.is_none());
    }

    #[test]
    fn remove_filter_listener_stops_delivery() {
        let support = MapListenerSupport::<String, i32>::new();
        let recorder = Arc::new(Recorder::default());
        let id = support.add_filter_listener(Arc::new(AlwaysFilter), recorder.clone(), ListenerWeight::Standard, ListenerFlags::default());
        support.remove_filter_listener(id);

        support.fire(&CacheEvent::inserted("a".to_string(), 1), true).unwrap();
        assert!(recorder.events.lock().unwrap().is_empty());
    }

    #[derive(Debug)]
    struct Failing;
    impl MapListener<String, i32> for Failing {
        fn notify(&self, _event: &CacheEvent<String, i32>) -> Result<()> {
            Err(coho_common::error::Error::illegal_state("boom"))
        }
    }

    #[test]
    fn strict_mode_aborts_on_first_error() {
        let support = MapListenerSupport::<String, i32>::new();
        support.add_filter_listener(Arc::new(AlwaysFilter), Arc::new(Failing), ListenerWeight::Standard, ListenerFlags::default());
        let recorder = Arc::new(Recorder::default());
        support.add_filter_listener(Arc::new(AlwaysFilter), recorder.clone(), ListenerWeight::Standard, ListenerFlags::default());

        let result = support.fire(&CacheEvent::inserted("a".to_string(), 1), true);
        assert!(result.is_err());
    }

    #[test]
    fn non_strict_mode_continues_past_errors() {
        let support = MapListenerSupport::<String, i32>::new();
        support.add_filter_listener(Arc::new(AlwaysFilter), Arc::new(Failing), ListenerWeight::Standard, ListenerFlags::default());
        let recorder = Arc::new(Recorder::default());
        support.add_filter_listener(Arc::new(AlwaysFilter), recorder.clone(), ListenerWeight::Standard, ListenerFlags::default());

        support.fire(&CacheEvent::inserted("a".to_string(), 1), false).unwrap();
        assert_eq!(recorder.events.lock().unwrap().len(), 1);
    }

    #[test]
    fn transformation_state_routes_to_transformer_aware_only() {
        let support = MapListenerSupport::<String, i32>::new();
        let aware = Arc::new(Recorder::default());
        let unaware = Arc::new(Recorder::default());
        support.add_filter_listener(
            Arc::new(AlwaysFilter),
            aware.clone(),
            ListenerWeight::Standard,
            ListenerFlags { transformer_aware: true, ..Default::default() },
        );
        support.add_filter_listener(Arc::new(AlwaysFilter), unaware.clone(), ListenerWeight::Standard, ListenerFlags::default());

        let transformed = CacheEvent::inserted("a".to_string(), 1).with_transformation_state(TransformationState::Transformed);
        support.fire(&transformed, true).unwrap();
        assert_eq!(aware.events.lock().unwrap().len(), 1);
        assert_eq!(unaware.events.lock().unwrap().len(), 0);
    }
}
