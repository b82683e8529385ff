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

//! Event data model (spec C8): `MapEvent`, `CacheEvent`, `FilterEvent`.

use std::ops::Deref;

use coho_common::filter::Presence;

use crate::listener::FilterId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventId {
    Inserted,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransformationState {
    #[default]
    NonTransformable,
    Transformable,
    Transformed,
}

/// The base event: which map, what happened, old/new value.
#[derive(Debug, Clone, PartialEq)]
pub struct MapEvent<K, V> {
    pub id: EventId,
    pub key: K,
    pub old_value: Option<V>,
    pub new_value: Option<V>,
}

impl<K, V> MapEvent<K, V> {
    pub fn inserted(key: K, new_value: V) -> Self {
        Self { id: EventId::Inserted, key, old_value: None, new_value: Some(new_value) }
    }

    pub fn updated(key: K, old_value: V, new_value: V) -> Self {
        Self { id: EventId::Updated, key, old_value: Some(old_value), new_value: Some(new_value) }
    }

    pub fn deleted(key: K, old_value: V) -> Self {
        Self { id: EventId::Deleted, key, old_value: Some(old_value), new_value: None }
    }

    /// A copy of this event with old/new values blanked, for "lite"
    /// listeners (spec §4.4 rule 3).
    pub fn to_lite(&self) -> Self
    where
        K: Clone,
    {
        Self { id: self.id, key: self.key.clone(), old_value: None, new_value: None }
    }
}

/// `CacheEvent` extends `MapEvent` with the cache-specific flags spec §4.8
/// names: synthetic, priming, expired, transformation state.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEvent<K, V> {
    pub event: MapEvent<K, V>,
    pub synthetic: bool,
    pub priming: bool,
    pub expired: bool,
    pub transformation_state: TransformationState,
}

impl<K, V> Deref for CacheEvent<K, V> {
    type Target = MapEvent<K, V>;

    fn deref(&self) -> &Self::Target {
        &self.event
    }
}

impl<K, V> CacheEvent<K, V> {
    pub fn new(event: MapEvent<K, V>) -> Self {
        Self { event, synthetic: false, priming: false, expired: false, transformation_state: TransformationState::default() }
    }

    pub fn inserted(key: K, new_value: V) -> Self {
        Self::new(MapEvent::inserted(key, new_value))
    }

    pub fn updated(key: K, old_value: V, new_value: V) -> Self {
        Self::new(MapEvent::updated(key, old_value, new_value))
    }

    pub fn deleted(key: K, old_value: V) -> Self {
        Self::new(MapEvent::deleted(key, old_value))
    }

    pub fn synthetic(mut self) -> Self {
        self.synthetic = true;
        self
    }

    pub fn priming(mut self) -> Self {
        self.priming = true;
        self
    }

    /// Expiry always implies synthetic (spec GLOSSARY: expiry is cache
    /// machinery, not a client mutation).
    pub fn expired(mut self) -> Self {
        self.expired = true;
        self.synthetic = true;
        self
    }

    pub fn with_transformation_state(mut self, state: TransformationState) -> Self {
        self.transformation_state = state;
        self
    }

    pub fn to_lite(&self) -> Self
    where
        K: Clone,
    {
        Self {
            event: self.event.to_lite(),
            synthetic: self.synthetic,
            priming: self.priming,
            expired: self.expired,
            transformation_state: self.transformation_state,
        }
    }
}

impl<K, V> Presence for CacheEvent<K, V> {
    fn is_present(&self) -> bool {
        self.event.new_value.is_some()
    }
}

/// An event annotated with the filters that caused it to be dispatched.
#[derive(Debug, Clone)]
pub struct FilterEvent<K, V> {
    pub inner: CacheEvent<K, V>,
    pub filter_ids: Vec<FilterId>,
}

impl<K, V> FilterEvent<K, V> {
    pub fn new(inner: CacheEvent<K, V>, filter_ids: Vec<FilterId>) -> Self {
        Self { inner, filter_ids }
    }
}

impl<K, V> Deref for FilterEvent<K, V> {
    type Target = CacheEvent<K, V>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lite_event_blanks_values() {
        let event = CacheEvent::updated("a", 1, 2);
        let lite = event.to_lite();
        assert_eq!(lite.key, "a");
        assert!(lite.old_value.is_none());
        assert!(lite.new_value.is_none());
        assert_eq!(lite.id, EventId::Updated);
    }

    #[test]
    fn expired_implies_synthetic() {
        let event = CacheEvent::deleted("a", 1).expired();
        assert!(event.synthetic);
        assert!(event.expired);
    }

    #[test]
    fn present_filter_matches_inserts_not_deletes() {
        use coho_common::filter::{Filter, PresentFilter};
        let insert = CacheEvent::inserted("a", 1);
        let delete = CacheEvent::deleted("a", 1);
        assert!(PresentFilter.evaluate(&insert));
        assert!(!PresentFilter.evaluate(&delete));
    }
}
