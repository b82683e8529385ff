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

//! The predicate seam consumed (but not fully specified) by the core:
//! `MapListenerSupport` evaluates filters against events, `LocalCache`
//! evaluates them against entries for `keySet`/`entrySet`/`invokeAll`.

use std::fmt::Debug;

/// Something that can decide membership for a `T`.
///
/// Index-aware filters (not modeled here; out of scope per `spec.md` §6)
/// would additionally expose `calculate_effectiveness`/`apply_index`.
pub trait Filter<T>: Send + Sync + Debug {
    fn evaluate(&self, target: &T) -> bool;
}

/// Matches everything; the degenerate filter used by the `all` invalidation
/// strategy's single back-wide listener.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysFilter;

impl<T> Filter<T> for AlwaysFilter {
    fn evaluate(&self, _target: &T) -> bool {
        true
    }
}

/// Matches nothing; useful as a registration placeholder and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverFilter;

impl<T> Filter<T> for NeverFilter {
    fn evaluate(&self, _target: &T) -> bool {
        false
    }
}

/// Grounded in `original_source/include/public/coherence/util/filter/PresentFilter.hpp`:
/// the original matches map entries whose value is non-null (i.e. "present"
/// rather than a removal marker). Here it is evaluated against anything
/// that can report whether it represents presence, which covers both raw
/// `Option<V>` values and `CacheEvent`s (see `coho_collections::event`).
#[derive(Debug, Clone, Copy, Default)]
pub struct PresentFilter;

/// Implemented by anything `PresentFilter` can judge as present/absent.
pub trait Presence {
    fn is_present(&self) -> bool;
}

impl<V> Presence for Option<V> {
    fn is_present(&self) -> bool {
        self.is_some()
    }
}

impl<T: Presence> Filter<T> for PresentFilter {
    fn evaluate(&self, target: &T) -> bool {
        target.is_present()
    }
}
