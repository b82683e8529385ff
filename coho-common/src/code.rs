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

use std::fmt::Debug;
use std::hash::Hash;

/// Bound satisfied by every cache key.
///
/// Mirrors the Coherence `hashCode()`/`equals()` contract the original
/// client relies on: stable hash, value equality, cheap to clone (keys are
/// held by both the front and back tier, and by listener registries).
pub trait Key: Clone + Eq + Hash + Send + Sync + Debug + 'static {}
impl<T: Clone + Eq + Hash + Send + Sync + Debug + 'static> Key for T {}

/// Bound satisfied by every cache value.
///
/// Unlike [`Key`], values are never used as hash map keys and are not
/// required to implement [`Eq`] in general -- but equality is needed to
/// implement the "events-prove-freshness" check in `CachingMap`'s write
/// protocol, so it is part of the bound here rather than bolted on later.
pub trait Value: Clone + PartialEq + Send + Sync + Debug + 'static {}
impl<T: Clone + PartialEq + Send + Sync + Debug + 'static> Value for T {}
