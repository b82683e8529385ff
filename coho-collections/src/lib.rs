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

//! Stable-iteration hash map, observable wrapper, listener dispatch core
//! and event data model shared by `coho-memory` and `coho`.

pub mod event;
pub mod listener;
pub mod observable_map;
pub mod safe_map;

pub use event::{CacheEvent, EventId, FilterEvent, MapEvent, TransformationState};
pub use listener::{FilterId, ListenerFlags, ListenerId, ListenerWeight, MapListener, MapListenerSupport, OptimizationPlan};
pub use observable_map::ObservableHashMap;
pub use safe_map::{SafeHashMap, SafeMapIter};
