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

//! coho: a coherent two-tier caching core, ported from Oracle Coherence's
//! C++ `CachingMap` onto a synchronous, thread-based foundation.
//!
//! A [`CachingMap`] composes a cheap, bounded, possibly-incomplete front
//! (`coho_memory::LocalCache`) over an authoritative, expensive back (any
//! [`backend::NamedCache`]), keeping the two coherent per one of five
//! invalidation strategies (`none`, `present`, `all`, `auto`, `logical`).
//! `convert` layers a different key/value representation on top of either
//! tier without either one needing to know about the other's wire format.

pub mod backend;
pub mod caching_map;
pub mod control;
pub mod convert;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use backend::{CacheMap, NamedCache, ObservableMap};
pub use caching_map::CachingMap;
pub use control::ControlMap;
pub use convert::{Converter, ConverterCacheMap, ConverterMapEvent, ConverterMapListener};
