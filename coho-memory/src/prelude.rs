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

pub use crate::eviction::{EvictionPolicy, HybridPolicy, LfuPolicy, LruPolicy};
pub use crate::loader::{CacheLoader, CacheStore, IterableCacheLoader, ReadOnlyStore};
pub use crate::lock::LocalConcurrentCache;
pub use crate::local::LocalCache;
pub use crate::query::{EntryAggregator, EntryProcessor, LimitFilter};
pub use coho_common::concurrent::{ConcurrentMap, LockKey};
