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

//! The bounded, evicting `LocalCache` front tier (spec C5): eviction
//! policies, TTL, loader/store integration, per-key locking, and filtered
//! query/invoke/aggregate.

pub mod entry;
pub mod eviction;
pub mod lock;
pub mod loader;
pub mod local;
pub mod prelude;
pub mod query;

pub use entry::Entry;
pub use lock::LocalConcurrentCache;
pub use loader::{CacheLoader, CacheStore, IterableCacheLoader, ReadOnlyStore};
pub use local::LocalCache;
pub use query::{EntryAggregator, EntryProcessor, LimitFilter};
