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

//! The `ConcurrentMap` seam (spec §6): per-key locking consumed by
//! `LocalConcurrentCache` and, in a simpler shape, by `CachingMap`'s control
//! map.

use std::time::Duration;

use crate::error::Result;

/// A lockable target: either a single key, or the `LOCK_ALL` sentinel that
/// escalates to exclusive access over the whole map.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LockKey<K> {
    Key(K),
    All,
}

pub trait ConcurrentMap<K> {
    /// Acquires the lock for `key`, waiting up to `wait` (`None` = forever).
    /// Returns `Ok(false)` on timeout rather than failing.
    fn lock(&self, key: LockKey<K>, wait: Option<Duration>) -> Result<bool>;

    /// Releases a lock held by the calling thread. Returns `Ok(false)` if
    /// the calling thread did not hold it.
    fn unlock(&self, key: &LockKey<K>) -> Result<bool>;
}
