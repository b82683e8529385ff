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

//! `LocalConcurrentCache` (spec §4.5): per-key locking on top of
//! `LocalCache`, with `lock(LOCK_ALL)` escalating to exclusive access via
//! the map's `ThreadGate`.
//!
//! Per-key locks are "readers" of the gate: acquiring any single key lock
//! first takes a shared `enter()`, so a `LOCK_ALL` holder (which `close()`s
//! the gate) is guaranteed no new per-key lock can start while it waits for
//! existing ones to drain.

use std::collections::HashMap;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use coho_common::code::{Key, Value};
use coho_common::concurrent::{ConcurrentMap, LockKey};
use coho_common::error::{Error, Result};
use coho_sync::{Acquisition, ThreadGate};
use parking_lot::{Condvar, Mutex};

use crate::local::LocalCache;

struct LockState {
    owner: ThreadId,
    depth: u32,
}

pub struct LocalConcurrentCache<K: Key, V: Value> {
    cache: LocalCache<K, V>,
    gate: ThreadGate,
    locks: Mutex<HashMap<K, LockState>>,
    condvar: Condvar,
}

impl<K: Key, V: Value> LocalConcurrentCache<K, V> {
    pub fn new(cache: LocalCache<K, V>) -> Self {
        Self { cache, gate: ThreadGate::new(), locks: Mutex::new(HashMap::new()), condvar: Condvar::new() }
    }

    pub fn cache(&self) -> &LocalCache<K, V> {
        &self.cache
    }

    pub fn get(&self, key: &K) -> Result<Option<V>> {
        self.cache.get(key)
    }

    pub fn put(&self, key: K, value: V, expiry_millis: i64) -> Result<Option<V>> {
        let lock_key = key.clone();
        self.guarded(&lock_key, move || self.cache.put(key, value, expiry_millis))
    }

    pub fn remove(&self, key: &K) -> Result<Option<V>> {
        self.guarded(key, || self.cache.remove(key))
    }

    fn guarded<T>(&self, key: &K, f: impl FnOnce() -> Result<T>) -> Result<T> {
        if !self.cache.config().locking_enforced {
            return f();
        }
        let wait = self.cache.config().lock_wait;
        if !self.lock(LockKey::Key(key.clone()), wait)? {
            return Err(Error::concurrent_modification("could not acquire per-key lock within the configured wait"));
        }
        let result = f();
        self.unlock(&LockKey::Key(key.clone()))?;
        result
    }
}

impl<K: Key, V: Value> ConcurrentMap<K> for LocalConcurrentCache<K, V> {
    fn lock(&self, key: LockKey<K>, wait: Option<Duration>) -> Result<bool> {
        match key {
            LockKey::All => match self.gate.close(wait)? {
                Acquisition::Acquired => Ok(true),
                Acquisition::TimedOut => Ok(false),
            },
            LockKey::Key(k) => {
                if self.gate.enter(wait)? == Acquisition::TimedOut {
                    return Ok(false);
                }
                let me = thread::current().id();
                let deadline = wait.map(|d| Instant::now() + d);
                let mut locks = self.locks.lock();
                loop {
                    match locks.get_mut(&k) {
                        Some(state) if state.owner == me => {
                            state.depth += 1;
                            return Ok(true);
                        }
                        Some(_) => {
                            let timed_out = match deadline {
                                None => {
                                    self.condvar.wait(&mut locks);
                                    false
                                }
                                Some(deadline) => {
                                    let now = Instant::now();
                                    if now >= deadline {
                                        true
                                    } else {
                                        self.condvar.wait_for(&mut locks, deadline - now).timed_out()
                                    }
                                }
                            };
                            if timed_out && locks.contains_key(&k) {
                                drop(locks);
                                self.gate.exit()?;
                                return Ok(false);
                            }
                        }
                        None => {
                            locks.insert(k, LockState { owner: me, depth: 1 });
                            return Ok(true);
                        }
                    }
                }
            }
        }
    }

    fn unlock(&self, key: &LockKey<K>) -> Result<bool> {
        match key {
            LockKey::All => {
                self.gate.open()?;
                Ok(true)
            }
            LockKey::Key(k) => {
                let me = thread::current().id();
                let released = {
                    let mut locks = self.locks.lock();
                    match locks.get_mut(k) {
                        Some(state) if state.owner == me => {
                            state.depth -= 1;
                            if state.depth == 0 {
                                locks.remove(k);
                                self.condvar.notify_all();
                            }
                            true
                        }
                        _ => false,
                    }
                };
                if released {
                    self.gate.exit()?;
                }
                Ok(released)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use coho_common::config::LocalCacheConfig;

    use super::*;

    #[test]
    fn unenforced_locking_allows_unguarded_mutation() {
        let cache = LocalConcurrentCache::new(LocalCache::<i32, i32>::new(LocalCacheConfig::default()).unwrap());
        cache.put(1, 1, 0).unwrap();
        assert_eq!(cache.get(&1).unwrap(), Some(1));
    }

    #[test]
    fn key_lock_is_reentrant_for_owner() {
        let config = LocalCacheConfig { locking_enforced: true, ..Default::default() };
        let cache = LocalConcurrentCache::new(LocalCache::<i32, i32>::new(config).unwrap());
        assert!(cache.lock(LockKey::Key(1), None).unwrap());
        assert!(cache.lock(LockKey::Key(1), None).unwrap());
        assert!(cache.unlock(&LockKey::Key(1)).unwrap());
        assert!(cache.unlock(&LockKey::Key(1)).unwrap());
    }

    #[test]
    fn lock_all_excludes_new_key_locks_until_open() {
        let config = LocalCacheConfig { locking_enforced: true, ..Default::default() };
        let cache = Arc::new(LocalConcurrentCache::new(LocalCache::<i32, i32>::new(config).unwrap()));
        assert!(cache.lock(LockKey::All, None).unwrap());

        let other = cache.clone();
        let handle = thread::spawn(move || other.lock(LockKey::Key(1), Some(Duration::from_millis(100))).unwrap());
        assert!(!handle.join().unwrap());

        assert!(cache.unlock(&LockKey::All).unwrap());
        assert!(cache.lock(LockKey::Key(1), Some(Duration::from_millis(100))).unwrap());
    }

    #[test]
    fn locking_enforced_rejects_put_without_available_lock() {
        let config = LocalCacheConfig { locking_enforced: true, lock_wait: Some(Duration::from_millis(50)), ..Default::default() };
        let cache = Arc::new(LocalConcurrentCache::new(LocalCache::<i32, i32>::new(config).unwrap()));
        assert!(cache.lock(LockKey::Key(1), None).unwrap());

        let other = cache.clone();
        let handle = thread::spawn(move || other.put(1, 99, 0));
        assert!(handle.join().unwrap().is_err());

        cache.unlock(&LockKey::Key(1)).unwrap();
    }
}
