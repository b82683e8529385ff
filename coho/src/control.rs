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

//! The `ControlMap` (spec §4.6, GLOSSARY "Control map"): the single
//! coordination surface `CachingMap` uses to serialize per-key operations
//! and to capture back-map events that arrive while a key is locked.
//!
//! Grounded in `original_source/include/public/coherence/net/cache/CachingMap.hpp`'s
//! `f_hMapControl` (a `ConcurrentMap` whose values are the event lists
//! accumulated while the corresponding key is locked) -- kept here as a
//! small purpose-built type rather than reusing `coho_common::concurrent`'s
//! `ConcurrentMap` trait, since this map's slot carries event-capture state
//! that a bare lock/unlock boolean contract doesn't model.

use std::collections::HashMap;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use coho_collections::CacheEvent;
use coho_common::code::{Key, Value};
use coho_common::error::Result;
use parking_lot::{Condvar, Mutex};

struct Slot<K, V> {
    owner: ThreadId,
    depth: u32,
    events: Vec<CacheEvent<K, V>>,
}

pub struct ControlMap<K, V> {
    slots: Mutex<HashMap<K, Slot<K, V>>>,
    condvar: Condvar,
}

impl<K: Key, V: Value> Default for ControlMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Key, V: Value> ControlMap<K, V> {
    pub fn new() -> Self {
        Self { slots: Mutex::new(HashMap::new()), condvar: Condvar::new() }
    }

    /// Acquires exclusive control of `key`, waiting up to `wait` (`None` =
    /// indefinite). Reentrant for the calling thread. Starts event capture
    /// for the key the moment this call returns `Ok(true)`: since the
    /// calling thread now exclusively owns the slot, there is no
    /// observable "before capture starts" window to race (spec §4.6.2's
    /// separate `startEventCapture` step collapses into lock acquisition).
    pub fn lock(&self, key: &K, wait: Option<Duration>) -> Result<bool> {
        let me = thread::current().id();
        let deadline = wait.map(|d| Instant::now() + d);
        let mut slots = self.slots.lock();
        loop {
            match slots.get_mut(key) {
                Some(slot) if slot.owner == me => {
                    slot.depth += 1;
                    return Ok(true);
                }
                Some(_) => match deadline {
                    None => self.condvar.wait(&mut slots),
                    Some(deadline) => {
                        let now = Instant::now();
                        if now >= deadline {
                            return Ok(false);
                        }
                        if self.condvar.wait_for(&mut slots, deadline - now).timed_out() && slots.contains_key(key) {
                            return Ok(false);
                        }
                    }
                },
                None => {
                    slots.insert(key.clone(), Slot { owner: me, depth: 1, events: Vec::new() });
                    return Ok(true);
                }
            }
        }
    }

    /// Releases the calling thread's hold on `key`. Any events still
    /// queued (not drained via [`Self::take_events`]) are dropped with the
    /// slot -- a caller that cares about them must drain before unlocking.
    pub fn unlock(&self, key: &K) -> Result<bool> {
        let me = thread::current().id();
        let mut slots = self.slots.lock();
        match slots.get_mut(key) {
            Some(slot) if slot.owner == me => {
                slot.depth -= 1;
                if slot.depth == 0 {
                    slots.remove(key);
                    self.condvar.notify_all();
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Drains events captured for `key` while it is locked by the calling
    /// thread, in arrival order.
    pub fn take_events(&self, key: &K) -> Vec<CacheEvent<K, V>> {
        let mut slots = self.slots.lock();
        slots.get_mut(key).map(|slot| std::mem::take(&mut slot.events)).unwrap_or_default()
    }

    /// Called by the back-map invalidation listener (spec §4.6.4): if `key`
    /// is currently locked (by any thread -- typically not the listener's
    /// own, since events arrive on the producer thread), the event is
    /// appended to its slot and `true` is returned so the caller skips
    /// direct front invalidation. Otherwise returns `false`.
    pub fn record_event(&self, key: &K, event: CacheEvent<K, V>) -> bool {
        let mut slots = self.slots.lock();
        match slots.get_mut(key) {
            Some(slot) => {
                slot.events.push(event);
                true
            }
            None => false,
        }
    }

    pub fn is_locked(&self, key: &K) -> bool {
        self.slots.lock().contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn reentrant_lock_for_owner() {
        let control: ControlMap<i32, i32> = ControlMap::new();
        assert!(control.lock(&1, None).unwrap());
        assert!(control.lock(&1, None).unwrap());
        assert!(control.unlock(&1).unwrap());
        assert!(control.is_locked(&1));
        assert!(control.unlock(&1).unwrap());
        assert!(!control.is_locked(&1));
    }

    #[test]
    fn events_recorded_only_while_locked() {
        let control: ControlMap<i32, i32> = ControlMap::new();
        assert!(!control.record_event(&1, CacheEvent::inserted(1, 1)));

        control.lock(&1, None).unwrap();
        assert!(control.record_event(&1, CacheEvent::inserted(1, 2)));
        let events = control.take_events(&1);
        assert_eq!(events.len(), 1);
        assert!(control.take_events(&1).is_empty());
        control.unlock(&1).unwrap();
    }

    #[test]
    fn second_thread_blocks_until_unlock() {
        let control = Arc::new(ControlMap::<i32, i32>::new());
        control.lock(&1, None).unwrap();

        let other = control.clone();
        let handle = thread::spawn(move || other.lock(&1, Some(Duration::from_millis(200))).unwrap());
        thread::sleep(Duration::from_millis(50));
        control.unlock(&1).unwrap();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn lock_times_out_when_held() {
        let control = Arc::new(ControlMap::<i32, i32>::new());
        control.lock(&1, None).unwrap();
        let other = control.clone();
        let handle = thread::spawn(move || other.lock(&1, Some(Duration::from_millis(50))).unwrap());
        assert!(!handle.join().unwrap());
        control.unlock(&1).unwrap();
    }
}
