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

//! End-to-end `CachingMap` scenarios (spec §8), run against the in-process
//! back from `coho::testing` via the crate's own `test-util` feature.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use coho::testing::InProcessNamedCache;
use coho::CachingMap;
use coho_common::config::{CachingMapConfig, InvalidationStrategy, LocalCacheConfig};
use coho_memory::LocalCache;

fn map_with(strategy: InvalidationStrategy) -> (CachingMap<i32, i32>, Arc<InProcessNamedCache<i32, i32>>) {
    let front = Arc::new(LocalCache::new(LocalCacheConfig::default()).unwrap());
    let back = Arc::new(InProcessNamedCache::new());
    let config = CachingMapConfig { invalidation_strategy: strategy, ..Default::default() };
    (CachingMap::new(front, back.clone(), config).unwrap(), back)
}

/// Scenario S1: a reader racing an independent writer must never observe a
/// front permanently pinned to a stale value -- either the read captures
/// the write (via the control map) and skips caching it, or the write's
/// listener invalidates the front directly afterwards. Either way, the next
/// read is correct.
#[test_log::test]
fn scenario_s1_get_modify_race_self_heals() {
    let (map, back) = map_with(InvalidationStrategy::Present);
    back.seed(1, 0);

    let reader_map = map.clone();
    let reader = thread::spawn(move || {
        for _ in 0..200 {
            let _ = reader_map.get(&1);
        }
    });

    for i in 1..=200 {
        back.seed(1, i);
        thread::yield_now();
    }
    reader.join().unwrap();

    assert_eq!(map.get(&1).unwrap(), Some(200));
}

#[test_log::test]
fn none_strategy_caches_without_registering_any_listener() {
    let (map, back) = map_with(InvalidationStrategy::None);
    back.seed(1, 1);
    assert_eq!(map.get(&1).unwrap(), Some(1));

    // An external write is never observed by `none` -- no listener exists
    // to invalidate the stale front entry.
    back.seed(1, 2);
    assert_eq!(map.get(&1).unwrap(), Some(1));
}

#[test_log::test]
fn present_strategy_only_watches_keys_actually_read() {
    let (map, back) = map_with(InvalidationStrategy::Present);
    back.seed(1, 1);
    back.seed(2, 2);

    assert_eq!(map.get(&1).unwrap(), Some(1));

    // key 2 was never read through the map, so no listener was registered
    // for it; a direct back write is invisible until the next miss-driven
    // read re-establishes coherence.
    back.seed(2, 20);
    back.seed(1, 10);
    assert_eq!(map.get(&1).unwrap(), Some(10));
}

#[test_log::test]
fn all_strategy_invalidates_even_untouched_keys() {
    let (map, back) = map_with(InvalidationStrategy::All);
    back.seed(1, 1);
    back.seed(2, 2);
    assert_eq!(map.get(&1).unwrap(), Some(1));

    back.seed(1, 100);
    // `all` listens to every back event, so the front is invalidated even
    // though this write wasn't preceded by a matching per-key listener.
    assert_eq!(map.get(&1).unwrap(), Some(100));
}

#[test_log::test]
fn get_all_and_put_all_round_trip() {
    let (map, _back) = map_with(InvalidationStrategy::Auto);
    map.put_all(vec![(1, 10), (2, 20), (3, 30)]).unwrap();

    let all = map.get_all(&[1, 2, 3, 4]).unwrap();
    assert_eq!(all.get(&1), Some(&10));
    assert_eq!(all.get(&2), Some(&20));
    assert_eq!(all.get(&3), Some(&30));
    assert_eq!(all.get(&4), None);
}

#[test_log::test]
fn released_map_rejects_further_operations() {
    let (map, _back) = map_with(InvalidationStrategy::Present);
    map.put(1, 1, None).unwrap();
    map.release().unwrap();

    assert!(map.get(&1).is_err());
    assert!(map.put(2, 2, None).is_err());
    // release is idempotent
    assert!(map.release().is_ok());
}

#[test_log::test]
fn destroying_the_back_releases_the_caching_map() {
    let (map, back) = map_with(InvalidationStrategy::All);
    map.put(1, 1, None).unwrap();
    back.destroy().unwrap();

    // the deactivation listener should have released the map in response.
    assert!(map.is_released());
    assert!(map.get(&1).is_err());
}

#[test_log::test]
fn control_wait_times_out_under_contention() {
    let front = Arc::new(LocalCache::new(LocalCacheConfig::default()).unwrap());
    let back = Arc::new(InProcessNamedCache::<i32, i32>::new());
    let config = CachingMapConfig {
        invalidation_strategy: InvalidationStrategy::Present,
        control_wait: Some(Duration::from_millis(50)),
        ..Default::default()
    };
    let map = CachingMap::new(front, back, config).unwrap();

    let held = map.clone();
    let barrier = Arc::new(std::sync::Barrier::new(2));
    let held_barrier = barrier.clone();
    let handle = thread::spawn(move || {
        held.hold_control_lock_for_test(&1, held_barrier, Duration::from_millis(200));
    });

    barrier.wait();
    // the other thread is holding the control lock for key 1; our put must
    // time out rather than block forever.
    let result = map.put(1, 1, None);
    assert!(result.is_err());
    handle.join().unwrap();
}
