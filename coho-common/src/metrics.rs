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

use std::sync::atomic::{AtomicUsize, Ordering};

/// Cheap, lock-free counters for a single `LocalCache`/`CachingMap` instance.
///
/// Each counter is an independent `AtomicUsize` rather than a struct behind
/// a lock, so hot paths (`get`, `insert`, `evict`) never contend on a shared
/// mutex just to bump a counter.
#[derive(Debug, Default)]
pub struct Metrics {
    pub hit: AtomicUsize,
    pub miss: AtomicUsize,
    pub insert: AtomicUsize,
    pub replace: AtomicUsize,
    pub remove: AtomicUsize,
    pub evict: AtomicUsize,
    pub expire: AtomicUsize,
    pub invalidation_hits: AtomicUsize,
    pub invalidation_misses: AtomicUsize,
}

impl Metrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            hit: self.hit.load(Ordering::Relaxed),
            miss: self.miss.load(Ordering::Relaxed),
            insert: self.insert.load(Ordering::Relaxed),
            replace: self.replace.load(Ordering::Relaxed),
            remove: self.remove.load(Ordering::Relaxed),
            evict: self.evict.load(Ordering::Relaxed),
            expire: self.expire.load(Ordering::Relaxed),
            invalidation_hits: self.invalidation_hits.load(Ordering::Relaxed),
            invalidation_misses: self.invalidation_misses.load(Ordering::Relaxed),
        }
    }

    /// Forward the snapshot to the process-wide `metrics` recorder, when the
    /// `metrics-export` feature is enabled and a recorder has been installed
    /// by the embedding application.
    #[cfg(feature = "metrics-export")]
    pub fn export(&self, cache_name: &str) {
        let snapshot = self.snapshot();
        metrics::counter!("coho_cache_hit", "cache" => cache_name.to_string()).absolute(snapshot.hit as u64);
        metrics::counter!("coho_cache_miss", "cache" => cache_name.to_string()).absolute(snapshot.miss as u64);
        metrics::counter!("coho_cache_evict", "cache" => cache_name.to_string()).absolute(snapshot.evict as u64);
        metrics::counter!("coho_cache_expire", "cache" => cache_name.to_string()).absolute(snapshot.expire as u64);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub hit: usize,
    pub miss: usize,
    pub insert: usize,
    pub replace: usize,
    pub remove: usize,
    pub evict: usize,
    pub expire: usize,
    pub invalidation_hits: usize,
    pub invalidation_misses: usize,
}
