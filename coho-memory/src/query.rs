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

//! `LocalQueryCache` / `LocalInvocableCache` (spec §4.5): filtered
//! key/entry scans with stable `LimitFilter` paging, per-entry processor
//! invocation, and read-only aggregation.
//!
//! Index acceleration (`addIndex`) is out of scope here: every scan is a
//! full pass over a snapshot, matched against the filter in place. That
//! trades query latency on large caches for not having to reimplement the
//! original's index machinery un-compiled and untested.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use ahash::AHasher;
use coho_common::code::{Key, Value};
use coho_common::error::Result;
use coho_common::filter::Filter;

use crate::local::LocalCache;

fn stable_hash<K: Hash>(key: &K) -> u64 {
    let mut hasher = AHasher::default();
    key.hash(&mut hasher);
    hasher.finish()
}

/// Pages an underlying filter's matches in a stable order (by key hash,
/// since arbitrary `K` is not required to implement `Ord`).
pub struct LimitFilter<K, V> {
    pub inner: Arc<dyn Filter<(K, V)>>,
    pub page_size: usize,
    pub page: usize,
}

pub trait EntryProcessor<K: Key, V: Value>: Send + Sync {
    type Output: Send;

    /// Mutates (or reads) the entry's value in place; returning `*value =
    /// None` removes the entry.
    fn process(&self, key: &K, value: &mut Option<V>) -> Result<Self::Output>;
}

pub trait EntryAggregator<K: Key, V: Value>: Send + Sync {
    type Partial: Send;
    type Output;

    fn aggregate(&self, entries: &[(K, V)]) -> Self::Partial;

    /// Combines the partial results of (potentially parallel) aggregation
    /// batches (spec §4.5: "parallel aggregators expose
    /// `getParallelAggregator()` + `aggregateResults(partials)`").
    fn aggregate_results(&self, partials: Vec<Self::Partial>) -> Self::Output;
}

impl<K: Key, V: Value> LocalCache<K, V> {
    pub fn key_set(&self, filter: &dyn Filter<(K, V)>) -> Vec<K> {
        self.snapshot_pairs().into_iter().filter(|pair| filter.evaluate(pair)).map(|(k, _)| k).collect()
    }

    pub fn entry_set(&self, filter: &dyn Filter<(K, V)>) -> Vec<(K, V)> {
        self.snapshot_pairs().into_iter().filter(|pair| filter.evaluate(pair)).collect()
    }

    /// `entry_set`, but paged per `LimitFilter`'s stable key-hash ordering.
    pub fn entry_set_paged(&self, limit: &LimitFilter<K, V>) -> Vec<(K, V)> {
        let mut matched: Vec<(K, V)> = self.snapshot_pairs().into_iter().filter(|pair| limit.inner.evaluate(pair)).collect();
        matched.sort_by_key(|(k, _)| stable_hash(k));
        let start = limit.page.saturating_mul(limit.page_size);
        matched.into_iter().skip(start).take(limit.page_size).collect()
    }

    /// Atomically evaluates `processor` against the entry for `key`,
    /// applying whatever mutation it makes to the cache.
    pub fn invoke<P: EntryProcessor<K, V>>(&self, key: &K, processor: &P) -> Result<P::Output> {
        let mut value = self.get(key)?;
        let output = processor.process(key, &mut value)?;
        match value {
            Some(v) => {
                self.put(key.clone(), v, 0)?;
            }
            None => {
                self.remove(key)?;
            }
        }
        Ok(output)
    }

    pub fn invoke_all<P: EntryProcessor<K, V>>(&self, keys: &[K], processor: &P) -> Result<Vec<(K, P::Output)>> {
        keys.iter().map(|key| self.invoke(key, processor).map(|out| (key.clone(), out))).collect()
    }

    pub fn invoke_all_matching<P: EntryProcessor<K, V>>(&self, filter: &dyn Filter<(K, V)>, processor: &P) -> Result<Vec<(K, P::Output)>> {
        let keys = self.key_set(filter);
        self.invoke_all(&keys, processor)
    }

    pub fn aggregate<A: EntryAggregator<K, V>>(&self, keys: &[K], aggregator: &A) -> A::Output {
        let entries: Vec<(K, V)> = keys.iter().filter_map(|k| self.get(k).ok().flatten().map(|v| (k.clone(), v))).collect();
        let partial = aggregator.aggregate(&entries);
        aggregator.aggregate_results(vec![partial])
    }

    pub fn aggregate_matching<A: EntryAggregator<K, V>>(&self, filter: &dyn Filter<(K, V)>, aggregator: &A) -> A::Output {
        let entries = self.entry_set(filter);
        let partial = aggregator.aggregate(&entries);
        aggregator.aggregate_results(vec![partial])
    }
}
