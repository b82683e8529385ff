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

//! Pluggable eviction scoring (spec §4.5).
//!
//! Rather than the original's intrusive per-policy queue (a doubly-linked
//! handle list threaded through each entry), a policy here is a pure
//! function over a snapshot of candidate metadata: `LocalCache` takes a
//! snapshot under its eviction lock, asks the policy which candidate scores
//! worst, and evicts that one. Simpler to get right without a test run, at
//! the cost of an O(n) scan per eviction instead of O(log n) queue
//! maintenance -- acceptable because eviction only runs when `highUnits` is
//! actually exceeded, not on every access.

mod hybrid;
mod lfu;
mod lru;

pub use hybrid::HybridPolicy;
pub use lfu::LfuPolicy;
pub use lru::LruPolicy;

use coho_common::config::EvictionPolicy as EvictionPolicyKind;

/// A snapshot of one entry's touch bookkeeping, keyed by its position in the
/// candidate slice (not the cache key itself -- policies don't need to know
/// about keys at all).
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub touch_count: u64,
    pub last_touch: u64,
    /// `now - last_touch` at snapshot time, precomputed by the caller since
    /// the policy itself has no clock access.
    pub age: u64,
}

/// Scores a batch of candidates and names the one to evict.
pub trait EvictionPolicy: Send + Sync + std::fmt::Debug {
    /// Returns the index into `candidates` of the entry to evict, or `None`
    /// if `candidates` is empty.
    fn select_victim(&self, candidates: &[Candidate]) -> Option<usize>;
}

pub fn policy_for(kind: EvictionPolicyKind) -> Box<dyn EvictionPolicy> {
    match kind {
        EvictionPolicyKind::Lru => Box::new(LruPolicy),
        EvictionPolicyKind::Lfu => Box::new(LfuPolicy),
        EvictionPolicyKind::Hybrid => Box::new(HybridPolicy),
    }
}
