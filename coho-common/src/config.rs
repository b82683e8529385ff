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

//! Configuration recognized by the core (spec §6).
//!
//! No file format or environment variable is parsed here -- that is an
//! explicit Non-goal. These are plain, validated structs a host
//! application builds however it likes (from a config file, from CLI
//! flags, from defaults) before handing them to `LocalCache` / `CachingMap`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvictionPolicy {
    Lru,
    Lfu,
    Hybrid,
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self::Lru
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvalidationStrategy {
    None,
    Present,
    All,
    Auto,
    Logical,
}

impl Default for InvalidationStrategy {
    fn default() -> Self {
        Self::Auto
    }
}

/// Sizing and eviction configuration for a `LocalCache`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalCacheConfig {
    /// Total cost budget across all entries. `0` means unbounded.
    pub high_units: usize,
    /// Target total cost after a prune pass. Defaults to `0.75 * high_units`.
    pub low_units: usize,
    pub eviction_policy: EvictionPolicy,
    /// Default per-entry TTL. `None` means entries never expire unless given
    /// an explicit TTL at `put` time.
    pub default_expiry: Option<Duration>,
    pub shards: usize,
    pub load_factor: f32,
    pub growth_rate: f32,
    pub initial_buckets: usize,
    pub locking_enforced: bool,
    /// Per-key control-map lock timeout used when `locking_enforced` is set.
    /// `None` means wait indefinitely.
    pub lock_wait: Option<Duration>,
}

impl Default for LocalCacheConfig {
    fn default() -> Self {
        Self {
            high_units: 0,
            low_units: 0,
            eviction_policy: EvictionPolicy::default(),
            default_expiry: None,
            shards: 1,
            load_factor: 0.75,
            growth_rate: 2.0,
            initial_buckets: 17,
            locking_enforced: false,
            lock_wait: None,
        }
    }
}

impl LocalCacheConfig {
    pub fn validate(&self) -> Result<()> {
        if self.load_factor <= 0.0 || self.load_factor >= 1.0 {
            return Err(Error::illegal_argument("load_factor must be in (0, 1)"));
        }
        if self.growth_rate <= 1.0 {
            return Err(Error::illegal_argument("growth_rate must be > 1.0"));
        }
        if self.initial_buckets == 0 {
            return Err(Error::illegal_argument("initial_buckets must be > 0"));
        }
        if self.high_units > 0 && self.low_units > self.high_units {
            return Err(Error::illegal_argument("low_units must be <= high_units"));
        }
        if self.shards == 0 {
            return Err(Error::illegal_argument("shards must be > 0"));
        }
        Ok(())
    }

    /// `low_units`, resolved to `0.75 * high_units` when left at the
    /// zero-valued default and `high_units` is bounded.
    pub fn effective_low_units(&self) -> usize {
        if self.low_units > 0 || self.high_units == 0 {
            self.low_units
        } else {
            (self.high_units as f64 * 0.75) as usize
        }
    }
}

/// Configuration consumed by `CachingMap`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachingMapConfig {
    pub invalidation_strategy: InvalidationStrategy,
    /// Per-key control-map lock timeout. `None` means wait indefinitely.
    pub control_wait: Option<Duration>,
    /// Registration-cost threshold past which `auto` promotes `present` to
    /// `all`.
    pub auto_promote_threshold: usize,
}

impl Default for CachingMapConfig {
    fn default() -> Self {
        Self {
            invalidation_strategy: InvalidationStrategy::default(),
            control_wait: None,
            auto_promote_threshold: 1000,
        }
    }
}

impl CachingMapConfig {
    pub fn validate(&self) -> Result<()> {
        Ok(())
    }
}
