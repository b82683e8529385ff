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

//! Per-entry metadata (spec §3): touch bookkeeping, cost, TTL.

use coho_common::context::Units;

/// `expiry_millis` follows the original's overload: `0` defers to the
/// cache's configured default, a negative value means "never expires", and
/// a positive value is this entry's own TTL in milliseconds.
#[derive(Debug, Clone)]
pub struct Entry<V> {
    pub value: V,
    pub touch_count: u64,
    pub last_touch: u64,
    pub units: Units,
    pub expiry_millis: i64,
}

impl<V> Entry<V> {
    pub fn new(value: V, now: u64, units: Units, expiry_millis: i64) -> Self {
        Self { value, touch_count: 1, last_touch: now, units, expiry_millis }
    }

    pub fn touch(&mut self, now: u64) {
        self.touch_count = self.touch_count.saturating_add(1);
        self.last_touch = now;
    }

    /// Resolves against the cache's default TTL and checks `now` against
    /// `last_touch + effective_ttl`.
    pub fn is_expired(&self, now: u64, default_expiry_millis: Option<u64>) -> bool {
        let ttl = if self.expiry_millis < 0 {
            return false;
        } else if self.expiry_millis == 0 {
            match default_expiry_millis {
                Some(ms) => ms,
                None => return false,
            }
        } else {
            self.expiry_millis as u64
        };
        now >= self.last_touch.saturating_add(ttl)
    }
}
