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

use super::{Candidate, EvictionPolicy};

/// Evicts the entry with the smallest `touch_count`, ties broken by
/// smallest `last_touch` (spec §4.5).
#[derive(Debug, Clone, Copy, Default)]
pub struct LfuPolicy;

impl EvictionPolicy for LfuPolicy {
    fn select_victim(&self, candidates: &[Candidate]) -> Option<usize> {
        candidates.iter().enumerate().min_by_key(|(_, c)| (c.touch_count, c.last_touch)).map(|(i, _)| i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_frequently_touched() {
        let candidates = [
            Candidate { touch_count: 5, last_touch: 30 },
            Candidate { touch_count: 1, last_touch: 10 },
            Candidate { touch_count: 1, last_touch: 5 },
        ];
        // tie on touch_count=1 broken by smaller last_touch.
        assert_eq!(LfuPolicy.select_victim(&candidates), Some(2));
    }
}
