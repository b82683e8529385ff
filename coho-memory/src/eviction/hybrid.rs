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

/// `score = f(touchCount) + g(age)`, both normalized to `[0, 10]` against
/// the batch's own max, and the highest score evicted (spec §4.5). Ties
/// broken by smallest `last_touch`, matching LRU's tiebreak.
#[derive(Debug, Clone, Copy, Default)]
pub struct HybridPolicy;

fn normalize(value: u64, max: u64) -> f64 {
    if max == 0 {
        0.0
    } else {
        (value as f64 / max as f64) * 10.0
    }
}

impl EvictionPolicy for HybridPolicy {
    fn select_victim(&self, candidates: &[Candidate]) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }
        let max_touch = candidates.iter().map(|c| c.touch_count).max().unwrap_or(0);
        let max_age = candidates.iter().map(|c| c.age).max().unwrap_or(0);

        candidates
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let score = normalize(c.touch_count, max_touch) + normalize(c.age, max_age);
                (i, score, c.last_touch)
            })
            .max_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.2.cmp(&a.2)))
            .map(|(i, _, _)| i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_highest_combined_score() {
        let candidates = [
            Candidate { touch_count: 10, last_touch: 100, age: 0 },
            Candidate { touch_count: 0, last_touch: 0, age: 100 },
            Candidate { touch_count: 5, last_touch: 50, age: 50 },
        ];
        // candidate 2 scores 5.0 + 5.0 = 10.0, highest.
        assert_eq!(HybridPolicy.select_victim(&candidates), Some(2));
    }
}
