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

/// Per-entry priority hint threaded through inserts.
///
/// Consumed by the hybrid eviction score (`g(age)` term weighting) and
/// otherwise inert; `Default` reproduces the base spec's scoring exactly.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheContext {
    #[default]
    Default,
    LowPriority,
    HighPriority,
}

/// A unit of cost, distinct from a bare `usize` so `highUnits`/`lowUnits`
/// cannot be accidentally confused with a byte count or entry count at an
/// API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Units(pub usize);

impl std::ops::Add for Units {
    type Output = Units;
    fn add(self, rhs: Self) -> Self::Output {
        Units(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Units {
    type Output = Units;
    fn sub(self, rhs: Self) -> Self::Output {
        Units(self.0.saturating_sub(rhs.0))
    }
}

impl From<usize> for Units {
    fn from(value: usize) -> Self {
        Units(value)
    }
}
