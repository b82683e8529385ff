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

//! The many-reader / one-writer coordinator used to serialize bulk
//! front-map operations (lock-all, eviction sweeps) against the per-key
//! operations that make up the common case.

mod cancel;
mod gate;

pub use cancel::CancelToken;
pub use gate::{Acquisition, GateStatus, ThreadGate};
