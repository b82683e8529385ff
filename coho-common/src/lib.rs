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

//! Ambient building blocks shared by every `coho` crate: the error type,
//! the `Key`/`Value` bounds, configuration structs, metrics counters and
//! the monotonic clock seam.

pub mod code;
pub mod concurrent;
pub mod config;
pub mod context;
pub mod error;
pub mod filter;
pub mod metrics;
pub mod time;

pub use context::{CacheContext, Units};
pub use error::{Error, Result};
