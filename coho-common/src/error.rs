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

use std::fmt;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds surfaced by the caching core.
///
/// These map one-to-one onto the error kinds enumerated by the core's
/// specification; they are not meant to enumerate *every* failure a
/// collaborator (loader, store, transport) may raise.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("concurrent modification: {0}")]
    ConcurrentModification(String),

    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("interrupted")]
    Interrupted,

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("no such element")]
    NoSuchElement,

    #[error("class cast error: {0}")]
    ClassCast(String),

    #[error("loader error: {0}")]
    Loader(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("store error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    pub fn illegal_argument(msg: impl fmt::Display) -> Self {
        Self::IllegalArgument(msg.to_string())
    }

    pub fn illegal_state(msg: impl fmt::Display) -> Self {
        Self::IllegalState(msg.to_string())
    }

    pub fn concurrent_modification(msg: impl fmt::Display) -> Self {
        Self::ConcurrentModification(msg.to_string())
    }

    pub fn unsupported(msg: impl fmt::Display) -> Self {
        Self::Unsupported(msg.to_string())
    }

    pub fn class_cast(msg: impl fmt::Display) -> Self {
        Self::ClassCast(msg.to_string())
    }

    /// Whether this error kind reflects a rolled-back transient state rather
    /// than an observable mutation (spec §5, Cancellation).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Interrupted)
    }
}
