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

//! `CacheLoader` / `CacheStore` integration (spec §4.5): read-through on
//! miss, write-through on `put`. The core never writes behind.

use std::collections::HashMap;

use coho_common::code::{Key, Value};
use coho_common::error::{Error, Result};

pub trait CacheLoader<K: Key, V: Value>: Send + Sync {
    fn load(&self, key: &K) -> Result<Option<V>>;

    /// Bulk load; the default folds `load` over each key.
    fn load_all(&self, keys: &[K]) -> Result<HashMap<K, V>> {
        let mut out = HashMap::new();
        for key in keys {
            if let Some(value) = self.load(key)? {
                out.insert(key.clone(), value);
            }
        }
        Ok(out)
    }
}

/// A `CacheLoader` that can also enumerate every key it knows about,
/// enabling `loadAll` without an explicit key set (spec §4.5).
pub trait IterableCacheLoader<K: Key, V: Value>: CacheLoader<K, V> {
    fn keys(&self) -> Result<Vec<K>>;
}

pub trait CacheStore<K: Key, V: Value>: Send + Sync {
    fn store(&self, key: &K, value: &V) -> Result<()>;

    fn store_all(&self, entries: &HashMap<K, V>) -> Result<()> {
        for (key, value) in entries {
            self.store(key, value)?;
        }
        Ok(())
    }

    fn erase(&self, key: &K) -> Result<()>;

    fn erase_all(&self, keys: &[K]) -> Result<()> {
        for key in keys {
            self.erase(key)?;
        }
        Ok(())
    }
}

/// A `CacheStore` that rejects every write, for read-only backing stores
/// (spec §6: stores "may raise unsupported for read-only stores").
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOnlyStore;

impl<K: Key, V: Value> CacheStore<K, V> for ReadOnlyStore {
    fn store(&self, _key: &K, _value: &V) -> Result<()> {
        Err(Error::unsupported("store: cache store is read-only"))
    }

    fn erase(&self, _key: &K) -> Result<()> {
        Err(Error::unsupported("erase: cache store is read-only"))
    }
}
