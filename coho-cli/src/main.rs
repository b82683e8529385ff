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

//! A small illustrative demo of [`coho::CachingMap`]: populates a front/back
//! pair, shows a front hit, simulates an independent write to the back, and
//! shows the resulting invalidation before printing the cache's stats.
//! There is no wire protocol or persistent server here -- the back is the
//! in-process fixture from `coho::testing`; this binary exists to be read
//! and run, not to be a production cache client.

use std::sync::Arc;

use clap::{Parser, ValueEnum};
use coho::CachingMap;
use coho::testing::InProcessNamedCache;
use coho_common::config::{CachingMapConfig, InvalidationStrategy, LocalCacheConfig};
use coho_memory::LocalCache;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Strategy {
    None,
    Present,
    All,
    Auto,
    Logical,
}

impl From<Strategy> for InvalidationStrategy {
    fn from(value: Strategy) -> Self {
        match value {
            Strategy::None => InvalidationStrategy::None,
            Strategy::Present => InvalidationStrategy::Present,
            Strategy::All => InvalidationStrategy::All,
            Strategy::Auto => InvalidationStrategy::Auto,
            Strategy::Logical => InvalidationStrategy::Logical,
        }
    }
}

/// Run a short scripted demonstration of a coho `CachingMap`.
#[derive(Debug, Parser)]
#[command(name = "coho", about = "demonstrates coho's two-tier CachingMap")]
struct Cli {
    /// Invalidation strategy to configure the CachingMap with.
    #[arg(long, value_enum, default_value = "auto")]
    strategy: Strategy,

    /// Number of keys to populate before demonstrating invalidation.
    #[arg(long, default_value_t = 8)]
    keys: i32,
}

fn main() -> coho_common::error::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    let front = Arc::new(LocalCache::<i32, i32>::new(LocalCacheConfig::default())?);
    let back = Arc::new(InProcessNamedCache::<i32, i32>::new());
    let config = CachingMapConfig { invalidation_strategy: cli.strategy.into(), ..Default::default() };
    let cache = CachingMap::new(front, back.clone(), config)?;

    for key in 0..cli.keys {
        cache.put(key, key * 10, None)?;
    }
    println!("populated {} keys under `{:?}` invalidation", cli.keys, cli.strategy);

    let sample = cli.keys / 2;
    println!("get({sample}) -> {:?} (front hit)", cache.get(&sample)?);

    // Simulate a write from another client that bypasses this CachingMap.
    back.seed(sample, 9999);
    println!("an independent client just wrote key {sample} directly to the back");
    println!("get({sample}) -> {:?} (front should have been invalidated)", cache.get(&sample)?);

    let stats = cache.stats();
    println!(
        "stats: invalidation_hits={} invalidation_misses={}",
        stats.invalidation_hits, stats.invalidation_misses
    );

    cache.release()?;
    Ok(())
}
