//! Bounded in-memory asset cache
//!
//! Entries are accounted by size class: a small asset is copied into a
//! buffer of the smallest bucket that fits it and is charged the full bucket
//! size, while larger assets are kept as whole records and charged their
//! exact length. Eviction is strict least-recently-used.

mod cache;
mod config;
mod pool;
mod types;

pub use cache::BucketedMemoryCache;
pub use config::{CacheConfig, InvalidCacheConfig};
pub use types::{CacheEntry, CachePayload, CacheStats, PooledBuffer};
