//! Size-bounded asset cache with strict LRU eviction

use crate::config::{CacheConfig, InvalidCacheConfig};
use crate::pool::BufferPool;
use crate::types::{CacheEntry, CachePayload, CacheStats, PooledBuffer};
use asset_record::{AssetId, AssetRecord};
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tracing::{debug, trace};

struct Slot {
    entry: CacheEntry,
    /// Last use, as a value of the cache's use counter
    tick: u64,
}

/// In-memory asset cache.
///
/// `size()` is always the sum of the accounted sizes of the held entries
/// and never exceeds the configured capacity. Recency comes from a
/// monotonic use counter, so every entry has a distinct last use and the
/// eviction order is fully determined by the sequence of calls.
pub struct BucketedMemoryCache {
    config: CacheConfig,
    entries: HashMap<AssetId, Slot>,
    /// Entries by last use, oldest first
    recency: BTreeMap<u64, AssetId>,
    next_tick: u64,
    size: usize,
    pool: BufferPool,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl BucketedMemoryCache {
    pub fn new(config: CacheConfig) -> Result<Self, InvalidCacheConfig> {
        config.validate()?;
        let pool = BufferPool::new(config.bucket_sizes.clone(), config.capacity_bytes);
        Ok(Self {
            config,
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            next_tick: 0,
            size: 0,
            pool,
            hits: 0,
            misses: 0,
            evictions: 0,
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Cache raw bytes in a pooled buffer, charged its bucket size.
    ///
    /// Oversize payloads are ignored.
    pub fn put(&mut self, id: AssetId, data: &[u8]) {
        if data.len() > self.config.max_cacheable_asset_size {
            trace!(id = %id, size = data.len(), "Asset too large to cache");
            return;
        }
        let Some(class) = self.config.size_class(data.len()) else {
            return;
        };
        let accounted_size = self.config.bucket_sizes[class];
        if accounted_size > self.config.capacity_bytes {
            return;
        }

        self.remove(id);
        self.make_room(accounted_size);

        let mut bytes = self.pool.acquire(class);
        bytes[..data.len()].copy_from_slice(data);
        self.insert(CacheEntry {
            id,
            accounted_size,
            payload: CachePayload::Pooled(PooledBuffer {
                class,
                bytes,
                len: data.len(),
            }),
        });
    }

    /// Cache a whole record, charged its exact data length.
    ///
    /// Oversize records are ignored.
    pub fn put_raw(&mut self, id: AssetId, record: AssetRecord) {
        let accounted_size = record.data.len();
        if accounted_size > self.config.max_cacheable_asset_size
            || accounted_size > self.config.capacity_bytes
        {
            trace!(id = %id, size = accounted_size, "Asset too large to cache");
            return;
        }

        self.remove(id);
        self.make_room(accounted_size);
        self.insert(CacheEntry {
            id,
            accounted_size,
            payload: CachePayload::Raw(record),
        });
    }

    /// Look up an entry and mark it most recently used
    pub fn try_get(&mut self, id: AssetId) -> Option<&CacheEntry> {
        let tick = self.next_tick;
        match self.entries.get_mut(&id) {
            Some(slot) => {
                self.recency.remove(&slot.tick);
                self.recency.insert(tick, id);
                slot.tick = tick;
                self.next_tick += 1;
                self.hits += 1;
                Some(&slot.entry)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Whether an entry is cached. Does not count as a use.
    pub fn has(&self, id: AssetId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Drop an entry, returning whether it was cached
    pub fn remove(&mut self, id: AssetId) -> bool {
        match self.entries.remove(&id) {
            Some(slot) => {
                self.recency.remove(&slot.tick);
                self.release(slot.entry);
                true
            }
            None => false,
        }
    }

    pub fn item_count(&self) -> usize {
        self.entries.len()
    }

    /// Sum of the accounted sizes of all entries
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity_bytes
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            total_size: self.size,
            capacity: self.config.capacity_bytes,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            pooled_buffers: self.pool.buffer_count(),
            pooled_bytes: self.pool.retained_bytes(),
        }
    }

    /// Release free buffers idle for longer than `max_idle_buffer_age`.
    /// Returns the number of buffers released.
    pub fn maintain(&mut self) -> usize {
        self.maintain_at(Instant::now())
    }

    pub fn maintain_at(&mut self, now: Instant) -> usize {
        let released = self.pool.release_idle(now, self.config.max_idle_buffer_age);
        if released > 0 {
            debug!(
                released,
                pooled_bytes = self.pool.retained_bytes(),
                "Released idle cache buffers"
            );
        }
        released
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&mut self) {
        self.recency.clear();
        let slots: Vec<Slot> = self.entries.drain().map(|(_, slot)| slot).collect();
        for slot in slots {
            self.release(slot.entry);
        }
    }

    /// Evict least recently used entries until `required` bytes fit
    fn make_room(&mut self, required: usize) {
        while self.config.capacity_bytes - self.size < required {
            let Some((_, id)) = self.recency.pop_first() else {
                break;
            };
            if let Some(slot) = self.entries.remove(&id) {
                trace!(id = %id, size = slot.entry.accounted_size, "Evicted cache entry");
                self.release(slot.entry);
                self.evictions += 1;
            }
        }
    }

    fn insert(&mut self, entry: CacheEntry) {
        let tick = self.next_tick;
        self.next_tick += 1;
        self.size += entry.accounted_size;
        self.recency.insert(tick, entry.id);
        self.entries.insert(entry.id, Slot { entry, tick });
    }

    fn release(&mut self, entry: CacheEntry) {
        self.size -= entry.accounted_size;
        if let CachePayload::Pooled(buffer) = entry.payload {
            self.pool.release(buffer.class, buffer.bytes);
        }
    }
}
