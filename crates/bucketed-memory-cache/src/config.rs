use std::fmt;
use std::time::Duration;

const KIB: usize = 1024;
const MIB: usize = 1024 * KIB;

/// Largest asset admitted by default
pub const DEFAULT_MAX_CACHEABLE_ASSET_SIZE: usize = MIB;

/// Memory cache settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Total accounted bytes the cache may hold
    pub capacity_bytes: usize,
    /// Payloads longer than this are never admitted
    pub max_cacheable_asset_size: usize,
    /// Size classes for pooled entries, strictly ascending
    pub bucket_sizes: Vec<usize>,
    /// Encoded records up to this length are pooled, larger ones kept raw
    pub max_pooled_asset_size: usize,
    /// How often the owner should call `maintain`
    pub maintenance_interval: Duration,
    /// Free buffers idle for longer than this are released on `maintain`
    pub max_idle_buffer_age: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let max = DEFAULT_MAX_CACHEABLE_ASSET_SIZE;
        Self {
            capacity_bytes: 128 * MIB,
            max_cacheable_asset_size: max,
            bucket_sizes: vec![KIB, 4 * KIB, 16 * KIB, 64 * KIB, 256 * KIB, max / 2, max],
            max_pooled_asset_size: 64 * KIB,
            maintenance_interval: Duration::from_secs(5 * 60),
            max_idle_buffer_age: Duration::from_secs(10 * 60),
        }
    }
}

impl CacheConfig {
    /// Check that every admitted payload has a bucket to land in
    pub fn validate(&self) -> Result<(), InvalidCacheConfig> {
        if self.capacity_bytes == 0 {
            return Err(InvalidCacheConfig("capacity must be greater than zero".into()));
        }
        if self.bucket_sizes.is_empty() {
            return Err(InvalidCacheConfig("at least one bucket size is required".into()));
        }
        if self.bucket_sizes[0] == 0 {
            return Err(InvalidCacheConfig("bucket sizes must be greater than zero".into()));
        }
        if self.bucket_sizes.windows(2).any(|w| w[0] >= w[1]) {
            return Err(InvalidCacheConfig(format!(
                "bucket sizes must be strictly ascending: {:?}",
                self.bucket_sizes
            )));
        }
        let largest = self.bucket_sizes[self.bucket_sizes.len() - 1];
        if largest < self.max_cacheable_asset_size {
            return Err(InvalidCacheConfig(format!(
                "largest bucket {} is smaller than the max cacheable asset size {}",
                largest, self.max_cacheable_asset_size
            )));
        }
        Ok(())
    }

    /// Index of the smallest bucket that holds `len` bytes
    pub(crate) fn size_class(&self, len: usize) -> Option<usize> {
        self.bucket_sizes.iter().position(|&size| size >= len)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidCacheConfig(pub String);

impl fmt::Display for InvalidCacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid cache config: {}", self.0)
    }
}

impl std::error::Error for InvalidCacheConfig {}
