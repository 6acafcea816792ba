//! Cache types

use asset_record::{AssetId, AssetRecord};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bucket-sized buffer holding the first `len` bytes of an asset
pub struct PooledBuffer {
    pub(crate) class: usize,
    pub(crate) bytes: Box<[u8]>,
    pub(crate) len: usize,
}

impl PooledBuffer {
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn bucket_size(&self) -> usize {
        self.bytes.len()
    }
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("bucket_size", &self.bytes.len())
            .field("len", &self.len)
            .finish()
    }
}

#[derive(Debug)]
pub enum CachePayload {
    /// Raw bytes copied into a pooled buffer
    Pooled(PooledBuffer),
    /// A whole record, charged its exact data length
    Raw(AssetRecord),
}

/// A cached asset
#[derive(Debug)]
pub struct CacheEntry {
    pub id: AssetId,
    pub accounted_size: usize,
    pub payload: CachePayload,
}

impl CacheEntry {
    /// Bytes as they were stored: the raw buffer for pooled entries,
    /// the asset data for raw ones
    pub fn bytes(&self) -> &[u8] {
        match &self.payload {
            CachePayload::Pooled(buffer) => buffer.as_slice(),
            CachePayload::Raw(record) => &record.data,
        }
    }

    pub fn is_pooled(&self) -> bool {
        matches!(self.payload, CachePayload::Pooled(_))
    }
}

/// Statistics about the cache
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub pooled_buffers: usize,
    pub pooled_bytes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_default() {
        let stats = CacheStats::default();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.total_size, 0);
        assert_eq!(stats.evictions, 0);
    }

    #[test]
    fn test_cache_stats_serialization() {
        let stats = CacheStats {
            entries: 3,
            total_size: 12288,
            capacity: 65536,
            ..Default::default()
        };
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"total_size\":12288"));
    }

    #[test]
    fn test_pooled_entry_bytes_are_trimmed() {
        let mut bytes = vec![0u8; 16].into_boxed_slice();
        bytes[..3].copy_from_slice(b"abc");
        let entry = CacheEntry {
            id: AssetId::random(),
            accounted_size: 16,
            payload: CachePayload::Pooled(PooledBuffer {
                class: 0,
                bytes,
                len: 3,
            }),
        };
        assert!(entry.is_pooled());
        assert_eq!(entry.bytes(), b"abc");
    }

    #[test]
    fn test_raw_entry_bytes_are_record_data() {
        let record = AssetRecord::new(AssetId::random(), 0, vec![5u8; 10]);
        let entry = CacheEntry {
            id: record.id,
            accounted_size: 10,
            payload: CachePayload::Raw(record),
        };
        assert!(!entry.is_pooled());
        assert_eq!(entry.bytes(), &[5u8; 10][..]);
    }
}
