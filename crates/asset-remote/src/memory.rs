//! In-process write-once store with fault injection

use crate::error::{RemoteError, Result};
use crate::store::RemoteStore;
use asset_record::{AssetId, AssetMetadata, AssetRecord};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use tracing::debug;

/// A [`RemoteStore`] held entirely in memory.
///
/// Behaves like the real store (write-once, absence is not an error) and
/// can be told to fail, which is how the fallback paths are exercised.
#[derive(Default)]
pub struct MemoryRemoteStore {
    assets: RwLock<HashMap<AssetId, AssetRecord>>,
    unreachable: AtomicBool,
    failing_stores: AtomicU32,
    store_calls: AtomicU64,
    fetch_calls: AtomicU64,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with a connection error until reset
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Make the next `count` store calls time out
    pub fn fail_next_stores(&self, count: u32) {
        self.failing_stores.store(count, Ordering::SeqCst);
    }

    pub fn store_calls(&self) -> u64 {
        self.store_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> u64 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn contains(&self, id: AssetId) -> bool {
        self.assets.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.assets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.read().is_empty()
    }

    /// Read a stored record without going through the fault injection
    pub fn peek(&self, id: AssetId) -> Option<AssetRecord> {
        self.assets.read().get(&id).cloned()
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(RemoteError::Connection("store unreachable".to_string()));
        }
        Ok(())
    }

    fn take_store_failure(&self) -> bool {
        self.failing_stores
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn store(&self, record: &AssetRecord) -> Result<()> {
        self.store_calls.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        if self.take_store_failure() {
            return Err(RemoteError::Timeout);
        }

        let mut assets = self.assets.write();
        if assets.contains_key(&record.id) {
            return Err(RemoteError::AlreadyExists(record.id));
        }
        assets.insert(record.id, record.clone());
        debug!(id = %record.id, size = record.size(), "Stored asset in memory store");
        Ok(())
    }

    async fn fetch(&self, id: AssetId) -> Result<Option<AssetRecord>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        Ok(self.assets.read().get(&id).cloned())
    }

    async fn fetch_metadata(&self, id: AssetId) -> Result<Option<AssetMetadata>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        Ok(self.assets.read().get(&id).map(AssetRecord::metadata))
    }

    async fn delete(&self, id: AssetId) -> Result<bool> {
        self.check_reachable()?;
        Ok(self.assets.write().remove(&id).is_some())
    }
}
