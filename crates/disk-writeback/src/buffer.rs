//! Write-back buffer: durable queue of assets awaiting remote delivery

use crate::config::WriteBackConfig;
use crate::entry::WriteBackEntry;
use crate::error::{Result, WriteBackError};
use asset_record::{AssetId, AssetRecord};
use asset_remote::{RemoteError, RemoteStore};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

const ASSET_EXTENSION: &str = "asset";
const TEMP_SUFFIX: &str = ".tmp";

/// Outcome of one write cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteCycleReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Delivered entries removed by the closing cleanup sweep
    pub purged: usize,
    /// Entries still waiting for delivery
    pub remaining: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriteBackStats {
    pub tracked: usize,
    pub pending: usize,
    pub enqueued: u64,
    pub delivered: u64,
    pub failed_attempts: u64,
    pub cleaned: u64,
    pub repaired: u64,
    pub recovered: u64,
}

enum Delivery {
    Delivered,
    Failed,
    /// The entry disappeared before it could be attempted
    Gone,
}

/// Disk-backed queue of assets the remote store has not yet confirmed.
///
/// Every tracked asset has a `<simple-id>.asset` file that was fully
/// written and synced before the asset was registered. Files are replaced
/// atomically through a `.tmp` sibling and a rename.
pub struct WriteBackBuffer {
    config: WriteBackConfig,
    index: Mutex<HashMap<AssetId, WriteBackEntry>>,
    /// Held for the duration of a write cycle
    cycle_lock: tokio::sync::Mutex<()>,
    /// Ids with an enqueue in progress
    writing: Mutex<HashSet<AssetId>>,
    /// Ids with a delivery attempt in flight
    delivering: Mutex<HashSet<AssetId>>,
    /// Signalled whenever a delivery attempt settles
    settled: Notify,
    enqueued: AtomicU64,
    delivered: AtomicU64,
    failed_attempts: AtomicU64,
    cleaned: AtomicU64,
    repaired: AtomicU64,
    recovered: AtomicU64,
}

impl WriteBackBuffer {
    /// Open the buffer, creating the directory and recovering queued files
    pub async fn open(config: WriteBackConfig) -> Result<Self> {
        fs::create_dir_all(&config.dir).await?;

        let buffer = Self {
            config,
            index: Mutex::new(HashMap::new()),
            cycle_lock: tokio::sync::Mutex::new(()),
            writing: Mutex::new(HashSet::new()),
            delivering: Mutex::new(HashSet::new()),
            settled: Notify::new(),
            enqueued: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            failed_attempts: AtomicU64::new(0),
            cleaned: AtomicU64::new(0),
            repaired: AtomicU64::new(0),
            recovered: AtomicU64::new(0),
        };
        buffer.recover().await?;
        Ok(buffer)
    }

    pub fn config(&self) -> &WriteBackConfig {
        &self.config
    }

    pub fn dir(&self) -> &Path {
        &self.config.dir
    }

    /// Rebuild the index from the files left in the directory
    async fn recover(&self) -> Result<()> {
        let mut recovered = Vec::new();
        let mut dir = fs::read_dir(&self.config.dir).await?;

        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            if name.ends_with(TEMP_SUFFIX) {
                debug!(path = ?path, "Removing interrupted write-back file");
                remove_file_if_exists(&path).await?;
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(ASSET_EXTENSION) {
                continue;
            }

            let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<AssetId>().ok())
            else {
                warn!(path = ?path, "Skipping write-back file with unrecognised name");
                continue;
            };

            let metadata = item.metadata().await?;
            if metadata.len() == 0 {
                warn!(id = %id, "Removing empty write-back file");
                remove_file_if_exists(&path).await?;
                self.repaired.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            let created_at = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            recovered.push(WriteBackEntry::recovered(id, created_at));
        }

        let count = recovered.len();
        {
            let mut index = self.index.lock();
            for entry in recovered {
                index.insert(entry.id, entry);
            }
        }
        self.recovered.fetch_add(count as u64, Ordering::Relaxed);

        if count > 0 {
            info!(count, dir = ?self.config.dir, "Recovered queued write-back assets");
        }
        Ok(())
    }

    /// Durably queue an asset for delivery.
    ///
    /// Returns only after the file is synced to disk. Fails with
    /// [`WriteBackError::AlreadyQueued`] when the asset already has a
    /// non-empty file or another enqueue of the same id is in progress.
    pub async fn enqueue(&self, record: &AssetRecord) -> Result<()> {
        let id = record.id;
        let Some(_claim) = Claim::new(&self.writing, id, None) else {
            return Err(WriteBackError::AlreadyQueued(id));
        };
        let path = self.path_for(id);

        if self.contains(id) {
            if file_len(&path).await? > 0 {
                return Err(WriteBackError::AlreadyQueued(id));
            }
            warn!(id = %id, "Rewriting missing or empty write-back file");
            self.index.lock().remove(&id);
            self.repaired.fetch_add(1, Ordering::Relaxed);
        }

        let bytes = asset_record::encode(record)?;
        self.write_durably(&path, &bytes).await?;

        {
            let mut index = self.index.lock();
            if index.contains_key(&id) {
                return Err(WriteBackError::AlreadyQueued(id));
            }
            index.insert(id, WriteBackEntry::queued(record.clone()));
        }
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        debug!(id = %id, size = bytes.len(), "Queued asset for write-back");
        Ok(())
    }

    /// Read a tracked asset, from memory when loaded and from disk otherwise.
    ///
    /// A tracked asset whose file went missing or empty is untracked and
    /// reported as absent.
    pub async fn get(&self, id: AssetId) -> Result<Option<AssetRecord>> {
        let payload = match self.index.lock().get(&id) {
            None => return Ok(None),
            Some(entry) => entry.payload.clone(),
        };
        if let Some(record) = payload {
            return Ok(Some(record));
        }

        let path = self.path_for(id);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        if bytes.is_empty() {
            warn!(id = %id, "Write-back file missing or empty, untracking asset");
            self.index.lock().remove(&id);
            remove_file_if_exists(&path).await?;
            self.repaired.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }

        Ok(Some(asset_record::decode(&bytes)?))
    }

    /// Record that the remote store holds the asset.
    ///
    /// Returns whether the asset was tracked.
    pub async fn mark_delivered(&self, id: AssetId) -> Result<bool> {
        let aggressive = self.config.aggressive_cleanup;
        let tracked = {
            let mut index = self.index.lock();
            if aggressive {
                index.remove(&id).is_some()
            } else if let Some(entry) = index.get_mut(&id) {
                if entry.delivered_at.is_none() {
                    entry.delivered_at = Some(Utc::now());
                }
                entry.payload = None;
                true
            } else {
                false
            }
        };

        if tracked {
            self.delivered.fetch_add(1, Ordering::Relaxed);
            if aggressive {
                remove_file_if_exists(&self.path_for(id)).await?;
                self.cleaned.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(tracked)
    }

    /// Attempt delivery of every queued asset, then sweep delivered ones.
    ///
    /// Only one cycle runs at a time. At most `workers` attempts are in
    /// flight and each is bounded by `attempt_timeout`. An asset the remote
    /// store already holds counts as delivered.
    pub async fn run_write_cycle(&self, remote: &dyn RemoteStore) -> WriteCycleReport {
        let _cycle = self.cycle_lock.lock().await;

        let queued: Vec<AssetId> = self
            .index
            .lock()
            .values()
            .filter(|entry| !entry.is_delivered())
            .map(|entry| entry.id)
            .collect();

        let mut report = WriteCycleReport::default();
        let outcomes: Vec<Delivery> = stream::iter(queued)
            .map(|id| self.deliver(remote, id))
            .buffer_unordered(self.config.workers.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                Delivery::Delivered => {
                    report.attempted += 1;
                    report.delivered += 1;
                }
                Delivery::Failed => {
                    report.attempted += 1;
                    report.failed += 1;
                }
                Delivery::Gone => {}
            }
        }

        report.purged = match self.cleanup().await {
            Ok(purged) => purged,
            Err(e) => {
                warn!(error = %e, "Write-back cleanup failed");
                0
            }
        };
        report.remaining = self.pending_count();

        if report.delivered > 0 {
            info!(
                delivered = report.delivered,
                remaining = report.remaining,
                "Delivered queued assets"
            );
        }
        if report.failed > 0 {
            warn!(
                failed = report.failed,
                remaining = report.remaining,
                "Write-back delivery attempts failed"
            );
        }
        report
    }

    async fn deliver(&self, remote: &dyn RemoteStore, id: AssetId) -> Delivery {
        // Claimed before the entry is loaded so a purge either sees the
        // claim or has already untracked the entry
        let Some(_claim) = Claim::new(&self.delivering, id, Some(&self.settled)) else {
            return Delivery::Gone;
        };
        let record = match self.get(id).await {
            Ok(Some(record)) => record,
            Ok(None) => return Delivery::Gone,
            Err(e) => {
                warn!(id = %id, error = %e, "Could not load queued asset");
                self.record_attempt(id);
                return Delivery::Failed;
            }
        };

        let result = tokio::time::timeout(self.config.attempt_timeout, remote.store(&record)).await;
        self.record_attempt(id);

        let error = match result {
            Ok(Ok(())) => None,
            Ok(Err(RemoteError::AlreadyExists(_))) => {
                debug!(id = %id, "Queued asset already present remotely");
                None
            }
            Ok(Err(e)) => Some(e),
            Err(_) => Some(RemoteError::Timeout),
        };

        match error {
            None => match self.mark_delivered(id).await {
                Ok(_) => Delivery::Delivered,
                Err(e) => {
                    warn!(id = %id, error = %e, "Could not remove delivered write-back file");
                    Delivery::Delivered
                }
            },
            Some(e) => {
                debug!(id = %id, error = %e, "Write-back delivery failed");
                self.failed_attempts.fetch_add(1, Ordering::Relaxed);
                Delivery::Failed
            }
        }
    }

    fn record_attempt(&self, id: AssetId) {
        if let Some(entry) = self.index.lock().get_mut(&id) {
            entry.attempts += 1;
            entry.last_attempt_at = Some(Utc::now());
        }
    }

    /// Delete delivered assets whose retention has elapsed.
    /// Returns the number removed.
    pub async fn cleanup(&self) -> Result<usize> {
        self.cleanup_at(Utc::now()).await
    }

    pub async fn cleanup_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let aggressive = self.config.aggressive_cleanup;
        let retention = self.config.retention;
        let expired: Vec<AssetId> = {
            let mut index = self.index.lock();
            let expired: Vec<AssetId> = index
                .values()
                .filter(|entry| {
                    entry.is_delivered() && (aggressive || entry.retention_elapsed(now, retention))
                })
                .map(|entry| entry.id)
                .collect();
            for id in &expired {
                index.remove(id);
            }
            expired
        };

        for id in &expired {
            remove_file_if_exists(&self.path_for(*id)).await?;
        }
        if !expired.is_empty() {
            self.cleaned.fetch_add(expired.len() as u64, Ordering::Relaxed);
            debug!(count = expired.len(), "Cleaned up delivered write-back files");
        }
        Ok(expired.len())
    }

    /// Drop an asset and its file whatever its state.
    ///
    /// Waits for an in-flight delivery attempt of the asset to settle, so
    /// once this returns no attempt for it can still reach the remote
    /// store. Returns whether anything existed.
    pub async fn purge(&self, id: AssetId) -> Result<bool> {
        let tracked = self.index.lock().remove(&id).is_some();
        let removed = remove_file_if_exists(&self.path_for(id)).await?;
        self.wait_for_delivery(id).await;
        Ok(tracked || removed)
    }

    /// Whether a delivery attempt for the asset is in flight
    pub fn is_delivering(&self, id: AssetId) -> bool {
        self.delivering.lock().contains(&id)
    }

    async fn wait_for_delivery(&self, id: AssetId) {
        loop {
            let settled = self.settled.notified();
            tokio::pin!(settled);
            settled.as_mut().enable();
            if !self.is_delivering(id) {
                return;
            }
            debug!(id = %id, "Waiting for in-flight delivery to settle");
            settled.await;
        }
    }

    pub fn contains(&self, id: AssetId) -> bool {
        self.index.lock().contains_key(&id)
    }

    /// Whether the asset is tracked and not yet delivered, or is being
    /// enqueued right now
    pub fn is_pending(&self, id: AssetId) -> bool {
        let queued = self
            .index
            .lock()
            .get(&id)
            .map(|entry| !entry.is_delivered())
            .unwrap_or(false);
        queued || self.writing.lock().contains(&id)
    }

    pub fn get_entry(&self, id: AssetId) -> Option<WriteBackEntry> {
        self.index.lock().get(&id).cloned()
    }

    /// Entries not yet delivered
    pub fn pending_count(&self) -> usize {
        self.index
            .lock()
            .values()
            .filter(|entry| !entry.is_delivered())
            .count()
    }

    /// All tracked entries, delivered ones awaiting cleanup included
    pub fn len(&self) -> usize {
        self.index.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.lock().is_empty()
    }

    pub fn stats(&self) -> WriteBackStats {
        let (tracked, pending) = {
            let index = self.index.lock();
            let pending = index.values().filter(|e| !e.is_delivered()).count();
            (index.len(), pending)
        };
        WriteBackStats {
            tracked,
            pending,
            enqueued: self.enqueued.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
            cleaned: self.cleaned.load(Ordering::Relaxed),
            repaired: self.repaired.load(Ordering::Relaxed),
            recovered: self.recovered.load(Ordering::Relaxed),
        }
    }

    pub fn path_for(&self, id: AssetId) -> PathBuf {
        self.config
            .dir
            .join(format!("{}.{}", id.simple(), ASSET_EXTENSION))
    }

    /// Write through a temp file, sync it, rename it into place and sync
    /// the directory
    async fn write_durably(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(TEMP_SUFFIX);
        let tmp = PathBuf::from(tmp);

        let written = async {
            let mut file = fs::File::create(&tmp).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&tmp, path).await?;
            sync_dir(&self.config.dir).await
        }
        .await;

        if let Err(e) = written {
            warn!(path = ?path, error = %e, "Write-back file write failed");
            let _ = remove_file_if_exists(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

/// Membership of an id in a claim set, released on drop
struct Claim<'a> {
    set: &'a Mutex<HashSet<AssetId>>,
    released: Option<&'a Notify>,
    id: AssetId,
}

impl<'a> Claim<'a> {
    fn new(
        set: &'a Mutex<HashSet<AssetId>>,
        id: AssetId,
        released: Option<&'a Notify>,
    ) -> Option<Self> {
        set.lock().insert(id).then_some(Self { set, released, id })
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.id);
        if let Some(released) = self.released {
            released.notify_waiters();
        }
    }
}

async fn file_len(path: &Path) -> std::io::Result<u64> {
    match fs::metadata(path).await {
        Ok(metadata) => Ok(metadata.len()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e),
    }
}

async fn remove_file_if_exists(path: &Path) -> std::io::Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
async fn sync_dir(dir: &Path) -> std::io::Result<()> {
    fs::File::open(dir).await?.sync_all().await
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use asset_remote::MemoryRemoteStore;
    use std::time::Duration;
    use tempfile::TempDir;

    fn record(len: usize) -> AssetRecord {
        AssetRecord::new(AssetId::random(), 1, vec![0xABu8; len]).with_name("queued")
    }

    async fn open(dir: &TempDir) -> WriteBackBuffer {
        WriteBackBuffer::open(WriteBackConfig::new(dir.path()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_enqueue_writes_file() {
        let dir = TempDir::new().unwrap();
        let buffer = open(&dir).await;
        let record = record(64);

        buffer.enqueue(&record).await.unwrap();

        let path = dir.path().join(format!("{}.asset", record.id.simple()));
        assert!(path.exists());
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
        assert!(!dir
            .path()
            .join(format!("{}.asset.tmp", record.id.simple()))
            .exists());
        assert_eq!(buffer.pending_count(), 1);
        assert_eq!(buffer.get(record.id).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_enqueue_twice_is_already_queued() {
        let dir = TempDir::new().unwrap();
        let buffer = open(&dir).await;
        let record = record(8);

        buffer.enqueue(&record).await.unwrap();
        let err = buffer.enqueue(&record).await.unwrap_err();
        assert!(matches!(err, WriteBackError::AlreadyQueued(id) if id == record.id));
        assert_eq!(buffer.len(), 1);
    }

    #[tokio::test]
    async fn test_recovery_after_restart() {
        let dir = TempDir::new().unwrap();
        let records: Vec<_> = (0..3).map(|i| record(10 + i)).collect();
        {
            let buffer = open(&dir).await;
            for record in &records {
                buffer.enqueue(record).await.unwrap();
            }
        }

        let buffer = open(&dir).await;
        assert_eq!(buffer.pending_count(), 3);
        assert_eq!(buffer.stats().recovered, 3);
        for record in &records {
            let entry = buffer.get_entry(record.id).unwrap();
            assert!(entry.payload.is_none());
            assert!(!entry.is_delivered());
            assert_eq!(buffer.get(record.id).await.unwrap().as_ref(), Some(record));
        }

        let remote = MemoryRemoteStore::new();
        let report = buffer.run_write_cycle(&remote).await;
        assert_eq!(report.delivered, 3);
        assert_eq!(report.remaining, 0);
        for record in &records {
            assert_eq!(remote.peek(record.id).as_ref(), Some(record));
        }
    }

    #[tokio::test]
    async fn test_recovery_repairs_empty_and_temp_files() {
        let dir = TempDir::new().unwrap();
        let empty = AssetId::random();
        let partial = AssetId::random();
        std::fs::write(dir.path().join(format!("{}.asset", empty.simple())), b"").unwrap();
        std::fs::write(
            dir.path().join(format!("{}.asset.tmp", partial.simple())),
            b"partial",
        )
        .unwrap();
        std::fs::write(dir.path().join("not-an-id.asset"), b"junk").unwrap();

        let buffer = open(&dir).await;

        assert!(buffer.is_empty());
        assert!(!dir.path().join(format!("{}.asset", empty.simple())).exists());
        assert!(!dir
            .path()
            .join(format!("{}.asset.tmp", partial.simple()))
            .exists());
        assert!(dir.path().join("not-an-id.asset").exists());
        assert_eq!(buffer.stats().repaired, 1);
    }

    #[tokio::test]
    async fn test_get_repairs_missing_file() {
        let dir = TempDir::new().unwrap();
        let record = record(16);
        {
            let buffer = open(&dir).await;
            buffer.enqueue(&record).await.unwrap();
        }
        let buffer = open(&dir).await;
        std::fs::remove_file(buffer.path_for(record.id)).unwrap();

        assert_eq!(buffer.get(record.id).await.unwrap(), None);
        assert!(!buffer.contains(record.id));
    }

    #[tokio::test]
    async fn test_enqueue_rewrites_empty_tracked_file() {
        let dir = TempDir::new().unwrap();
        let buffer = open(&dir).await;
        let record = record(16);
        buffer.enqueue(&record).await.unwrap();

        std::fs::write(buffer.path_for(record.id), b"").unwrap();
        buffer.enqueue(&record).await.unwrap();

        assert!(std::fs::metadata(buffer.path_for(record.id)).unwrap().len() > 0);
        assert_eq!(buffer.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_delivery_stays_queued() {
        let dir = TempDir::new().unwrap();
        let buffer = open(&dir).await;
        let record = record(32);
        buffer.enqueue(&record).await.unwrap();

        let remote = MemoryRemoteStore::new();
        remote.set_unreachable(true);
        let report = buffer.run_write_cycle(&remote).await;
        assert_eq!(report.attempted, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.remaining, 1);

        let entry = buffer.get_entry(record.id).unwrap();
        assert_eq!(entry.attempts, 1);
        assert!(entry.last_attempt_at.is_some());
        assert!(buffer.path_for(record.id).exists());

        remote.set_unreachable(false);
        let report = buffer.run_write_cycle(&remote).await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.remaining, 0);
        assert!(remote.contains(record.id));
    }

    #[tokio::test]
    async fn test_already_exists_counts_as_delivered() {
        let dir = TempDir::new().unwrap();
        let buffer = open(&dir).await;
        let record = record(32);
        buffer.enqueue(&record).await.unwrap();

        let remote = MemoryRemoteStore::new();
        remote.store(&record).await.unwrap();

        let report = buffer.run_write_cycle(&remote).await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn test_delivered_kept_for_retention() {
        let dir = TempDir::new().unwrap();
        let buffer = open(&dir).await;
        let record = record(32);
        buffer.enqueue(&record).await.unwrap();

        let remote = MemoryRemoteStore::new();
        let report = buffer.run_write_cycle(&remote).await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.purged, 0);

        // Still readable from disk inside the retention window
        assert!(buffer.contains(record.id));
        assert_eq!(buffer.pending_count(), 0);
        assert_eq!(buffer.get(record.id).await.unwrap(), Some(record.clone()));

        assert_eq!(buffer.cleanup().await.unwrap(), 0);
        let later = Utc::now() + chrono::Duration::seconds(61);
        assert_eq!(buffer.cleanup_at(later).await.unwrap(), 1);
        assert!(!buffer.contains(record.id));
        assert!(!buffer.path_for(record.id).exists());
    }

    #[tokio::test]
    async fn test_aggressive_cleanup_deletes_on_delivery() {
        let dir = TempDir::new().unwrap();
        let config = WriteBackConfig {
            aggressive_cleanup: true,
            ..WriteBackConfig::new(dir.path())
        };
        let buffer = WriteBackBuffer::open(config).await.unwrap();
        let record = record(32);
        buffer.enqueue(&record).await.unwrap();

        let remote = MemoryRemoteStore::new();
        let report = buffer.run_write_cycle(&remote).await;
        assert_eq!(report.delivered, 1);
        assert!(buffer.is_empty());
        assert!(!buffer.path_for(record.id).exists());
    }

    #[tokio::test]
    async fn test_attempt_timeout_leaves_entry_queued() {
        struct StalledStore;

        #[async_trait::async_trait]
        impl RemoteStore for StalledStore {
            async fn store(&self, _record: &AssetRecord) -> asset_remote::Result<()> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }
            async fn fetch(&self, _id: AssetId) -> asset_remote::Result<Option<AssetRecord>> {
                Ok(None)
            }
            async fn fetch_metadata(
                &self,
                _id: AssetId,
            ) -> asset_remote::Result<Option<asset_record::AssetMetadata>> {
                Ok(None)
            }
            async fn delete(&self, _id: AssetId) -> asset_remote::Result<bool> {
                Ok(false)
            }
        }

        let dir = TempDir::new().unwrap();
        let config = WriteBackConfig {
            attempt_timeout: Duration::from_millis(20),
            ..WriteBackConfig::new(dir.path())
        };
        let buffer = WriteBackBuffer::open(config).await.unwrap();
        buffer.enqueue(&record(8)).await.unwrap();

        let report = buffer.run_write_cycle(&StalledStore).await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.remaining, 1);
    }

    #[tokio::test]
    async fn test_purge_removes_queued_entry() {
        let dir = TempDir::new().unwrap();
        let buffer = open(&dir).await;
        let record = record(32);
        buffer.enqueue(&record).await.unwrap();

        assert!(buffer.purge(record.id).await.unwrap());
        assert!(!buffer.purge(record.id).await.unwrap());
        assert!(!buffer.path_for(record.id).exists());

        let remote = MemoryRemoteStore::new();
        let report = buffer.run_write_cycle(&remote).await;
        assert_eq!(report.attempted, 0);
        assert!(remote.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_enqueue_of_one_id() {
        let dir = TempDir::new().unwrap();
        let buffer = open(&dir).await;
        let record = record(4096);

        let (first, second) = tokio::join!(buffer.enqueue(&record), buffer.enqueue(&record));
        let results = [first, second];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(WriteBackError::AlreadyQueued(id)) if *id == record.id)));

        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.get(record.id).await.unwrap(), Some(record.clone()));
        assert!(!dir
            .path()
            .join(format!("{}.asset.tmp", record.id.simple()))
            .exists());
    }

    #[tokio::test]
    async fn test_is_pending() {
        let dir = TempDir::new().unwrap();
        let buffer = open(&dir).await;
        let record = record(16);
        assert!(!buffer.is_pending(record.id));

        buffer.enqueue(&record).await.unwrap();
        assert!(buffer.is_pending(record.id));

        buffer.mark_delivered(record.id).await.unwrap();
        assert!(buffer.contains(record.id));
        assert!(!buffer.is_pending(record.id));
    }

    #[tokio::test]
    async fn test_purge_waits_for_in_flight_delivery() {
        struct SlowStore {
            inner: MemoryRemoteStore,
        }

        #[async_trait::async_trait]
        impl RemoteStore for SlowStore {
            async fn store(&self, record: &AssetRecord) -> asset_remote::Result<()> {
                tokio::time::sleep(Duration::from_millis(100)).await;
                self.inner.store(record).await
            }
            async fn fetch(&self, id: AssetId) -> asset_remote::Result<Option<AssetRecord>> {
                self.inner.fetch(id).await
            }
            async fn fetch_metadata(
                &self,
                id: AssetId,
            ) -> asset_remote::Result<Option<asset_record::AssetMetadata>> {
                self.inner.fetch_metadata(id).await
            }
            async fn delete(&self, id: AssetId) -> asset_remote::Result<bool> {
                self.inner.delete(id).await
            }
        }

        let dir = TempDir::new().unwrap();
        let buffer = open(&dir).await;
        let record = record(32);
        buffer.enqueue(&record).await.unwrap();
        let remote = SlowStore {
            inner: MemoryRemoteStore::new(),
        };

        let (report, landed_before_purge_returned) = tokio::join!(
            buffer.run_write_cycle(&remote),
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                assert!(buffer.is_delivering(record.id));
                assert!(buffer.purge(record.id).await.unwrap());
                remote.inner.contains(record.id)
            }
        );

        assert!(landed_before_purge_returned);
        assert!(!buffer.is_delivering(record.id));
        assert_eq!(report.attempted, 1);
        assert!(buffer.is_empty());
        assert!(!buffer.path_for(record.id).exists());
    }
}
