//! Read/write path across the memory cache, write-back buffer and remote store

use crate::config::OrchestratorConfig;
use crate::error::{Result as ServiceResult, StoreError};
use crate::types::{OrchestratorStats, StoreOutcome};
use asset_record::{AssetId, AssetMetadata, AssetRecord};
use asset_remote::{RemoteError, RemoteStore};
use bucketed_memory_cache::{BucketedMemoryCache, CachePayload};
use disk_writeback::{WriteBackBuffer, WriteBackError, WriteBackScheduler, WriteCycleReport};
use moka::future::Cache;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Attempts per remote read before it is reported unavailable
const FETCH_ATTEMPTS: u32 = 2;

type Result<T> = std::result::Result<T, StoreError>;

#[derive(Default)]
struct Counters {
    gets: AtomicU64,
    cache_hits: AtomicU64,
    writeback_hits: AtomicU64,
    remote_fetches: AtomicU64,
    not_found: AtomicU64,
    puts: AtomicU64,
    stored: AtomicU64,
    queued: AtomicU64,
    already_exists: AtomicU64,
    errors: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

struct Background {
    scheduler: Option<WriteBackScheduler>,
    maintenance: Option<(CancellationToken, JoinHandle<()>)>,
}

impl Drop for Background {
    fn drop(&mut self) {
        if let Some((cancel, _)) = &self.maintenance {
            cancel.cancel();
        }
    }
}

/// An id with a store in progress, released on drop
struct StoreClaim<'a> {
    storing: &'a Mutex<HashSet<AssetId>>,
    id: AssetId,
}

impl<'a> StoreClaim<'a> {
    fn new(storing: &'a Mutex<HashSet<AssetId>>, id: AssetId) -> Option<Self> {
        storing.lock().insert(id).then_some(Self { storing, id })
    }
}

impl Drop for StoreClaim<'_> {
    fn drop(&mut self) {
        self.storing.lock().remove(&self.id);
    }
}

/// Stores and fetches assets through every tier.
///
/// A store reports success only once the remote store accepted the asset
/// or the write-back buffer has it on disk. The memory cache is filled only
/// after that point, so a refused store never shadows the stored asset.
///
/// Dropping the orchestrator cancels its background tasks; `shutdown`
/// additionally waits for them.
pub struct StoreOrchestrator {
    config: OrchestratorConfig,
    remote: Arc<dyn RemoteStore>,
    cache: Option<Arc<Mutex<BucketedMemoryCache>>>,
    writeback: Option<Arc<WriteBackBuffer>>,
    metadata: Cache<AssetId, AssetMetadata>,
    permits: Semaphore,
    simulate_timeout: AtomicBool,
    background: Mutex<Option<Background>>,
    storing: Mutex<HashSet<AssetId>>,
    counters: Counters,
}

impl StoreOrchestrator {
    /// Build the tiers. Opening the write-back buffer recovers anything a
    /// previous run left queued.
    pub async fn open(
        config: OrchestratorConfig,
        remote: Arc<dyn RemoteStore>,
    ) -> ServiceResult<Self> {
        let cache = match &config.cache {
            Some(cache_config) => Some(Arc::new(Mutex::new(BucketedMemoryCache::new(
                cache_config.clone(),
            )?))),
            None => None,
        };
        let writeback = match &config.writeback {
            Some(writeback_config) => Some(Arc::new(
                WriteBackBuffer::open(writeback_config.clone()).await?,
            )),
            None => None,
        };
        let metadata = Cache::builder()
            .max_capacity(config.metadata_cache_capacity)
            .time_to_live(config.metadata_cache_ttl)
            .build();

        Ok(Self {
            permits: Semaphore::new(config.worker_count.max(1)),
            simulate_timeout: AtomicBool::new(config.simulate_timeout),
            config,
            remote,
            cache,
            writeback,
            metadata,
            background: Mutex::new(None),
            storing: Mutex::new(HashSet::new()),
            counters: Counters::default(),
        })
    }

    /// Spawn the write-back scheduler and the cache maintenance task
    pub fn start(&self) {
        let mut background = self.background.lock();
        if background.is_some() {
            warn!("Orchestrator background tasks already running");
            return;
        }

        let scheduler = self
            .writeback
            .as_ref()
            .map(|buffer| WriteBackScheduler::spawn(buffer.clone(), self.remote.clone()));

        let maintenance = self.cache.as_ref().map(|cache| {
            let interval = cache.lock().config().maintenance_interval;
            let cancel = CancellationToken::new();
            let handle = tokio::spawn(run_maintenance(cache.clone(), interval, cancel.clone()));
            (cancel, handle)
        });

        *background = Some(Background {
            scheduler,
            maintenance,
        });
        info!("Orchestrator background tasks started");
    }

    /// Stop the background tasks, letting an in-flight write cycle finish
    pub async fn shutdown(&self) {
        let Some(mut background) = self.background.lock().take() else {
            return;
        };

        if let Some((cancel, handle)) = background.maintenance.take() {
            cancel.cancel();
            if let Err(e) = handle.await {
                warn!(error = %e, "Cache maintenance task failed");
            }
        }
        if let Some(scheduler) = background.scheduler.take() {
            scheduler.shutdown().await;
        }
        info!("Orchestrator background tasks stopped");
    }

    /// Store an asset, queueing it on disk when the remote store is
    /// unreachable.
    ///
    /// An id that is queued for write-back, or being stored by a concurrent
    /// call, already exists.
    pub async fn store_asset(&self, record: AssetRecord) -> Result<StoreOutcome> {
        if record.id.is_nil() {
            return Err(StoreError::InvalidAsset("asset id is nil".to_string()));
        }
        bump(&self.counters.puts);
        let id = record.id;

        let claim = StoreClaim::new(&self.storing, id);
        let queued = self
            .writeback
            .as_ref()
            .map(|writeback| writeback.is_pending(id))
            .unwrap_or(false);
        if claim.is_none() || queued {
            bump(&self.counters.already_exists);
            debug!(id = %id, queued, "Asset already being stored");
            return Err(StoreError::AlreadyExists(id));
        }

        match self.store_remote(&record).await {
            Ok(()) => {
                self.admit(&record);
                self.metadata.insert(id, record.metadata()).await;
                bump(&self.counters.stored);
                debug!(id = %id, size = record.size(), "Stored asset");
                Ok(StoreOutcome::Stored)
            }
            Err(RemoteError::AlreadyExists(id)) => {
                bump(&self.counters.already_exists);
                Err(StoreError::AlreadyExists(id))
            }
            Err(e) if e.is_transient() => self.queue(record, e).await,
            Err(e) => {
                bump(&self.counters.errors);
                warn!(id = %id, error = %e, "Remote store rejected asset");
                Err(StoreError::Rejected(e.to_string()))
            }
        }
    }

    async fn store_remote(&self, record: &AssetRecord) -> std::result::Result<(), RemoteError> {
        if self.simulate_timeout.load(Ordering::Relaxed) {
            return Err(RemoteError::Timeout);
        }
        self.remote_call(self.config.store_timeout, || self.remote.store(record))
            .await
    }

    async fn queue(&self, record: AssetRecord, cause: RemoteError) -> Result<StoreOutcome> {
        let id = record.id;
        let Some(writeback) = &self.writeback else {
            bump(&self.counters.errors);
            warn!(id = %id, error = %cause, "Remote store unavailable and write-back disabled");
            return Err(StoreError::Unavailable(cause.to_string()));
        };

        match writeback.enqueue(&record).await {
            Ok(()) => {
                self.admit(&record);
                self.nudge();
                bump(&self.counters.queued);
                info!(id = %id, error = %cause, "Remote store unavailable, asset queued for write-back");
                Ok(StoreOutcome::Queued)
            }
            Err(WriteBackError::AlreadyQueued(id)) => {
                bump(&self.counters.already_exists);
                Err(StoreError::AlreadyExists(id))
            }
            Err(e) => {
                bump(&self.counters.errors);
                error!(id = %id, error = %e, "Failed to persist asset for write-back");
                Err(StoreError::Durability(e.to_string()))
            }
        }
    }

    /// Fetch an asset from the first tier that has it
    pub async fn request_asset(&self, id: AssetId) -> Result<Option<AssetRecord>> {
        if id.is_nil() {
            return Ok(None);
        }
        bump(&self.counters.gets);

        if let Some(record) = self.cached(id) {
            bump(&self.counters.cache_hits);
            return Ok(Some(record));
        }

        if let Some(record) = self.queued(id).await {
            bump(&self.counters.writeback_hits);
            self.admit(&record);
            return Ok(Some(record));
        }

        bump(&self.counters.remote_fetches);
        match self.fetch_remote(id, || self.remote.fetch(id)).await? {
            Some(record) => {
                self.admit(&record);
                Ok(Some(record))
            }
            None => {
                bump(&self.counters.not_found);
                Ok(None)
            }
        }
    }

    /// Metadata of an asset, without transferring its data when avoidable
    pub async fn request_asset_metadata(&self, id: AssetId) -> Result<Option<AssetMetadata>> {
        if id.is_nil() {
            return Ok(None);
        }
        bump(&self.counters.gets);

        if let Some(record) = self.cached(id) {
            bump(&self.counters.cache_hits);
            return Ok(Some(record.metadata()));
        }
        if let Some(record) = self.queued(id).await {
            bump(&self.counters.writeback_hits);
            return Ok(Some(record.metadata()));
        }
        if let Some(metadata) = self.metadata.get(&id).await {
            bump(&self.counters.cache_hits);
            return Ok(Some(metadata));
        }

        bump(&self.counters.remote_fetches);
        match self.fetch_remote(id, || self.remote.fetch_metadata(id)).await? {
            Some(metadata) => {
                self.metadata.insert(id, metadata.clone()).await;
                Ok(Some(metadata))
            }
            None => {
                bump(&self.counters.not_found);
                Ok(None)
            }
        }
    }

    /// Remove an asset from every tier. Returns whether it existed anywhere.
    pub async fn purge_asset(&self, id: AssetId) -> Result<bool> {
        let mut existed = false;

        if let Some(writeback) = &self.writeback {
            existed |= writeback.purge(id).await.map_err(|e| {
                error!(id = %id, error = %e, "Failed to purge write-back entry");
                StoreError::Durability(e.to_string())
            })?;
        }
        if let Some(cache) = &self.cache {
            existed |= cache.lock().remove(id);
        }
        self.metadata.invalidate(&id).await;

        match self
            .remote_call(self.config.store_timeout, || self.remote.delete(id))
            .await
        {
            Ok(deleted) => existed |= deleted,
            Err(e) if e.is_transient() => {
                bump(&self.counters.errors);
                return Err(StoreError::Unavailable(e.to_string()));
            }
            Err(e) => {
                bump(&self.counters.errors);
                return Err(StoreError::Rejected(e.to_string()));
            }
        }

        debug!(id = %id, existed, "Purged asset");
        Ok(existed)
    }

    /// Run one write cycle now. `None` when write-back is disabled.
    pub async fn run_write_cycle(&self) -> Option<WriteCycleReport> {
        match &self.writeback {
            Some(writeback) => Some(writeback.run_write_cycle(self.remote.as_ref()).await),
            None => None,
        }
    }

    pub fn set_simulate_timeout(&self, enabled: bool) {
        self.simulate_timeout.store(enabled, Ordering::Relaxed);
        info!(enabled, "Simulated remote timeouts toggled");
    }

    pub fn stats(&self) -> OrchestratorStats {
        let c = &self.counters;
        OrchestratorStats {
            gets: c.gets.load(Ordering::Relaxed),
            cache_hits: c.cache_hits.load(Ordering::Relaxed),
            writeback_hits: c.writeback_hits.load(Ordering::Relaxed),
            remote_fetches: c.remote_fetches.load(Ordering::Relaxed),
            not_found: c.not_found.load(Ordering::Relaxed),
            puts: c.puts.load(Ordering::Relaxed),
            stored: c.stored.load(Ordering::Relaxed),
            queued: c.queued.load(Ordering::Relaxed),
            already_exists: c.already_exists.load(Ordering::Relaxed),
            errors: c.errors.load(Ordering::Relaxed),
            cache: self.cache.as_ref().map(|cache| cache.lock().stats()),
            writeback: self.writeback.as_ref().map(|wb| wb.stats()),
        }
    }

    pub fn is_cached(&self, id: AssetId) -> bool {
        self.cache
            .as_ref()
            .map(|cache| cache.lock().has(id))
            .unwrap_or(false)
    }

    pub fn is_queued(&self, id: AssetId) -> bool {
        self.writeback
            .as_ref()
            .map(|wb| wb.contains(id))
            .unwrap_or(false)
    }

    fn nudge(&self) {
        if let Some(background) = self.background.lock().as_ref() {
            if let Some(scheduler) = &background.scheduler {
                scheduler.nudge();
            }
        }
    }

    /// Cache admission: small records are pooled in encoded form, larger
    /// ones are kept whole
    fn admit(&self, record: &AssetRecord) {
        let Some(cache) = &self.cache else {
            return;
        };
        let (max_cacheable, max_pooled) = {
            let cache = cache.lock();
            let config = cache.config();
            (config.max_cacheable_asset_size, config.max_pooled_asset_size)
        };
        if record.data.len() > max_cacheable {
            return;
        }

        let encoded = if record.data.len() <= max_pooled {
            asset_record::encode(record)
                .ok()
                .filter(|bytes| bytes.len() <= max_pooled)
        } else {
            None
        };

        let mut cache = cache.lock();
        match encoded {
            Some(bytes) => cache.put(record.id, &bytes),
            None => cache.put_raw(record.id, record.clone()),
        }
    }

    fn cached(&self, id: AssetId) -> Option<AssetRecord> {
        let cache = self.cache.as_ref()?;
        let encoded = {
            let mut cache = cache.lock();
            let entry = cache.try_get(id)?;
            match &entry.payload {
                CachePayload::Raw(record) => return Some(record.clone()),
                CachePayload::Pooled(buffer) => buffer.as_slice().to_vec(),
            }
        };

        match asset_record::decode(&encoded) {
            Ok(record) if record.id == id => Some(record),
            Ok(record) => {
                warn!(id = %id, found = %record.id, "Cache entry holds another asset, dropping it");
                cache.lock().remove(id);
                None
            }
            Err(e) => {
                warn!(id = %id, error = %e, "Corrupt cache entry, dropping it");
                cache.lock().remove(id);
                None
            }
        }
    }

    async fn queued(&self, id: AssetId) -> Option<AssetRecord> {
        let writeback = self.writeback.as_ref()?;
        match writeback.get(id).await {
            Ok(record) => record,
            Err(e) => {
                warn!(id = %id, error = %e, "Could not read write-back entry");
                None
            }
        }
    }

    /// A remote read, retried once on a transient failure
    async fn fetch_remote<T, F, Fut>(&self, id: AssetId, op: F) -> Result<Option<T>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<Option<T>, RemoteError>>,
    {
        let mut last_error = RemoteError::Timeout;
        for attempt in 1..=FETCH_ATTEMPTS {
            match self.remote_call(self.config.fetch_timeout, &op).await {
                Ok(found) => return Ok(found),
                Err(e) if e.is_transient() => {
                    debug!(id = %id, attempt, error = %e, "Remote fetch failed");
                    last_error = e;
                }
                Err(e) => {
                    bump(&self.counters.errors);
                    return Err(StoreError::Rejected(e.to_string()));
                }
            }
        }

        bump(&self.counters.errors);
        warn!(id = %id, error = %last_error, "Remote store unavailable for read");
        Err(StoreError::Unavailable(last_error.to_string()))
    }

    /// One remote call, holding a worker permit and bounded by `limit`
    async fn remote_call<T, F, Fut>(
        &self,
        limit: Duration,
        op: F,
    ) -> std::result::Result<T, RemoteError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<T, RemoteError>>,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| RemoteError::Connection("worker pool closed".to_string()))?;
        match tokio::time::timeout(limit, op()).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout),
        }
    }
}

async fn run_maintenance(
    cache: Arc<Mutex<BucketedMemoryCache>>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                cache.lock().maintain();
            }
        }
    }
}
