//! The remote store contract

use crate::error::Result;
use asset_record::{AssetId, AssetMetadata, AssetRecord};
use async_trait::async_trait;

/// A durable, write-once blob store reached over the network.
///
/// Implementations must never overwrite an existing id: storing an id that
/// is already present fails with [`RemoteError::AlreadyExists`]. Absence is
/// reported as `Ok(None)` / `Ok(false)`, never as an error.
///
/// [`RemoteError::AlreadyExists`]: crate::RemoteError::AlreadyExists
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn store(&self, record: &AssetRecord) -> Result<()>;

    async fn fetch(&self, id: AssetId) -> Result<Option<AssetRecord>>;

    async fn fetch_metadata(&self, id: AssetId) -> Result<Option<AssetMetadata>>;

    /// Returns `false` when there was nothing to delete
    async fn delete(&self, id: AssetId) -> Result<bool>;
}
