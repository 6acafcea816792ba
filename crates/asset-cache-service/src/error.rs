//! Error types for the asset cache service

use asset_record::AssetId;
use std::fmt;

/// Failure of an orchestrator operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The asset is already stored or queued and can not be replaced
    AlreadyExists(AssetId),
    /// The remote store could not be reached and nothing could stand in for it
    Unavailable(String),
    /// The remote store refused the request
    Rejected(String),
    /// The write-back buffer could not persist or remove the asset locally
    Durability(String),
    /// The asset can never be stored, e.g. because its id is nil
    InvalidAsset(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::AlreadyExists(id) => write!(f, "Asset {} already exists", id),
            StoreError::Unavailable(msg) => write!(f, "Remote store unavailable: {}", msg),
            StoreError::Rejected(msg) => write!(f, "Remote store rejected asset: {}", msg),
            StoreError::Durability(msg) => write!(f, "Write-back durability failure: {}", msg),
            StoreError::InvalidAsset(msg) => write!(f, "Invalid asset: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

/// Failure starting or running the service
#[derive(Debug)]
pub enum ServiceError {
    Config(String),
    Io(Box<std::io::Error>),
    WriteBack(disk_writeback::WriteBackError),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::Config(msg) => write!(f, "Configuration error: {}", msg),
            ServiceError::Io(err) => write!(f, "IO error: {}", err),
            ServiceError::WriteBack(err) => write!(f, "Write-back error: {}", err),
        }
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServiceError::Io(err) => Some(err.as_ref()),
            ServiceError::WriteBack(err) => Some(err),
            ServiceError::Config(_) => None,
        }
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        ServiceError::Io(Box::new(err))
    }
}

impl From<disk_writeback::WriteBackError> for ServiceError {
    fn from(err: disk_writeback::WriteBackError) -> Self {
        ServiceError::WriteBack(err)
    }
}

impl From<bucketed_memory_cache::InvalidCacheConfig> for ServiceError {
    fn from(err: bucketed_memory_cache::InvalidCacheConfig) -> Self {
        ServiceError::Config(err.to_string())
    }
}

impl From<asset_remote::RemoteError> for ServiceError {
    fn from(err: asset_remote::RemoteError) -> Self {
        ServiceError::Config(err.to_string())
    }
}

impl From<tracing_subscriber::filter::ParseError> for ServiceError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        ServiceError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_already_exists_display() {
        let id: AssetId = "0f8fad5b-d9cb-469f-a165-70867728950e".parse().unwrap();
        let err = StoreError::AlreadyExists(id);
        assert_eq!(
            format!("{}", err),
            "Asset 0f8fad5b-d9cb-469f-a165-70867728950e already exists"
        );
    }

    #[test]
    fn test_unavailable_display() {
        let err = StoreError::Unavailable("Remote store timed out".to_string());
        assert_eq!(
            format!("{}", err),
            "Remote store unavailable: Remote store timed out"
        );
    }

    #[test]
    fn test_config_error_display() {
        let err = ServiceError::Config("bad port".to_string());
        assert_eq!(format!("{}", err), "Configuration error: bad port");
        assert!(err.source().is_none());
    }

    #[test]
    fn test_io_error_source() {
        let err: ServiceError = std::io::Error::other("boom").into();
        assert_eq!(format!("{}", err), "IO error: boom");
        assert!(err.source().is_some());
    }
}
