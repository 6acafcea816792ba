//! Error types for remote store operations

use asset_record::AssetId;
use std::fmt;

#[derive(Debug)]
pub enum RemoteError {
    /// The store already holds an asset with this id and refuses to overwrite it
    AlreadyExists(AssetId),
    /// The call did not complete in time
    Timeout,
    /// The store could not be reached or failed on its side
    Connection(String),
    /// The store refused the request for a reason retrying will not fix
    Rejected(String),
}

impl RemoteError {
    /// Whether a later retry of the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Timeout | RemoteError::Connection(_))
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteError::AlreadyExists(id) => {
                write!(f, "Asset {} already exists and can not be overwritten", id)
            }
            RemoteError::Timeout => write!(f, "Remote store timed out"),
            RemoteError::Connection(msg) => write!(f, "Remote store connection error: {}", msg),
            RemoteError::Rejected(msg) => write!(f, "Remote store rejected request: {}", msg),
        }
    }
}

impl std::error::Error for RemoteError {}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RemoteError::Timeout
        } else if err.is_decode() || err.is_builder() {
            RemoteError::Rejected(err.to_string())
        } else {
            RemoteError::Connection(err.to_string())
        }
    }
}

impl From<asset_record::CodecError> for RemoteError {
    fn from(err: asset_record::CodecError) -> Self {
        RemoteError::Rejected(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RemoteError>;
