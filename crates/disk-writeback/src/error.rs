//! Error types for the write-back buffer

use asset_record::{AssetId, CodecError};
use std::fmt;

#[derive(Debug)]
pub enum WriteBackError {
    /// Reading or writing the write-back directory failed
    Io(std::io::Error),
    /// A write-back file could not be encoded or decoded
    Codec(CodecError),
    /// The asset already has a non-empty write-back file
    AlreadyQueued(AssetId),
}

impl fmt::Display for WriteBackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteBackError::Io(err) => write!(f, "Write-back I/O error: {}", err),
            WriteBackError::Codec(err) => write!(f, "Write-back codec error: {}", err),
            WriteBackError::AlreadyQueued(id) => {
                write!(f, "Asset {} is already queued for write-back", id)
            }
        }
    }
}

impl std::error::Error for WriteBackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WriteBackError::Io(err) => Some(err),
            WriteBackError::Codec(err) => Some(err),
            WriteBackError::AlreadyQueued(_) => None,
        }
    }
}

impl From<std::io::Error> for WriteBackError {
    fn from(err: std::io::Error) -> Self {
        WriteBackError::Io(err)
    }
}

impl From<CodecError> for WriteBackError {
    fn from(err: CodecError) -> Self {
        WriteBackError::Codec(err)
    }
}

pub type Result<T> = std::result::Result<T, WriteBackError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_already_queued_display() {
        let id: AssetId = "0f8fad5b-d9cb-469f-a165-70867728950e".parse().unwrap();
        let err = WriteBackError::AlreadyQueued(id);
        assert_eq!(
            format!("{}", err),
            "Asset 0f8fad5b-d9cb-469f-a165-70867728950e is already queued for write-back"
        );
        assert!(err.source().is_none());
    }

    #[test]
    fn test_io_error_has_source() {
        let err: WriteBackError =
            std::io::Error::new(std::io::ErrorKind::StorageFull, "disk full").into();
        assert_eq!(format!("{}", err), "Write-back I/O error: disk full");
        assert!(err.source().is_some());
    }
}
