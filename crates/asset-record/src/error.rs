//! Error types for the record codec

use std::fmt;

#[derive(Debug)]
pub enum CodecError {
    Encode(String),
    Decode(String),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Encode(msg) => write!(f, "Asset encode error: {}", msg),
            CodecError::Decode(msg) => write!(f, "Asset decode error: {}", msg),
        }
    }
}

impl std::error::Error for CodecError {}

impl From<rmp_serde::encode::Error> for CodecError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        CodecError::Encode(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for CodecError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        CodecError::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_error_display() {
        let err = CodecError::Encode("buffer closed".to_string());
        assert_eq!(format!("{}", err), "Asset encode error: buffer closed");
    }

    #[test]
    fn test_decode_error_display() {
        let err = CodecError::Decode("unexpected eof".to_string());
        assert_eq!(format!("{}", err), "Asset decode error: unexpected eof");
    }
}
