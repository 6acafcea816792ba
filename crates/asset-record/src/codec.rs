//! MessagePack codec for asset records
//!
//! Fields are encoded by name so that readers tolerate records written by
//! builds that carry more or fewer fields.

use crate::error::{CodecError, Result};
use crate::types::AssetRecord;

pub fn encode(record: &AssetRecord) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(record)?)
}

pub fn decode(bytes: &[u8]) -> Result<AssetRecord> {
    if bytes.is_empty() {
        return Err(CodecError::Decode("empty input".to_string()));
    }
    Ok(rmp_serde::from_slice(bytes)?)
}
