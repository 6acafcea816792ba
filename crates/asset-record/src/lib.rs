//! Asset storage records
//!
//! Defines the fixed-width asset identifier, the immutable storage record
//! that every tier of the cache works with, and the MessagePack codec used
//! for both the write-back files and remote object bodies.

pub mod codec;
pub mod error;
pub mod types;

pub use codec::{decode, encode};
pub use error::{CodecError, Result};
pub use types::{AssetFlags, AssetId, AssetMetadata, AssetRecord, ParseAssetIdError};
