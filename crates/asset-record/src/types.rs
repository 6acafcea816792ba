//! Core asset types

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// 128-bit globally unique asset identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(Uuid);

impl AssetId {
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Lowercase hex without dashes, used for file and object names
    pub fn simple(&self) -> String {
        self.0.simple().to_string()
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl From<Uuid> for AssetId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Error returned when a string is not a valid asset id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAssetIdError(String);

impl fmt::Display for ParseAssetIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid asset id: {}", self.0)
    }
}

impl std::error::Error for ParseAssetIdError {}

impl FromStr for AssetId {
    type Err = ParseAssetIdError;

    /// Accepts both the hyphenated and the simple form
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| ParseAssetIdError(s.to_string()))
    }
}

/// Storage flags carried by every asset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetFlags {
    pub local: bool,
    pub temporary: bool,
}

/// Immutable storage record for an asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: AssetId,
    pub asset_type: i8,
    pub flags: AssetFlags,
    pub create_time: DateTime<Utc>,
    pub name: String,
    pub description: String,
    pub data: Bytes,
}

impl AssetRecord {
    pub fn new(id: AssetId, asset_type: i8, data: impl Into<Bytes>) -> Self {
        Self {
            id,
            asset_type,
            flags: AssetFlags::default(),
            create_time: Utc::now(),
            name: String::new(),
            description: String::new(),
            data: data.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_flags(mut self, flags: AssetFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn metadata(&self) -> AssetMetadata {
        AssetMetadata {
            id: self.id,
            asset_type: self.asset_type,
            flags: self.flags,
            create_time: self.create_time,
            name: self.name.clone(),
            description: self.description.clone(),
            size: self.data.len() as u64,
        }
    }
}

/// Everything about an asset except its data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetMetadata {
    pub id: AssetId,
    pub asset_type: i8,
    pub flags: AssetFlags,
    pub create_time: DateTime<Utc>,
    pub name: String,
    pub description: String,
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_id_display_is_hyphenated() {
        let uuid = Uuid::parse_str("0f8fad5b-d9cb-469f-a165-70867728950e").unwrap();
        let id = AssetId::new(uuid);
        assert_eq!(id.to_string(), "0f8fad5b-d9cb-469f-a165-70867728950e");
        assert_eq!(id.simple(), "0f8fad5bd9cb469fa16570867728950e");
    }

    #[test]
    fn test_asset_id_parses_both_forms() {
        let a: AssetId = "0f8fad5b-d9cb-469f-a165-70867728950e".parse().unwrap();
        let b: AssetId = "0F8FAD5BD9CB469FA16570867728950E".parse().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_asset_id_parse_invalid() {
        let err = "not-an-id".parse::<AssetId>().unwrap_err();
        assert_eq!(err.to_string(), "Invalid asset id: not-an-id");
    }

    #[test]
    fn test_nil_id() {
        assert!(AssetId::nil().is_nil());
        assert!(!AssetId::random().is_nil());
    }

    #[test]
    fn test_metadata_reflects_record() {
        let record = AssetRecord::new(AssetId::random(), 5, vec![1u8, 2, 3])
            .with_name("Name")
            .with_description("Description")
            .with_flags(AssetFlags {
                local: true,
                temporary: false,
            });

        let meta = record.metadata();
        assert_eq!(meta.id, record.id);
        assert_eq!(meta.asset_type, 5);
        assert_eq!(meta.size, 3);
        assert_eq!(meta.name, "Name");
        assert!(meta.flags.local);
        assert!(!meta.flags.temporary);
    }

    #[test]
    fn test_asset_id_serializes_as_uuid_string() {
        let id: AssetId = "0f8fad5b-d9cb-469f-a165-70867728950e".parse().unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"0f8fad5b-d9cb-469f-a165-70867728950e\"");
    }
}
