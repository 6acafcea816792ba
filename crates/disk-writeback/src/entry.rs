//! Write-back index entries

use asset_record::{AssetId, AssetRecord};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Tracking state for one asset in the write-back directory
#[derive(Debug, Clone)]
pub struct WriteBackEntry {
    pub id: AssetId,
    /// The record, when it is held in memory. Recovered and delivered
    /// entries are read back from their file.
    pub payload: Option<AssetRecord>,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl WriteBackEntry {
    pub fn queued(record: AssetRecord) -> Self {
        Self {
            id: record.id,
            payload: Some(record),
            created_at: Utc::now(),
            last_attempt_at: None,
            attempts: 0,
            delivered_at: None,
        }
    }

    pub fn recovered(id: AssetId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            payload: None,
            created_at,
            last_attempt_at: None,
            attempts: 0,
            delivered_at: None,
        }
    }

    pub fn is_delivered(&self) -> bool {
        self.delivered_at.is_some()
    }

    /// Whether a delivered entry has outlived its retention window
    pub fn retention_elapsed(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        match self.delivered_at {
            Some(delivered_at) => (now - delivered_at)
                .to_std()
                .map(|age| age >= retention)
                .unwrap_or(false),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queued_entry_is_not_delivered() {
        let entry = WriteBackEntry::queued(AssetRecord::new(AssetId::random(), 0, vec![1u8]));
        assert!(!entry.is_delivered());
        assert!(entry.payload.is_some());
        assert!(!entry.retention_elapsed(Utc::now(), Duration::ZERO));
    }

    #[test]
    fn test_retention_elapsed() {
        let mut entry = WriteBackEntry::recovered(AssetId::random(), Utc::now());
        let delivered_at = Utc::now();
        entry.delivered_at = Some(delivered_at);

        let retention = Duration::from_secs(60);
        assert!(!entry.retention_elapsed(delivered_at + chrono::Duration::seconds(59), retention));
        assert!(entry.retention_elapsed(delivered_at + chrono::Duration::seconds(60), retention));
    }
}
