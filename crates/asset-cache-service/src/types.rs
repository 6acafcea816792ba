//! Core types for the asset cache service

use bucketed_memory_cache::CacheStats;
use disk_writeback::WriteBackStats;
use serde::Serialize;

/// How a successful store was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreOutcome {
    /// The remote store accepted the asset
    Stored,
    /// The asset is durably queued and will be delivered in the background
    Queued,
}

/// Orchestrator counters, with the stats of the tiers it owns
#[derive(Debug, Clone, Default, Serialize)]
pub struct OrchestratorStats {
    pub gets: u64,
    pub cache_hits: u64,
    pub writeback_hits: u64,
    pub remote_fetches: u64,
    pub not_found: u64,
    pub puts: u64,
    pub stored: u64,
    pub queued: u64,
    pub already_exists: u64,
    pub errors: u64,
    pub cache: Option<CacheStats>,
    pub writeback: Option<WriteBackStats>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub stats: OrchestratorStats,
}
