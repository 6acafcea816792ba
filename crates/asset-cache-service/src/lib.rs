//! Asset caching tier
//!
//! [`StoreOrchestrator`] puts a bounded memory cache and a crash-safe disk
//! write-back buffer in front of a write-once remote store. Stores succeed
//! as soon as the asset is either remote or durably queued. Reads fall
//! through memory, then disk, then the remote store.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod server;
pub mod types;

pub use config::{OrchestratorConfig, ServiceConfig};
pub use error::{Result, ServiceError, StoreError};
pub use orchestrator::StoreOrchestrator;
pub use types::{HealthResponse, OrchestratorStats, StoreOutcome};
