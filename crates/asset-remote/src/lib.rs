//! Remote durable blob store
//!
//! The caching tier only talks to the remote store through [`RemoteStore`].
//! Two adapters ship with it: an HTTP object-store client and a write-once
//! in-memory store with fault injection.

pub mod error;
pub mod http;
pub mod memory;
pub mod store;

pub use error::{RemoteError, Result};
pub use http::{HttpRemoteConfig, HttpRemoteStore};
pub use memory::MemoryRemoteStore;
pub use store::RemoteStore;
