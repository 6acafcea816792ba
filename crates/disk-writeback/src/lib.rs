//! Disk-backed write-back buffer
//!
//! Assets the remote store could not accept are written to one file each
//! and retried in the background until the store confirms them. On start
//! the directory is rescanned, so nothing queued is lost across a crash.

mod buffer;
mod config;
mod entry;
mod error;
mod scheduler;

pub use buffer::{WriteBackBuffer, WriteBackStats, WriteCycleReport};
pub use config::WriteBackConfig;
pub use entry::WriteBackEntry;
pub use error::{Result, WriteBackError};
pub use scheduler::WriteBackScheduler;
