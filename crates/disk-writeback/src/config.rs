use std::path::PathBuf;
use std::time::Duration;

/// Write-back buffer settings
#[derive(Debug, Clone)]
pub struct WriteBackConfig {
    /// Directory holding one `<simple-id>.asset` file per queued asset
    pub dir: PathBuf,
    /// Pause between background write cycles
    pub write_interval: Duration,
    /// Delivery attempts in flight during one cycle
    pub workers: usize,
    /// Upper bound on a single delivery attempt
    pub attempt_timeout: Duration,
    /// How long delivered assets stay readable before cleanup
    pub retention: Duration,
    /// Delete files as soon as they are delivered
    pub aggressive_cleanup: bool,
    /// How long shutdown waits for an in-flight cycle
    pub shutdown_timeout: Duration,
}

impl WriteBackConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Default::default()
        }
    }
}

impl Default for WriteBackConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./cache/writeback"),
            write_interval: Duration::from_secs(1),
            workers: 4,
            attempt_timeout: Duration::from_secs(10),
            retention: Duration::from_secs(60),
            aggressive_cleanup: false,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}
