//! Background task driving write cycles

use crate::buffer::WriteBackBuffer;
use asset_remote::RemoteStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Runs [`WriteBackBuffer::run_write_cycle`] on an interval and whenever
/// nudged, until shut down or dropped.
pub struct WriteBackScheduler {
    notify: Arc<Notify>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    shutdown_timeout: Duration,
}

impl WriteBackScheduler {
    pub fn spawn(buffer: Arc<WriteBackBuffer>, remote: Arc<dyn RemoteStore>) -> Self {
        let notify = Arc::new(Notify::new());
        let cancel = CancellationToken::new();
        let shutdown_timeout = buffer.config().shutdown_timeout;

        let handle = tokio::spawn(run(buffer, remote, notify.clone(), cancel.clone()));

        Self {
            notify,
            cancel,
            handle,
            shutdown_timeout,
        }
    }

    /// Start a cycle now instead of waiting for the next tick
    pub fn nudge(&self) {
        self.notify.notify_one();
    }

    /// Stop the task, waiting up to `shutdown_timeout` for an in-flight
    /// cycle. Returns `false` when the task had to be aborted.
    pub async fn shutdown(mut self) -> bool {
        self.cancel.cancel();
        match tokio::time::timeout(self.shutdown_timeout, &mut self.handle).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(error = %e, "Write-back scheduler task failed");
                false
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.shutdown_timeout.as_millis() as u64,
                    "Write cycle still running at shutdown, aborting"
                );
                self.handle.abort();
                false
            }
        }
    }
}

impl Drop for WriteBackScheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(
    buffer: Arc<WriteBackBuffer>,
    remote: Arc<dyn RemoteStore>,
    notify: Arc<Notify>,
    cancel: CancellationToken,
) {
    let interval = buffer.config().write_interval;
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        interval_ms = interval.as_millis() as u64,
        pending = buffer.pending_count(),
        "Write-back scheduler started"
    );

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
            _ = notify.notified() => {}
        }

        let report = buffer.run_write_cycle(remote.as_ref()).await;
        if report.attempted > 0 {
            debug!(
                attempted = report.attempted,
                delivered = report.delivered,
                failed = report.failed,
                remaining = report.remaining,
                "Write cycle finished"
            );
        }
    }

    info!(pending = buffer.pending_count(), "Write-back scheduler stopped");
}
