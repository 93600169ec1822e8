use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::scheduler::JobExecutor;
use crate::state::ConfigStore;

/// Fixed-interval backup loop.
///
/// Each cycle takes one configuration snapshot and runs every job in it,
/// then sleeps for the interval. Reloads land between cycles. Cancellation
/// cuts the sleep short but never interrupts a running job.
pub struct Scheduler {
    store: Arc<ConfigStore>,
    executor: JobExecutor,
    interval: Duration,
    cancellation: CancellationToken,
}

impl Scheduler {
    pub fn new(
        store: Arc<ConfigStore>,
        executor: JobExecutor,
        interval: Duration,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            store,
            executor,
            interval,
            cancellation,
        }
    }

    pub async fn run(&self) {
        info!("Scheduler started, backup interval: {:?}", self.interval);

        loop {
            self.run_once().await;

            if self.cancellation.is_cancelled() {
                break;
            }

            debug!("Next backup cycle in {:?}", self.interval);
            tokio::select! {
                _ = sleep(self.interval) => {}
                _ = self.cancellation.cancelled() => break,
            }
        }

        info!("Scheduler stopped");
    }

    /// Run every job of the current snapshot once
    pub async fn run_once(&self) -> usize {
        let config = self.store.snapshot().await;

        if config.is_empty() {
            warn!("No backups configured, nothing to do this cycle");
            return 0;
        }

        info!("Starting backup cycle: {} jobs", config.backups.len());
        self.executor.run_cycle(&config.backups).await.len()
    }
}
