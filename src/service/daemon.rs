use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Configuration;
use crate::core::{JobRunner, S3Connector, StorageConnector};
use crate::health::run_health_server;
use crate::observability::shutdown_logging;
use crate::scheduler::{JobExecutor, Scheduler};
use crate::service::setup_shutdown_handler;
use crate::state::{ConfigStore, ConfigWatcher, LivenessState};

/// Runtime settings taken from the command line
#[derive(Debug, Clone)]
pub struct DaemonOptions {
    /// File to watch for changes; `None` when configured from the environment
    pub config_path: Option<PathBuf>,
    pub interval: Duration,
    pub dump_path: PathBuf,
    pub scratch_dir: PathBuf,
    /// Port of the liveness endpoint; `None` disables it
    pub health_port: Option<u16>,
}

/// Service daemon orchestrating the scheduler, watcher and health endpoint
pub struct ServiceDaemon {
    options: DaemonOptions,
    store: Arc<ConfigStore>,
    liveness: Arc<LivenessState>,
    runner: Arc<JobRunner>,
    cancellation: CancellationToken,
}

impl ServiceDaemon {
    pub fn new(config: Configuration, options: DaemonOptions) -> Self {
        Self::with_connector(config, options, Arc::new(S3Connector))
    }

    pub fn with_connector(
        config: Configuration,
        options: DaemonOptions,
        connector: Arc<dyn StorageConnector>,
    ) -> Self {
        let runner = JobRunner::new(
            options.dump_path.clone(),
            options.scratch_dir.clone(),
            connector,
        );

        Self {
            store: Arc::new(ConfigStore::new(config)),
            liveness: Arc::new(LivenessState::new()),
            runner: Arc::new(runner),
            cancellation: CancellationToken::new(),
            options,
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn liveness(&self) -> Arc<LivenessState> {
        self.liveness.clone()
    }

    /// Run until SIGINT/SIGTERM. The current job always finishes first.
    pub async fn run(self) -> anyhow::Result<()> {
        info!("Backup service starting...");
        info!("Using dump utility: {}", self.runner.dump_path().display());

        setup_shutdown_handler(self.cancellation.clone()).await;

        if let Some(port) = self.options.health_port {
            let liveness = self.liveness.clone();
            let cancellation = self.cancellation.clone();
            tokio::spawn(async move {
                if let Err(e) = run_health_server(port, liveness, cancellation).await {
                    error!("Health endpoint unavailable: {:#}", e);
                }
            });
        } else {
            info!("Health endpoint disabled");
        }

        match &self.options.config_path {
            Some(path) => {
                let watcher = ConfigWatcher::new(
                    path.clone(),
                    self.store.clone(),
                    self.cancellation.clone(),
                );
                tokio::spawn(async move {
                    if let Err(e) = watcher.watch().await {
                        warn!(
                            "Config watcher error, running without live reload: {:#}",
                            e
                        );
                    }
                });
            }
            None => info!("Configuration from environment, live reload disabled"),
        }

        let executor = JobExecutor::new(self.runner.clone(), self.liveness.clone());
        let scheduler = Scheduler::new(
            self.store.clone(),
            executor,
            self.options.interval,
            self.cancellation.clone(),
        );
        scheduler.run().await;

        info!("Backup service stopped");
        shutdown_logging();
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::testing::{create_test_job, fake_dump_utility, MockStorage};
    use tempfile::TempDir;

    fn options(dir: &TempDir, config_path: Option<PathBuf>) -> DaemonOptions {
        DaemonOptions {
            config_path,
            interval: Duration::from_secs(3600),
            dump_path: fake_dump_utility(dir.path(), 0),
            scratch_dir: dir.path().join("scratch"),
            health_port: None,
        }
    }

    #[tokio::test]
    async fn test_runs_first_cycle_and_stops_on_cancellation() {
        let dir = TempDir::new().unwrap();
        let storage = MockStorage::with_bucket("backups");
        let config = Configuration {
            backups: vec![create_test_job("shop-db", Some("shop"))],
            log_level: None,
        };

        let daemon = ServiceDaemon::with_connector(
            config,
            options(&dir, None),
            Arc::new(storage.clone()),
        );
        let cancellation = daemon.cancellation_token();
        let liveness = daemon.liveness();

        let handle = tokio::spawn(daemon.run());

        for _ in 0..100 {
            if liveness.is_healthy() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        cancellation.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), handle).await;
        assert!(result.unwrap().unwrap().is_ok());
        assert!(liveness.is_healthy());
        assert_eq!(storage.uploads().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_watch_directory_does_not_stop_backups() {
        let dir = TempDir::new().unwrap();
        let storage = MockStorage::with_bucket("backups");
        let config = Configuration {
            backups: vec![create_test_job("shop-db", Some("shop"))],
            log_level: None,
        };
        let missing = dir.path().join("missing").join("config.yaml");

        let daemon = ServiceDaemon::with_connector(
            config,
            options(&dir, Some(missing)),
            Arc::new(storage.clone()),
        );
        let cancellation = daemon.cancellation_token();
        let liveness = daemon.liveness();
        let handle = tokio::spawn(daemon.run());

        for _ in 0..100 {
            if liveness.is_healthy() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        cancellation.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        assert_eq!(storage.uploads().len(), 1);
    }
}
