use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{load_config, ConfigChanges, ConfigError};
use crate::observability::reload_log_level;
use crate::state::ConfigStore;

const FS_EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Reloads the configuration store whenever the config file changes
pub struct ConfigWatcher {
    config_path: PathBuf,
    store: Arc<ConfigStore>,
    cancellation: CancellationToken,
}

impl ConfigWatcher {
    pub fn new(
        config_path: PathBuf,
        store: Arc<ConfigStore>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            config_path,
            store,
            cancellation,
        }
    }

    /// Watch until cancelled. Returns early only if the watch cannot be set
    /// up, in which case the last loaded configuration stays in effect.
    pub async fn watch(self) -> Result<()> {
        info!("Starting config file watcher for: {}", self.config_path.display());

        let (notify_tx, mut notify_rx) = mpsc::channel(FS_EVENT_CHANNEL_CAPACITY);

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    debug!("File system event: {:?}", event);
                    let _ = notify_tx.try_send(event);
                }
                Err(e) => error!("Error watching config file for changes: {:?}", e),
            }
        })
        .context("Cannot create config file watcher")?;

        // Watch the directory: editors often replace the file instead of writing in place
        let watch_path = self
            .config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        watcher
            .watch(watch_path, RecursiveMode::NonRecursive)
            .with_context(|| format!("Cannot watch {}", watch_path.display()))?;
        info!("Watching config file for changes in {}", watch_path.display());

        loop {
            tokio::select! {
                Some(event) = notify_rx.recv() => {
                    if Self::is_config_modified(&event, &self.config_path) {
                        info!("Config file changed, reloading");
                        if let Err(e) = self.reload().await {
                            error!("Config reload rejected, keeping previous configuration: {}", e);
                        }
                    }
                }

                _ = self.cancellation.cancelled() => {
                    info!("Config watcher shutdown complete");
                    break;
                }
            }
        }

        debug!("Config watcher event loop terminated");
        Ok(())
    }

    /// Parse the file and swap it in as a whole; on error nothing changes
    pub async fn reload(&self) -> Result<ConfigChanges, ConfigError> {
        let config = load_config(&self.config_path).await?;
        let new_level = config.log_level.clone();
        let backup_count = config.backups.len();

        let previous = self.store.replace(config).await;
        let current = self.store.snapshot().await;
        let changes = ConfigChanges::between(&previous.backups, &current.backups);

        if new_level != previous.log_level {
            if let Err(e) = reload_log_level(new_level.as_deref()) {
                warn!("Failed to apply log level {:?}: {}", new_level, e);
            }
        }

        info!(
            "Configuration reloaded: {} backups ({} added, {} removed, {} modified)",
            backup_count,
            changes.added.len(),
            changes.removed.len(),
            changes.modified.len()
        );

        Ok(changes)
    }

    fn is_config_modified(event: &Event, config_path: &Path) -> bool {
        let is_our_file = event
            .paths
            .iter()
            .any(|p| p.file_name() == config_path.file_name());

        if !is_our_file {
            return false;
        }

        matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
    }
}
