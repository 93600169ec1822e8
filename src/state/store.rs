use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::Configuration;

/// Holds the current configuration as an immutable snapshot.
///
/// Readers get an `Arc` to a complete configuration and release the lock
/// immediately; a reload swaps in a new `Arc`, so a backup cycle keeps
/// working on the snapshot it started with.
pub struct ConfigStore {
    current: RwLock<Arc<Configuration>>,
}

impl ConfigStore {
    pub fn new(config: Configuration) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
        }
    }

    pub async fn snapshot(&self) -> Arc<Configuration> {
        self.current.read().await.clone()
    }

    /// Replace the whole configuration, returning the previous snapshot
    pub async fn replace(&self, config: Configuration) -> Arc<Configuration> {
        let mut current = self.current.write().await;
        debug!("Swapping configuration snapshot ({} jobs)", config.backups.len());
        std::mem::replace(&mut *current, Arc::new(config))
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(Configuration::default())
    }
}
