pub mod changes;
pub mod error;
pub mod loader;
pub mod models;

pub use changes::ConfigChanges;
pub use error::ConfigError;
pub use loader::{config_from_env, load_config, parse_config, validate_configuration};
pub use models::{BackupJob, Configuration, DEFAULT_CONFIG_PATH, DEFAULT_JOB_NAME};
