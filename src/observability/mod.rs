pub mod logger;

pub use logger::{init_logging, reload_log_level, shutdown_logging, LogFormat, Rotation};
