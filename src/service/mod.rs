pub mod daemon;
pub mod signals;

pub use daemon::{DaemonOptions, ServiceDaemon};
pub use signals::setup_shutdown_handler;
