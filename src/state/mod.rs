pub mod liveness;
pub mod store;
pub mod watcher;

pub use liveness::LivenessState;
pub use store::ConfigStore;
pub use watcher::ConfigWatcher;
