pub mod engine;
pub mod executor;

pub use engine::Scheduler;
pub use executor::JobExecutor;
