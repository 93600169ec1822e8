pub mod backup;
pub mod dump;
pub mod storage;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;

pub use backup::{JobRunner, RunResult};
pub use storage::{ObjectStore, S3Connector, StorageConnector};
pub use validation::validate_dump_utility;
